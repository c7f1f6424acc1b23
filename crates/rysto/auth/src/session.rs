//! Server-side session registrations.
//!
//! A token is only honoured while its registration is present. Deleting the
//! registration is the sole logout mechanism; the token itself stays
//! cryptographically valid until its own expiry.

use chrono::Duration;
use rysto_storage::{SessionCache, StorageResult};
use rysto_types::Identity;
use std::sync::Arc;

/// Session registration TTL, in hours. Shorter than the token lifetime.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn SessionCache>,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn SessionCache>) -> Self {
        Self { cache }
    }

    pub async fn register(
        &self,
        token: &str,
        identity: &Identity,
        ttl: Duration,
    ) -> StorageResult<()> {
        self.cache.set(token, identity.as_str(), ttl).await
    }

    pub async fn lookup(&self, token: &str) -> StorageResult<Option<Identity>> {
        Ok(self.cache.get(token).await?.map(Identity::new))
    }

    /// Idempotent: revoking an unknown token succeeds.
    pub async fn revoke(&self, token: &str) -> StorageResult<()> {
        self.cache.delete(token).await
    }

    pub async fn is_active(&self, token: &str) -> StorageResult<bool> {
        self.cache.exists(token).await
    }
}

/// Short, log-safe form of a token.
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map_or(token.len(), |(index, _)| index);
    &token[..end]
}
