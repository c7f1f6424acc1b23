//! Request authentication.
//!
//! A request is authenticated only when its bearer token verifies and (in
//! stateful mode) the session store still maps the token to the same
//! identity the token was issued for.

use crate::session::{token_prefix, SessionStore};
use crate::token::TokenCodec;
use chrono::{DateTime, Utc};
use rysto_storage::StorageError;
use rysto_types::Identity;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Whether the gate consults the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateMode {
    /// Token must verify and be registered. Logout takes effect.
    #[default]
    Stateful,
    /// Token signature and expiry only. Logout has no effect.
    Stateless,
}

impl fmt::Display for GateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateMode::Stateful => f.write_str("stateful"),
            GateMode::Stateless => f.write_str("stateless"),
        }
    }
}

/// The caller a request was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub identity: Identity,
    pub token: String,
}

/// Why a request was not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthRejection {
    #[error("Authorization format must be Bearer {{token}}")]
    MissingOrMalformed,

    #[error("Invalid or expired token")]
    InvalidOrExpired,

    #[error("Token is no longer valid")]
    Revoked,

    #[error("Token does not match its session")]
    TokenMismatch,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Rejected(#[from] AuthRejection),

    /// The session store could not be consulted.
    #[error("session store unavailable: {0}")]
    SessionStore(#[source] StorageError),
}

#[derive(Clone)]
pub struct AuthGate {
    codec: Arc<TokenCodec>,
    sessions: SessionStore,
    mode: GateMode,
}

impl AuthGate {
    pub fn new(codec: Arc<TokenCodec>, sessions: SessionStore, mode: GateMode) -> Self {
        if mode == GateMode::Stateless {
            warn!("session check disabled; logout will not revoke tokens");
        }
        Self {
            codec,
            sessions,
            mode,
        }
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    pub async fn authenticate(
        &self,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let token = header
            .and_then(parse_bearer)
            .ok_or(AuthRejection::MissingOrMalformed)?;

        let claimed = self.codec.verify(token, now).map_err(|e| {
            debug!(token = token_prefix(token), error = %e, "token rejected");
            AuthRejection::InvalidOrExpired
        })?;

        if self.mode == GateMode::Stateful {
            let registered = self
                .sessions
                .lookup(token)
                .await
                .map_err(AuthError::SessionStore)?
                .ok_or(AuthRejection::Revoked)?;

            if registered != claimed {
                warn!(
                    token = token_prefix(token),
                    claimed = %claimed,
                    registered = %registered,
                    "token identity does not match its session"
                );
                return Err(AuthRejection::TokenMismatch.into());
            }
        }

        Ok(Principal {
            identity: claimed,
            token: token.to_string(),
        })
    }
}

/// Extract the token from `Bearer <token>`. The scheme is case-sensitive and
/// separated by exactly one space.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?;
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}
