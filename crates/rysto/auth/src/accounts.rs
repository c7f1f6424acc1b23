//! Account registration, login, logout and profile.

use crate::gate::Principal;
use crate::password::{hash_password, verify_password, PasswordError, DECOY_HASH};
use crate::session::{token_prefix, SessionStore};
use crate::token::{TokenCodec, TokenError};
use chrono::Duration;
use rysto_storage::{CredentialStore, StorageError};
use rysto_types::{Clock, Credential, CredentialId, Identity};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    AlreadyRegistered,

    /// Unknown identity and wrong password are deliberately the same error.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("Failed to hash password: {0}")]
    Password(#[from] PasswordError),

    #[error("Failed to generate token: {0}")]
    Token(#[from] TokenError),
}

impl AccountError {
    fn storage(context: &'static str) -> impl FnOnce(StorageError) -> AccountError {
        move |source| AccountError::Storage { context, source }
    }
}

/// Body of the authenticated profile endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Profile {
    pub message: String,
    pub user_email: String,
    pub project_url: String,
    pub access_level: String,
}

#[derive(Clone)]
pub struct AccountService {
    credentials: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    sessions: SessionStore,
    session_ttl: Duration,
    clock: Arc<dyn Clock>,
    project_url: String,
}

impl AccountService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        codec: Arc<TokenCodec>,
        sessions: SessionStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            codec,
            sessions,
            session_ttl: Duration::hours(crate::session::DEFAULT_SESSION_TTL_HOURS),
            clock,
            project_url: "rysto/auth".to_string(),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_project_url(mut self, project_url: impl Into<String>) -> Self {
        self.project_url = project_url.into();
        self
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<CredentialId, AccountError> {
        let identity = parse_identity(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let existing = self
            .credentials
            .count_credentials(&identity)
            .await
            .map_err(AccountError::storage("Database error checking email availability"))?;
        if existing > 0 {
            return Err(AccountError::AlreadyRegistered);
        }

        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| PasswordError::Hash(e.to_string()))??;

        let id = match self
            .credentials
            .insert_credential(Credential::new(identity.clone(), hash))
            .await
        {
            Ok(id) => id,
            // Lost a race against a concurrent registration.
            Err(err) if err.is_conflict() => return Err(AccountError::AlreadyRegistered),
            Err(err) => return Err(AccountError::storage("Failed to create user")(err)),
        };

        info!(email = %identity, "account registered");
        Ok(id)
    }

    /// Verify credentials, issue a token and register its session.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AccountError> {
        let identity = parse_identity(email)?;
        if password.is_empty() {
            return Err(AccountError::Validation("password is required".to_string()));
        }

        let credential = self
            .credentials
            .find_credential(&identity)
            .await
            .map_err(AccountError::storage("Database error during login"))?;
        let stored = credential
            .as_ref()
            .map_or_else(|| DECOY_HASH.to_string(), |c| c.password_hash.clone());
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .map_err(|e| PasswordError::Hash(e.to_string()))??;

        let credential = match credential {
            Some(credential) if matches => credential,
            Some(_) => {
                warn!(email = %identity, "login with wrong password");
                return Err(AccountError::InvalidCredentials);
            }
            None => {
                warn!(email = %identity, "login for unknown identity");
                return Err(AccountError::InvalidCredentials);
            }
        };

        let token = self.codec.issue(&credential.email, self.clock.now())?;
        self.sessions
            .register(&token, &credential.email, self.session_ttl)
            .await
            .map_err(AccountError::storage("Failed to store token"))?;

        info!(email = %credential.email, token = token_prefix(&token), "login succeeded");
        Ok(token)
    }

    pub async fn logout(&self, principal: &Principal) -> Result<(), AccountError> {
        self.sessions.revoke(&principal.token).await.map_err(|e| {
            error!(token = token_prefix(&principal.token), error = %e, "failed to revoke session");
            AccountError::storage("Failed to invalidate token")(e)
        })?;
        debug!(email = %principal.identity, token = token_prefix(&principal.token), "session revoked");
        Ok(())
    }

    pub fn profile(&self, principal: &Principal) -> Profile {
        Profile {
            message: "Welcome to your protected profile!".to_string(),
            user_email: principal.identity.to_string(),
            project_url: self.project_url.clone(),
            access_level: "authenticated".to_string(),
        }
    }
}

fn parse_identity(email: &str) -> Result<Identity, AccountError> {
    Identity::parse(email).map_err(|e| AccountError::Validation(e.to_string()))
}
