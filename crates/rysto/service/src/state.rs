//! Shared service state.

use crate::metrics::Metrics;
use rysto_auth::{AccountService, AuthGate, GateMode, SessionStore, TokenCodec};
use rysto_content::ContentService;
use rysto_storage::memory::InMemoryRystoStorage;
use rysto_storage::{
    ContentStore, CredentialStore, RystoStorage, SessionCache, StorageResult, VoteStore,
};
use rysto_types::{Clock, SystemClock};
use rysto_voting::VoteService;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StorageConfig {
    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }
}

/// Store handles, all backed by the same adapter.
#[derive(Clone)]
pub struct StorageHandles {
    pub credentials: Arc<dyn CredentialStore>,
    pub content: Arc<dyn ContentStore>,
    pub votes: Arc<dyn VoteStore>,
    pub sessions: Arc<dyn SessionCache>,
    pub backend: &'static str,
}

impl StorageHandles {
    pub fn from_backend<T>(backend: Arc<T>, label: &'static str) -> Self
    where
        T: RystoStorage + 'static,
    {
        Self {
            credentials: backend.clone(),
            content: backend.clone(),
            votes: backend.clone(),
            sessions: backend,
            backend: label,
        }
    }

    pub fn memory() -> Self {
        Self::memory_with_clock(Arc::new(SystemClock))
    }

    pub fn memory_with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::from_backend(Arc::new(InMemoryRystoStorage::with_clock(clock)), "memory")
    }

    pub async fn open(config: &StorageConfig) -> StorageResult<Self> {
        match config {
            StorageConfig::Memory => {
                warn!("using in-memory storage; data is process-local and lost on exit");
                Ok(Self::memory())
            }
            StorageConfig::Postgres {
                database_url,
                max_connections,
            } => Self::open_postgres(database_url, *max_connections).await,
        }
    }

    #[cfg(feature = "postgres")]
    async fn open_postgres(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let storage = rysto_storage::postgres::PostgresRystoStorage::connect_with_options(
            database_url,
            max_connections,
            5,
        )
        .await?;
        tracing::info!(max_connections, "connected to postgres storage");
        Ok(Self::from_backend(Arc::new(storage), "postgres"))
    }

    #[cfg(not(feature = "postgres"))]
    async fn open_postgres(_database_url: &str, _max_connections: u32) -> StorageResult<Self> {
        Err(rysto_storage::StorageError::Backend(
            "postgres storage requested but this build lacks the `postgres` feature".to_string(),
        ))
    }
}

/// Everything the three services share.
#[derive(Clone)]
pub struct Platform {
    pub storage: StorageHandles,
    pub codec: Arc<TokenCodec>,
    pub gate_mode: GateMode,
    pub clock: Arc<dyn Clock>,
    pub metrics: Metrics,
}

impl Platform {
    pub fn new(
        storage: StorageHandles,
        codec: Arc<TokenCodec>,
        gate_mode: GateMode,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            codec,
            gate_mode,
            clock,
            metrics,
        }
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.storage.sessions.clone())
    }

    pub fn authenticator(&self, timeout: Duration) -> Authenticator {
        Authenticator {
            gate: AuthGate::new(self.codec.clone(), self.sessions(), self.gate_mode),
            clock: self.clock.clone(),
            timeout,
        }
    }
}

/// State for the bearer middleware.
#[derive(Clone)]
pub struct Authenticator {
    pub gate: AuthGate,
    pub clock: Arc<dyn Clock>,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct AuthState {
    pub accounts: AccountService,
    pub auth: Authenticator,
    pub timeout: Duration,
    pub backend: &'static str,
    pub metrics: Metrics,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub project_url: String,
    pub session_ttl: chrono::Duration,
    pub timeout: Duration,
}

impl AuthState {
    pub fn new(platform: &Platform, settings: AuthSettings) -> Self {
        let accounts = AccountService::new(
            platform.storage.credentials.clone(),
            platform.codec.clone(),
            platform.sessions(),
            platform.clock.clone(),
        )
        .with_session_ttl(settings.session_ttl)
        .with_project_url(settings.project_url);

        Self {
            accounts,
            auth: platform.authenticator(settings.timeout),
            timeout: settings.timeout,
            backend: platform.storage.backend,
            metrics: platform.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct StoryState {
    pub content: ContentService,
    pub auth: Authenticator,
    pub timeout: Duration,
    pub backend: &'static str,
    pub metrics: Metrics,
}

impl StoryState {
    pub fn new(platform: &Platform, timeout: Duration) -> Self {
        Self {
            content: ContentService::new(platform.storage.content.clone(), platform.clock.clone()),
            auth: platform.authenticator(timeout),
            timeout,
            backend: platform.storage.backend,
            metrics: platform.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct VoteState {
    pub votes: VoteService,
    pub auth: Authenticator,
    pub timeout: Duration,
    pub backend: &'static str,
    pub metrics: Metrics,
}

impl VoteState {
    pub fn new(platform: &Platform, timeout: Duration) -> Self {
        Self {
            votes: VoteService::new(platform.storage.votes.clone(), platform.clock.clone()),
            auth: platform.authenticator(timeout),
            timeout,
            backend: platform.storage.backend,
            metrics: platform.metrics.clone(),
        }
    }
}
