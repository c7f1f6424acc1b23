//! Command-line and environment configuration shared by the three daemons.

use crate::metrics::Metrics;
use crate::state::{Platform, StorageConfig, StorageHandles};
use clap::{Args, ValueEnum};
use rysto_auth::{GateMode, TokenCodec, TokenError, TOKEN_ISSUER};
use rysto_storage::StorageError;
use rysto_types::SystemClock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionCheck {
    Stateful,
    Stateless,
}

/// Which process registers the sessions this process checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    /// The auth routes run in this process.
    InProcess,
    /// Sessions are issued by a separate `rysto-authd`.
    External,
}

impl From<SessionCheck> for GateMode {
    fn from(check: SessionCheck) -> Self {
        match check {
            SessionCheck::Stateful => GateMode::Stateful,
            SessionCheck::Stateless => GateMode::Stateless,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("storage=postgres requires --database-url, RYSTO_DATABASE_URL or DATABASE_URL")]
    MissingDatabaseUrl,

    #[error("invalid signing secret: {0}")]
    Secret(#[from] TokenError),

    #[error("request timeout must be at least one second")]
    ZeroTimeout,

    /// Stateful checks against process-local storage would reject every
    /// token issued by another process.
    #[error(
        "storage=memory with session-check=stateful cannot see sessions issued by rysto-authd; \
         use postgres storage or run rysto-platformd"
    )]
    UnsharedSessions,

    #[error("failed to open storage: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Flags every daemon accepts.
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// HMAC secret used to sign and verify bearer tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Persistence backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = StorageMode::Auto, env = "RYSTO_STORAGE")]
    pub storage: StorageMode,

    /// PostgreSQL url. Falls back to DATABASE_URL.
    #[arg(long, env = "RYSTO_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Max PostgreSQL pool connections.
    #[arg(long, default_value_t = 5, env = "RYSTO_PG_MAX_CONNECTIONS")]
    pub pg_max_connections: u32,

    /// Per-request deadline in seconds. Defaults to the service's own limit.
    #[arg(long, env = "RYSTO_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Whether protected routes consult the session store.
    #[arg(long, value_enum, default_value_t = SessionCheck::Stateful, env = "RYSTO_SESSION_CHECK")]
    pub session_check: SessionCheck,
}

impl CommonArgs {
    pub fn storage_config(&self) -> Result<StorageConfig, ConfigError> {
        self.storage_config_with(std::env::var("DATABASE_URL").ok())
    }

    fn storage_config_with(&self, fallback_url: Option<String>) -> Result<StorageConfig, ConfigError> {
        let resolved_url = self.database_url.clone().or(fallback_url);

        let config = match self.storage {
            StorageMode::Memory => StorageConfig::Memory,
            StorageMode::Postgres => {
                let database_url = resolved_url.ok_or(ConfigError::MissingDatabaseUrl)?;
                StorageConfig::postgres(database_url, self.pg_max_connections)
            }
            StorageMode::Auto => match resolved_url {
                Some(database_url) => StorageConfig::postgres(database_url, self.pg_max_connections),
                None => StorageConfig::Memory,
            },
        };
        Ok(config)
    }

    pub fn request_timeout(&self, default: Duration) -> Result<Duration, ConfigError> {
        match self.request_timeout_secs {
            Some(0) => Err(ConfigError::ZeroTimeout),
            Some(secs) => Ok(Duration::from_secs(secs)),
            None => Ok(default),
        }
    }

    pub fn codec(&self) -> Result<TokenCodec, ConfigError> {
        Ok(TokenCodec::new(self.jwt_secret.as_bytes(), TOKEN_ISSUER)?)
    }

    /// Refuse combinations where the session store cannot see the sessions
    /// this process is asked to check.
    pub fn check_session_source(
        &self,
        storage: &StorageConfig,
        source: SessionSource,
    ) -> Result<(), ConfigError> {
        match (storage, self.session_check, source) {
            (StorageConfig::Memory, SessionCheck::Stateful, SessionSource::External) => {
                Err(ConfigError::UnsharedSessions)
            }
            _ => Ok(()),
        }
    }

    /// Validate the secret and the session setup, then open storage.
    pub async fn platform(&self, source: SessionSource) -> Result<Platform, ConfigError> {
        let codec = self.codec()?;
        let storage_config = self.storage_config()?;
        self.check_session_source(&storage_config, source)?;
        let metrics = Metrics::new()?;
        let storage = StorageHandles::open(&storage_config).await?;
        info!(backend = storage.backend, session_check = %GateMode::from(self.session_check), "platform ready");

        Ok(Platform::new(
            storage,
            Arc::new(codec),
            self.session_check.into(),
            Arc::new(SystemClock),
            metrics,
        ))
    }
}

/// Install the fmt subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "rysto_service=info,info".to_string()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        common: CommonArgs,
    }

    fn parse(args: &[&str]) -> CommonArgs {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().common
    }

    #[test]
    fn auto_prefers_postgres_when_a_url_is_known() {
        let args = parse(&["--jwt-secret", "s", "--database-url", "postgres://db"]);
        assert_eq!(
            args.storage_config_with(None).unwrap(),
            StorageConfig::postgres("postgres://db", 5)
        );

        let args = parse(&["--jwt-secret", "s", "--storage", "auto"]);
        assert_eq!(
            args.storage_config_with(Some("postgres://fallback".to_string()))
                .unwrap(),
            StorageConfig::postgres("postgres://fallback", 5)
        );
        assert_eq!(args.storage_config_with(None).unwrap(), StorageConfig::Memory);
    }

    #[test]
    fn explicit_postgres_needs_a_url() {
        let args = parse(&["--jwt-secret", "s", "--storage", "postgres"]);
        assert!(matches!(
            args.storage_config_with(None),
            Err(ConfigError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn memory_ignores_database_url() {
        let args = parse(&[
            "--jwt-secret",
            "s",
            "--storage",
            "memory",
            "--database-url",
            "postgres://db",
        ]);
        assert_eq!(args.storage_config_with(None).unwrap(), StorageConfig::Memory);
    }

    #[test]
    fn empty_secret_is_rejected() {
        let args = parse(&["--jwt-secret", ""]);
        assert!(matches!(
            args.codec(),
            Err(ConfigError::Secret(TokenError::EmptySecret))
        ));
    }

    #[test]
    fn timeout_override() {
        let default = Duration::from_secs(5);
        assert_eq!(
            parse(&["--jwt-secret", "s"]).request_timeout(default).unwrap(),
            default
        );
        assert_eq!(
            parse(&["--jwt-secret", "s", "--request-timeout-secs", "2"])
                .request_timeout(default)
                .unwrap(),
            Duration::from_secs(2)
        );
        assert!(parse(&["--jwt-secret", "s", "--request-timeout-secs", "0"])
            .request_timeout(default)
            .is_err());
    }

    #[test]
    fn external_sessions_need_shared_storage_when_stateful() {
        let args = parse(&["--jwt-secret", "s", "--storage", "memory"]);
        assert!(matches!(
            args.check_session_source(&StorageConfig::Memory, SessionSource::External),
            Err(ConfigError::UnsharedSessions)
        ));
        assert!(args
            .check_session_source(&StorageConfig::Memory, SessionSource::InProcess)
            .is_ok());
        assert!(args
            .check_session_source(
                &StorageConfig::postgres("postgres://db", 5),
                SessionSource::External
            )
            .is_ok());

        let stateless = parse(&["--jwt-secret", "s", "--session-check", "stateless"]);
        assert!(stateless
            .check_session_source(&StorageConfig::Memory, SessionSource::External)
            .is_ok());
    }

    #[tokio::test]
    async fn platform_refuses_unshared_sessions_before_opening_storage() {
        let args = parse(&["--jwt-secret", "s", "--storage", "memory"]);
        assert!(matches!(
            args.platform(SessionSource::External).await,
            Err(ConfigError::UnsharedSessions)
        ));
        let platform = args.platform(SessionSource::InProcess).await.unwrap();
        assert_eq!(platform.storage.backend, "memory");
    }

    #[test]
    fn session_check_maps_to_gate_mode() {
        let args = parse(&["--jwt-secret", "s", "--session-check", "stateless"]);
        assert_eq!(GateMode::from(args.session_check), GateMode::Stateless);
        assert_eq!(
            GateMode::from(parse(&["--jwt-secret", "s"]).session_check),
            GateMode::Stateful
        );
    }
}
