//! Rysto HTTP services.
//!
//! Three small axum services share one storage backend and one token codec:
//! - `rysto-authd`: registration, login, logout and the profile endpoint
//! - `rysto-storyd`: stories, continuations and acceptance
//! - `rysto-voted`: votes on continuations
//!
//! `rysto-platformd` runs all three in one process over one platform. Each
//! router also exports Prometheus metrics on `/metrics`.
//!
//! Every protected route goes through [`middleware::require_session`], which
//! resolves the bearer token into a [`rysto_auth::Principal`].

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod deadline;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod state;

pub use api::{auth_router, story_router, vote_router};
pub use config::{
    init_tracing, CommonArgs, ConfigError, SessionCheck, SessionSource, StorageMode,
};
pub use deadline::{within, AUTH_REQUEST_TIMEOUT, CONTENT_REQUEST_TIMEOUT};
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use metrics::{Metrics, RequestMetrics};
pub use state::{
    AuthSettings, AuthState, Authenticator, Platform, StorageConfig, StorageHandles, StoryState,
    VoteState,
};
