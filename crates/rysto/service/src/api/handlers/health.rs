use crate::error::{ApiError, ApiResult};
use crate::metrics::Metrics;
use axum::{extract::State, http::header, Json};
use serde::Serialize;
use tracing::error;

/// Implemented by each service's router state.
pub trait ServiceStatus {
    fn service(&self) -> &'static str;
    fn backend(&self) -> &'static str;
    fn metrics(&self) -> &Metrics;
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub storage: &'static str,
    pub version: &'static str,
}

/// Liveness check. Does not touch storage.
pub async fn health_check<S>(State(state): State<S>) -> Json<HealthResponse>
where
    S: ServiceStatus + Clone + Send + Sync + 'static,
{
    Json(HealthResponse {
        status: "ok",
        service: state.service(),
        storage: state.backend(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus scrape endpoint.
pub async fn export_metrics<S>(
    State(state): State<S>,
) -> ApiResult<([(header::HeaderName, &'static str); 1], String)>
where
    S: ServiceStatus + Clone + Send + Sync + 'static,
{
    let body = state.metrics().export().map_err(|err| {
        error!(service = state.service(), error = %err, "failed to encode metrics");
        ApiError::Internal("Failed to encode metrics".to_string())
    })?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

impl ServiceStatus for crate::state::AuthState {
    fn service(&self) -> &'static str {
        "auth"
    }

    fn backend(&self) -> &'static str {
        self.backend
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl ServiceStatus for crate::state::StoryState {
    fn service(&self) -> &'static str {
        "stories"
    }

    fn backend(&self) -> &'static str {
        self.backend
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl ServiceStatus for crate::state::VoteState {
    fn service(&self) -> &'static str {
        "voting"
    }

    fn backend(&self) -> &'static str {
        self.backend
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
