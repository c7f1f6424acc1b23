//! Prometheus metrics shared by the three services.
//!
//! One [`Metrics`] is built per [`crate::Platform`]. Request counters carry a
//! `service` label, so a process serving several routers still exports a
//! single registry.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Metric name prefix.
pub const METRICS_PREFIX: &str = "rysto";

/// Label used for requests that matched no route.
const UNMATCHED: &str = "unmatched";

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    /// Requests by service, route template and status code
    pub http_requests_total: IntCounterVec,

    /// Request latency by service and route template
    pub http_request_duration_seconds: HistogramVec,

    pub registrations_total: IntCounter,

    /// Login attempts by outcome (`success` or `failure`)
    pub logins_total: IntCounterVec,

    /// Incremented on login, decremented on logout. Expired sessions are not subtracted.
    pub active_sessions: IntGauge,

    pub stories_created_total: IntCounter,
    pub continuations_added_total: IntCounter,
    pub continuations_accepted_total: IntCounter,

    pub votes_cast_total: IntCounter,
    pub votes_deleted_total: IntCounter,
    pub active_votes: IntGauge,
}

fn register<C>(registry: &Registry, collector: C) -> prometheus::Result<C>
where
    C: Collector + Clone + 'static,
{
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

impl Metrics {
    /// Create and register every collector in a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some(METRICS_PREFIX.to_string()), None)?;

        let http_requests_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("http_requests_total", "HTTP requests processed"),
                &["service", "endpoint", "status"],
            )?,
        )?;
        let http_request_duration_seconds = register(
            &registry,
            HistogramVec::new(
                HistogramOpts::new("http_request_duration_seconds", "HTTP request latency"),
                &["service", "endpoint"],
            )?,
        )?;
        let registrations_total = register(
            &registry,
            IntCounter::new("registrations_total", "Accounts registered")?,
        )?;
        let logins_total = register(
            &registry,
            IntCounterVec::new(Opts::new("logins_total", "Login attempts"), &["outcome"])?,
        )?;
        let active_sessions = register(
            &registry,
            IntGauge::new("active_sessions", "Sessions opened minus sessions closed")?,
        )?;
        let stories_created_total = register(
            &registry,
            IntCounter::new("stories_created_total", "Stories created")?,
        )?;
        let continuations_added_total = register(
            &registry,
            IntCounter::new("continuations_added_total", "Continuations submitted")?,
        )?;
        let continuations_accepted_total = register(
            &registry,
            IntCounter::new("continuations_accepted_total", "Continuations accepted")?,
        )?;
        let votes_cast_total = register(
            &registry,
            IntCounter::new("votes_cast_total", "Votes cast")?,
        )?;
        let votes_deleted_total = register(
            &registry,
            IntCounter::new("votes_deleted_total", "Votes withdrawn")?,
        )?;
        let active_votes = register(
            &registry,
            IntGauge::new("active_votes", "Votes cast minus votes withdrawn")?,
        )?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            registrations_total,
            logins_total,
            active_sessions,
            stories_created_total,
            continuations_added_total,
            continuations_accepted_total,
            votes_cast_total,
            votes_deleted_total,
            active_votes,
        })
    }

    pub fn record_login(&self, succeeded: bool) {
        let outcome = if succeeded { "success" } else { "failure" };
        self.logins_total.with_label_values(&[outcome]).inc();
        if succeeded {
            self.active_sessions.inc();
        }
    }

    /// Export in the Prometheus text format.
    pub fn export(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// State for [`track_requests`]: the shared metrics plus the service label.
#[derive(Clone)]
pub struct RequestMetrics {
    pub metrics: Metrics,
    pub service: &'static str,
}

/// Count and time every request by its route template.
pub async fn track_requests(
    State(tracker): State<RequestMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED.to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    tracker
        .metrics
        .http_requests_total
        .with_label_values(&[tracker.service, endpoint.as_str(), status.as_str()])
        .inc();
    tracker
        .metrics
        .http_request_duration_seconds
        .with_label_values(&[tracker.service, endpoint.as_str()])
        .observe(started.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_lists_prefixed_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_login(true);
        metrics.record_login(false);
        metrics.votes_cast_total.inc();

        let output = metrics.export().unwrap();
        assert!(output.contains("rysto_logins_total{outcome=\"success\"} 1"));
        assert!(output.contains("rysto_logins_total{outcome=\"failure\"} 1"));
        assert!(output.contains("rysto_active_sessions 1"));
        assert!(output.contains("rysto_votes_cast_total 1"));
    }

    #[test]
    fn registries_are_independent() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.stories_created_total.inc();
        assert_eq!(first.stories_created_total.get(), 1);
        assert_eq!(second.stories_created_total.get(), 0);
    }
}
