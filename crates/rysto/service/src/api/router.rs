//! Router assembly for the three services.

use super::handlers;
use crate::metrics::{track_requests, RequestMetrics};
use crate::middleware::require_session;
use crate::state::{AuthState, StoryState, VoteState};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

fn request_metrics<S: handlers::ServiceStatus>(state: &S) -> RequestMetrics {
    RequestMetrics {
        metrics: state.metrics().clone(),
        service: state.service(),
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Accounts: public register/login, bearer-protected profile/logout.
pub fn auth_router(state: AuthState) -> Router {
    let protected = Router::new()
        .route("/profile", get(handlers::profile))
        .route("/logout", post(handlers::logout))
        .route_layer(from_fn_with_state(state.auth.clone(), require_session));

    Router::new()
        .route("/health", get(handlers::health_check::<AuthState>))
        .route("/metrics", get(handlers::export_metrics::<AuthState>))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .nest("/api", protected)
        .layer(from_fn_with_state(request_metrics(&state), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

/// Stories and continuations, all bearer-protected.
pub fn story_router(state: StoryState) -> Router {
    let api_routes = Router::new()
        .route(
            "/stories",
            get(handlers::list_stories).post(handlers::create_story),
        )
        .route(
            "/stories/:id",
            get(handlers::get_story)
                .put(handlers::edit_story)
                .delete(handlers::delete_story),
        )
        .route(
            "/stories/:id/continuations",
            post(handlers::add_continuation),
        )
        .route(
            "/stories/:id/continuations/:cid",
            put(handlers::edit_continuation)
                .delete(handlers::delete_continuation),
        )
        .route(
            "/stories/:id/accept/:cid",
            post(handlers::accept_continuation),
        )
        .route_layer(from_fn_with_state(state.auth.clone(), require_session));

    Router::new()
        .route("/health", get(handlers::health_check::<StoryState>))
        .route("/metrics", get(handlers::export_metrics::<StoryState>))
        .nest("/api", api_routes)
        .layer(from_fn_with_state(request_metrics(&state), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

/// Votes, all bearer-protected.
pub fn vote_router(state: VoteState) -> Router {
    let api_routes = Router::new()
        .route(
            "/votes/:continuation_id",
            post(handlers::cast_vote)
                .get(handlers::list_votes)
                .delete(handlers::withdraw_vote),
        )
        .route_layer(from_fn_with_state(state.auth.clone(), require_session));

    Router::new()
        .route("/health", get(handlers::health_check::<VoteState>))
        .route("/metrics", get(handlers::export_metrics::<VoteState>))
        .nest("/api", api_routes)
        .layer(from_fn_with_state(request_metrics(&state), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}
