use crate::deadline::within;
use crate::error::ApiError;
use crate::state::Authenticator;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

/// Resolve the bearer token into a [`rysto_auth::Principal`] and hand it to
/// the handler as a request extension.
pub async fn require_session(
    State(auth): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = match request.headers().get(AUTHORIZATION) {
        None => return Err(ApiError::Unauthorized("Authorization header required".to_string())),
        // A header that is not visible ASCII can never be a well-formed bearer.
        Some(value) => value.to_str().unwrap_or_default().to_string(),
    };

    let principal = within(
        auth.timeout,
        auth.gate.authenticate(Some(header.as_str()), auth.clock.now()),
    )
    .await
    .inspect_err(|err| {
        if matches!(err, ApiError::Unauthorized(_)) {
            warn!(path = %request.uri().path(), error = %err, "request not authenticated");
        }
    })?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
