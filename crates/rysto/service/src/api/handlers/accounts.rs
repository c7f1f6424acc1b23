//! Registration, login and session handlers

use crate::deadline::within;
use crate::error::{ApiError, ApiResult};
use crate::state::AuthState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use rysto_auth::{Principal, Profile};
use serde::{Deserialize, Serialize};

/// Body of `/register` and `/login`.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub message: String,
}

pub async fn register(
    State(state): State<AuthState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let Json(request) = body?;
    within(
        state.timeout,
        state.accounts.register(&request.email, &request.password),
    )
    .await?;
    state.metrics.registrations_total.inc();

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully")),
    ))
}

pub async fn login(
    State(state): State<AuthState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(request) = body?;
    let token = within(
        state.timeout,
        state.accounts.login(&request.email, &request.password),
    )
    .await
    .inspect_err(|err| {
        if matches!(err, ApiError::BadRequest(_) | ApiError::Unauthorized(_)) {
            state.metrics.record_login(false);
        }
    })?;
    state.metrics.record_login(true);

    Ok(Json(LoginResponse {
        token,
        message: "Login successful".to_string(),
    }))
}

pub async fn logout(
    State(state): State<AuthState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<MessageResponse>> {
    within(state.timeout, state.accounts.logout(&principal)).await?;
    state.metrics.active_sessions.dec();
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

pub async fn profile(
    State(state): State<AuthState>,
    Extension(principal): Extension<Principal>,
) -> Json<Profile> {
    Json(state.accounts.profile(&principal))
}
