//! HTTP error mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rysto_auth::{AccountError, AuthError};
use rysto_content::ContentError;
use rysto_storage::StorageError;
use rysto_types::IdParseError;
use rysto_voting::VoteError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed body, id or field
    #[error("{0}")]
    BadRequest(String),

    /// Credentials missing or rejected
    #[error("{0}")]
    Unauthorized(String),

    /// Caller is not allowed to touch the resource
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness or acceptance-slot conflict
    #[error("{0}")]
    Conflict(String),

    /// The request deadline elapsed
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Acceptance claimed the story slot but could not flag the continuation
    #[error("continuation acceptance was interrupted (story slot rolled back: {rolled_back})")]
    PartialAcceptance { rolled_back: bool },

    /// A downstream dependency failed; the message is safe to return.
    #[error("{0}")]
    Dependency(String),

    /// Internal failure; the message is safe to return.
    #[error("{0}")]
    Internal(String),

    /// Storage failure. The backend's message is logged, never returned.
    #[error("Storage operation failed")]
    Storage(#[from] StorageError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Timeout(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TIMEOUT"),
            ApiError::PartialAcceptance { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PARTIAL_ACCEPTANCE")
            }
            ApiError::Dependency(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DEPENDENCY_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        };

        match &self {
            ApiError::Storage(source) => error!(code, error = %source, "request failed"),
            _ if status.is_server_error() => error!(code, error = %self, "request failed"),
            _ => {}
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Rejected(rejection) => ApiError::Unauthorized(rejection.to_string()),
            AuthError::SessionStore(source) => {
                error!(error = %source, "session store unavailable");
                ApiError::Dependency("Failed to verify session".to_string())
            }
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(message) => ApiError::BadRequest(message),
            AccountError::AlreadyRegistered => ApiError::Conflict(err.to_string()),
            AccountError::InvalidCredentials => ApiError::Unauthorized(err.to_string()),
            AccountError::Storage { context, source } => {
                error!(error = %source, "{context}");
                ApiError::Dependency(context.to_string())
            }
            AccountError::Password(_) | AccountError::Token(_) => {
                error!(error = %err, "account operation failed");
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::Validation(message) => ApiError::BadRequest(message),
            ContentError::NotFound(message) => ApiError::NotFound(message),
            ContentError::Forbidden(message) => ApiError::Forbidden(message),
            ContentError::Conflict(message) => ApiError::Conflict(message),
            ContentError::PartialAcceptance { rolled_back } => {
                ApiError::PartialAcceptance { rolled_back }
            }
            ContentError::Storage(source) => ApiError::Storage(source),
        }
    }
}

impl From<VoteError> for ApiError {
    fn from(err: VoteError) -> Self {
        match err {
            VoteError::AlreadyVoted => ApiError::Conflict(err.to_string()),
            VoteError::Storage(source) => ApiError::Storage(source),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<IdParseError> for ApiError {
    fn from(err: IdParseError) -> Self {
        ApiError::BadRequest(format!("Invalid {} ID", err.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rysto_auth::AuthRejection;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn body_carries_error_and_code() {
        let (status, body) = render(ApiError::NotFound("Story not found".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Story not found");
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn partial_acceptance_is_distinct_from_plain_failure() {
        let (status, body) = render(ApiError::from(ContentError::PartialAcceptance {
            rolled_back: true,
        }))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "PARTIAL_ACCEPTANCE");

        let (status, body) =
            render(ApiError::from(ContentError::Storage(StorageError::Backend(
                "down".to_string(),
            ))))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "STORAGE_ERROR");
    }

    #[tokio::test]
    async fn backend_details_stay_out_of_the_body() {
        let (status, body) = render(ApiError::from(VoteError::Storage(StorageError::Backend(
            "connection to 10.0.0.7:5432 refused".to_string(),
        ))))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "STORAGE_ERROR");
        assert_eq!(body["error"], "Storage operation failed");
        assert!(!body.to_string().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn auth_rejections_are_401_and_store_failures_500() {
        let (status, body) =
            render(ApiError::from(AuthError::Rejected(AuthRejection::Revoked))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Token is no longer valid");

        let (status, _) = render(ApiError::from(AuthError::SessionStore(
            StorageError::Backend("down".to_string()),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn timeout_has_its_own_code() {
        let (status, body) = render(ApiError::Timeout(Duration::from_secs(5))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "TIMEOUT");
    }
}
