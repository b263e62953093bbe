//! HTTP error mapping for the session API: `StorageError`/
//! `OrchestratorError` map onto HTTP status codes at the boundary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use crate::orchestrator::OrchestratorError;
use crate::storage::StorageError;

use super::ApiResponse;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    Configuration(String),

    Authentication(String),

    Precondition(String),

    RateLimited,

    ExternalServiceError(String),

    ValidationError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            ApiError::Authentication(msg) => write!(f, "Authentication failed: {msg}"),
            ApiError::Precondition(msg) => write!(f, "Precondition failed: {msg}"),
            ApiError::RateLimited => write!(f, "Upstream rate limit exhausted"),
            ApiError::ExternalServiceError(msg) => write!(f, "External service error: {msg}"),
            ApiError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            ApiError::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Configuration(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Precondition(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::RateLimited => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Upstream rate limit exhausted after retries".to_string(),
            ),
            ApiError::ExternalServiceError(msg) => {
                tracing::warn!("external service error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::InternalError(msg) => {
                tracing::error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Configuration(msg) => ApiError::Configuration(msg),
            OrchestratorError::Authentication(msg) => ApiError::Authentication(msg),
            OrchestratorError::SessionNotFound => {
                ApiError::NotFound("session not found".to_string())
            }
            OrchestratorError::Precondition(msg) => ApiError::Precondition(msg),
            OrchestratorError::Storage(storage_err) => storage_err.into(),
            OrchestratorError::Metadata(meta_err) => {
                ApiError::ExternalServiceError(meta_err.to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Authentication(msg) => ApiError::Authentication(msg),
            StorageError::Configuration(msg) => ApiError::Configuration(msg),
            StorageError::RateLimited { .. } => ApiError::RateLimited,
            StorageError::Transient(msg) => ApiError::ExternalServiceError(msg),
            StorageError::NotFound(msg) => ApiError::NotFound(msg),
            StorageError::AlreadyExists(msg) => ApiError::ValidationError(msg),
            StorageError::Request(err) => ApiError::ExternalServiceError(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}
