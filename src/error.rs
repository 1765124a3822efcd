//! Error types for the store, the replay dispatcher and the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Reasons a replay is rejected before any outbound call or recorded attempt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("event not found: {0}")]
    EventNotFound(u64),

    #[error("target URL is required")]
    MissingTargetUrl,
}

/// Snapshot persistence failures. Logged, never surfaced to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Startup errors for the server binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// An environment variable is present but invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),
}

impl From<ReplayError> for ApiError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::EventNotFound(_) => ApiError::NotFound("Event not found".to_string()),
            ReplayError::MissingTargetUrl => ApiError::Validation("Target URL is required".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        };

        let body = ErrorBody {
            error,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
