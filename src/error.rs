//! Application error types

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error response structure for consistent API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub message: String,
    pub correlation_id: String,
    pub timestamp: String,
}

/// Core error type shared by the matcher, provider ports, cache layer and task runtime
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("playlist not found: {0}")]
    PlaylistNotFound(String),

    #[error("track not found: {0}")]
    TrackNotFound(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("provider error ({provider}): {message}")]
    ProviderError { provider: String, message: String },

    #[error("authentication error ({provider}): {message}")]
    AuthError { provider: String, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("cache backend error: {0}")]
    CacheError(String),

    #[error("task store error: {0}")]
    TaskStoreError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::PlaylistNotFound(_) | CoreError::TrackNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::UnsupportedFeature(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CoreError::AuthError { .. } => StatusCode::UNAUTHORIZED,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::ProviderError { .. } => StatusCode::BAD_GATEWAY,
            CoreError::CacheError(_) | CoreError::TaskStoreError(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::PlaylistNotFound(_) => "PLAYLIST_NOT_FOUND",
            CoreError::TrackNotFound(_) => "TRACK_NOT_FOUND",
            CoreError::UnsupportedFeature(_) => "UNSUPPORTED_FEATURE",
            CoreError::ProviderError { .. } => "PROVIDER_ERROR",
            CoreError::AuthError { .. } => "AUTH_ERROR",
            CoreError::InvalidArgument(_) => "INVALID_ARGUMENT",
            CoreError::Timeout(_) => "TIMEOUT",
            CoreError::CacheError(_) => "CACHE_ERROR",
            CoreError::TaskStoreError(_) => "TASK_STORE_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let error_code = self.error_code();

        match status {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
                tracing::error!(correlation_id = %correlation_id, error_code, error = %self, "request failed");
            }
            _ => {
                tracing::info!(correlation_id = %correlation_id, error_code, error = %self, "request rejected");
            }
        }

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            message: self.to_string(),
            correlation_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        CoreError::TaskStoreError(err.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::ProviderError {
            provider: "http".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
