use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by a rate limiter outside of the allow/deny path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LimiterError {
    #[error("rate limiter is closed")]
    Closed,

    #[error("invalid limiter configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} does not support runtime reconfiguration")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Errors surfaced by the waiting queue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    #[error("client {0} is not in the queue")]
    NotFound(String),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("queue pop abandoned after {attempts} conflicting attempts")]
    Contention { attempts: usize },
}

impl QueueError {
    /// Contention clears on its own; callers may simply poll again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Contention { .. })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Limiter(#[from] LimiterError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        let message = err.to_string();
        match err {
            Error::Queue(QueueError::NotFound(_)) => Self::new("not_found", &message, 404),
            Error::Queue(QueueError::Contention { .. }) => Self::new("contention", &message, 503),
            Error::Queue(QueueError::StoreUnavailable(_)) => {
                Self::new("service_unavailable", &message, 503)
            }
            Error::Limiter(LimiterError::Unsupported(_)) => Self::new("unsupported", &message, 409),
            Error::Limiter(LimiterError::InvalidConfig(_)) | Error::Validation(_) => {
                Self::new("validation_error", &message, 422)
            }
            Error::Limiter(LimiterError::Closed) => Self::new("service_unavailable", &message, 503),
            Error::Config(_) => Self::new("configuration_error", &message, 500),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        (status, Json(body)).into_response()
    }
}
