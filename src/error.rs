//! Error kinds and their mapping to HTTP responses / DLQ decisions.
//!
//! Section 7 of the design draws a hard line between errors that are
//! surfaced to a caller, errors that trigger an internal retry, and
//! errors that are swallowed after logging. `AppError` is the single
//! enum threaded through the ingest and worker paths so that line stays
//! enforced in one place instead of at every call site.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid or expired token: {0}")]
    AuthInvalid(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("request body failed validation: {0}")]
    Validation(String),

    #[error("vote queue unavailable: {0}")]
    PublishUnavailable(String),

    #[error("counter store unavailable: {0}")]
    CounterUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<crate::results::ResultsError> for AppError {
    fn from(err: crate::results::ResultsError) -> Self {
        match err {
            crate::results::ResultsError::Database(e) => AppError::Database(e),
            crate::results::ResultsError::Counter(e) => AppError::CounterUnavailable(e.to_string()),
        }
    }
}

impl From<crate::queue::publisher::PublishError> for AppError {
    fn from(err: crate::queue::publisher::PublishError) -> Self {
        AppError::PublishUnavailable(err.to_string())
    }
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::AuthInvalid(_) => "AUTH_INVALID",
            AppError::RateLimited => "RATE_LIMITED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::PublishUnavailable(_) => "PUBLISH_UNAVAILABLE",
            AppError::CounterUnavailable(_) => "COUNTER_UNAVAILABLE",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::AuthInvalid(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PublishUnavailable(_) | AppError::CounterUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Config(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        } else {
            tracing::warn!(error = %self, code = self.error_code(), "request rejected");
        }
        let body = ErrorBody {
            error_code: self.error_code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
