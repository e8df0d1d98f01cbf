//! Error types for the catalog service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("No database connection available within {0} seconds")]
    ConnectionExhausted(u64),

    #[error("Duplicate entry: {0}")]
    DuplicateKey(String),

    #[error("Malformed cursor: {0}")]
    MalformedCursor(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify a driver error.
    ///
    /// `pool_timeout_seconds` is only used to describe pool exhaustion.
    pub fn from_sqlx(err: sqlx::Error, pool_timeout_seconds: u64) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => Self::ConnectionExhausted(pool_timeout_seconds),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::DuplicateKey(db.message().to_string())
            }
            _ => Self::Database(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MalformedCursor(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateKey(_) => StatusCode::CONFLICT,
            Self::ConnectionExhausted(_) | Self::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether a client may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionExhausted(_) | Self::Upstream(_) | Self::Timeout(_)
        )
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::from_sqlx(err, 0)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() && !self.is_retryable() {
            tracing::error!(error = %self, "Internal error");
            "An unknown error occurred".to_string()
        } else {
            if status.is_server_error() {
                tracing::warn!(error = %self, "Service unavailable");
            } else {
                tracing::debug!(error = %self, status = status.as_u16(), "Client error");
            }
            self.to_string()
        };

        let body = if self.is_retryable() {
            json!({ "message": message, "retryable": true })
        } else {
            json!({ "message": message })
        };

        (status, Json(body)).into_response()
    }
}
