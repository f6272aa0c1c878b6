/// Error types for Feed Service
///
/// Every fallible operation in the crate returns [`Result`]. Errors are
/// converted to JSON HTTP responses for API clients.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// Result type for feed-service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request input (bad user id, bad body)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Pagination cursor could not be decoded or is not supported
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Query failures; connectivity failures become `Dependency`
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Cache failures never reach feed readers; they surface only from
    /// explicit cache operations such as a forced refresh.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A collaborator (database, follow graph, post store, likes) is unreachable
    #[error("Dependency unavailable: {0}")]
    Dependency(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl AppError {
    /// Errors caused by the caller rather than by the service or its dependencies.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::BadRequest(_) | AppError::InvalidCursor(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Dependency(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Don't leak driver details to clients
        let message = match self {
            AppError::Database(_) => "Database error".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(status).json(serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        }))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => AppError::Dependency(format!("database: {}", err)),
            other => AppError::Database(other),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("Invalid JSON payload: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout("deadline elapsed".to_string())
    }
}
