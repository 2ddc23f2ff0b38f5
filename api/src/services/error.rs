//! Error handling for services and route handlers

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Cross-tenant access to a class, book or chapter
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests, try again later")]
    RateLimited,

    /// Any external API failure, including a presentation poll timeout
    #[error("{0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Re-wrap an error at a service boundary as "Failed to <action>: <message>".
    ///
    /// Not-found, validation and authorization errors keep their kind so the
    /// caller still gets a meaningful status code.
    pub fn during(self, action: &str) -> AppError {
        match self {
            AppError::Upstream(msg) => AppError::Upstream(format!("Failed to {action}: {msg}")),
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error while trying to {action}");
                AppError::Upstream(format!("Failed to {action}: {e}"))
            }
            AppError::Validation(msg) => AppError::Validation(format!("Failed to {action}: {msg}")),
            other => other,
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

/// Extension trait for logging an external failure and wrapping it as
/// `AppError::Upstream("Failed to <action>: <message>")`
pub trait FailedTo<T> {
    fn failed_to(self, action: &str) -> AppResult<T>;
}

impl<T, E: std::fmt::Display> FailedTo<T> for Result<T, E> {
    fn failed_to(self, action: &str) -> AppResult<T> {
        self.map_err(|e| {
            tracing::error!(error = %e, "Failed to {action}");
            AppError::Upstream(format!("Failed to {action}: {e}"))
        })
    }
}

/// Extension trait applying [`AppError::during`] to a result
pub trait During<T> {
    fn during(self, action: &str) -> AppResult<T>;
}

impl<T> During<T> for AppResult<T> {
    fn during(self, action: &str) -> AppResult<T> {
        self.map_err(|e| e.during(action))
    }
}
