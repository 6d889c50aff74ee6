//! Error types for StreakWars
//!
//! One enum covers every failure a handler can hit; each variant maps to a
//! stable HTTP status so route modules never invent ad hoc codes.

use hyper::StatusCode;
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Database connection or query failure
    #[error("Database error: {0}")]
    Database(String),

    /// Authentication failure (bad credentials, bad token)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Request validation failure (missing or malformed fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with current state (duplicate completion,
    /// illegal war transition, insufficient balance)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream dependency failure (Groq, Exa, ElevenLabs, Resend)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// HTTP-level failure (body read, JSON parse)
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Http(_) => StatusCode::BAD_REQUEST,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for client dispatch
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DB_ERROR",
            AppError::Auth(_) => "AUTH_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Http(_) => "HTTP_ERROR",
            AppError::Io(_) => "IO_ERROR",
        }
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::NotFound("war".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Auth("bad token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Upstream("groq".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_display_includes_detail() {
        let err = AppError::Validation("wager must be positive".into());
        assert!(err.to_string().contains("wager must be positive"));
    }
}
