//! Error types shared by ragline services.

use thiserror::Error;

/// Result type alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for collaborator calls and shared helpers.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// External service unreachable or answered with an error
    #[error("External service error: {0}")]
    External(String),

    /// External service did not answer in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify a transport-level HTTP client error.
    pub fn from_http(service: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{service} did not respond in time"))
        } else if err.is_connect() {
            Self::External(format!("{service} unreachable: {err}"))
        } else {
            Self::External(format!("{service} request failed: {err}"))
        }
    }

    /// Check if this is a timeout error.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            Self::External(_) => 502,
            Self::Timeout(_) => 504,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::External("x".into()).status_code(), 502);
        assert_eq!(Error::Timeout("x".into()).status_code(), 504);
        assert_eq!(Error::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_error_display() {
        let err = Error::Timeout("LightRAG did not respond in time".into());
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Operation timed out: LightRAG did not respond in time"
        );
    }
}
