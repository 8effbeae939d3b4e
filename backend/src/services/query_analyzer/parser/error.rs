//! Parser error types for completed-request analysis

use thiserror::Error;

/// Errors that can occur while ingesting records, plans and catalogs
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unexpected shape: {0}")]
    UnexpectedShape(String),

    #[error("Failed to parse duration: {0}")]
    ParseDurationError(String),

    #[error("Failed to parse number: {0}")]
    ParseNumberError(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::InvalidJson(err.to_string())
    }
}

/// Result type alias for parser operations
pub type ParseResult<T> = Result<T, ParseError>;
