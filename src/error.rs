//! Error types for the file server.

use thiserror::Error;

/// Common error type for the file server.
///
/// Upload engine failures have their own typed error
/// ([`UploadError`](crate::upload::UploadError)); this one covers
/// configuration, storage bootstrap and permission evaluation.
#[derive(Error, Debug)]
pub enum FileServerError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Permission denied error.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for file server operations.
pub type Result<T> = std::result::Result<T, FileServerError>;
