//! Request DTOs for the upload API.

use serde::Deserialize;
use validator::Validate;

/// Body of `POST /api/uploads`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUploadRequest {
    /// Original filename.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub filename: String,
    /// Destination directory, e.g. `public` or `user/alice`.
    #[validate(length(
        min = 1,
        max = 1024,
        message = "Directory must be between 1 and 1024 characters"
    ))]
    pub directory: String,
    /// Declared file size in bytes.
    #[validate(range(min = 1, message = "File size must be at least 1 byte"))]
    pub file_size: u64,
    /// Chunk size in bytes; the server default applies when omitted.
    #[serde(default)]
    #[validate(range(min = 1, message = "Chunk size must be at least 1 byte"))]
    pub chunk_size: Option<u64>,
}

/// Query of `GET /api/files`.
#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub directory: String,
}
