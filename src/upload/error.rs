//! Error types for the upload engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by upload lifecycle operations.
#[derive(Error, Debug)]
pub enum UploadError {
    /// Unknown or expired upload id, not recoverable from a sidecar.
    #[error("upload session {0} not found")]
    NotFound(String),

    /// Owner already has the maximum number of active uploads.
    #[error("concurrent upload limit reached for {owner} (max {limit})")]
    QuotaExceeded { owner: String, limit: usize },

    /// Declared size exceeds the configured ceiling.
    #[error("file size {size} exceeds the limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// Completion attempted before every chunk index was received.
    #[error("upload incomplete: {received} of {expected} chunks received")]
    IncompleteUpload { received: u32, expected: u32 },

    /// Malformed creation or chunk parameters.
    #[error("invalid upload request: {0}")]
    InvalidRequest(String),

    /// Chunk index outside `[0, total_chunks)`.
    #[error("chunk index {index} out of range (total chunks {total})")]
    ChunkOutOfRange { index: u32, total: u32 },

    /// Chunk body longer than its slot in the file.
    #[error("chunk {index} is {len} bytes, more than the {max} bytes expected")]
    ChunkTooLarge { index: u32, len: usize, max: u64 },

    /// Filesystem failure.
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Sidecar record could not be encoded or decoded.
    #[error("invalid sidecar {}: {source}", path.display())]
    Sidecar {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Kind of an [`UploadError`], for mapping to transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorKind {
    NotFound,
    QuotaExceeded,
    FileTooLarge,
    IncompleteUpload,
    InvalidRequest,
    Io,
}

impl UploadError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        UploadError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> UploadErrorKind {
        match self {
            UploadError::NotFound(_) => UploadErrorKind::NotFound,
            UploadError::QuotaExceeded { .. } => UploadErrorKind::QuotaExceeded,
            UploadError::FileTooLarge { .. } => UploadErrorKind::FileTooLarge,
            UploadError::IncompleteUpload { .. } => UploadErrorKind::IncompleteUpload,
            UploadError::InvalidRequest(_)
            | UploadError::ChunkOutOfRange { .. }
            | UploadError::ChunkTooLarge { .. } => UploadErrorKind::InvalidRequest,
            UploadError::Io { .. } | UploadError::Sidecar { .. } => UploadErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            UploadError::NotFound("x".into()).kind(),
            UploadErrorKind::NotFound
        );
        assert_eq!(
            UploadError::QuotaExceeded {
                owner: "u".into(),
                limit: 3
            }
            .kind(),
            UploadErrorKind::QuotaExceeded
        );
        assert_eq!(
            UploadError::ChunkOutOfRange { index: 9, total: 3 }.kind(),
            UploadErrorKind::InvalidRequest
        );
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            UploadError::io("open", "/tmp/x", io).kind(),
            UploadErrorKind::Io
        );
    }

    #[test]
    fn test_io_error_names_operation_and_path() {
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = UploadError::io("rename", "/data/a.temp", io);
        let msg = err.to_string();
        assert!(msg.contains("rename"));
        assert!(msg.contains("/data/a.temp"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_incomplete_display() {
        let err = UploadError::IncompleteUpload {
            received: 3,
            expected: 10,
        };
        assert_eq!(
            err.to_string(),
            "upload incomplete: 3 of 10 chunks received"
        );
    }
}
