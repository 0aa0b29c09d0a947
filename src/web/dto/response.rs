//! Response DTOs for the upload API.

use serde::Serialize;

use crate::config::{Action, DirectoryConfig, DirectoryType};
use crate::upload::UploadSession;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Response to upload creation.
#[derive(Debug, Serialize)]
pub struct CreateUploadResponse {
    pub upload_id: String,
    pub total_chunks: u32,
    pub chunk_size: u64,
    pub expires_at: String,
}

impl From<&UploadSession> for CreateUploadResponse {
    fn from(session: &UploadSession) -> Self {
        Self {
            upload_id: session.upload_id.clone(),
            total_chunks: session.total_chunks(),
            chunk_size: session.chunk_size,
            expires_at: session.expires_at.to_rfc3339(),
        }
    }
}

/// Response to a stored chunk.
#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub chunk_index: u32,
}

/// Response to a cancelled upload.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// A directory visible to the caller.
#[derive(Debug, Serialize)]
pub struct DirectoryResponse {
    pub path: String,
    #[serde(rename = "type")]
    pub dir_type: DirectoryType,
    pub permissions: Vec<Action>,
}

impl From<DirectoryConfig> for DirectoryResponse {
    fn from(dir: DirectoryConfig) -> Self {
        Self {
            path: dir.path,
            dir_type: dir.dir_type,
            permissions: dir.permissions,
        }
    }
}
