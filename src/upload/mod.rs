//! Resumable chunked uploads.
//!
//! A client creates a session declaring the file's size and chunk size,
//! sends chunks in any order (re-sending is harmless), then completes the
//! upload once every chunk has arrived. Progress is mirrored to a sidecar
//! file so sessions survive a restart, and a background sweeper removes
//! uploads whose fixed lifetime has passed.

mod chunk;
mod error;
mod manager;
mod session;
mod sidecar;
mod store;
mod sweeper;

pub use chunk::{file_sha256, ChunkWriter};
pub use error::{UploadError, UploadErrorKind};
pub use manager::{SweepReport, UploadManager, UploadSettings};
pub use session::{
    total_chunks, ChunkSet, SavedFile, UploadSession, UploadStatus, MAX_CHUNKS,
};
pub use sidecar::{SessionPaths, SidecarRecord};
pub use store::{InMemorySessionRepository, QuotaGuard, SessionRepository, SessionStore};
pub use sweeper::Sweeper;
