//! fileserver - role-gated file sharing backend
//!
//! Files are shared through configured directories whose access is decided
//! by the caller's roles. Large files arrive through a resumable chunked
//! upload engine that survives restarts and reclaims abandoned uploads.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod upload;
pub mod web;

pub use auth::{DirectoryPermissions, Identity, PermissionCheck};
pub use config::Config;
pub use error::{FileServerError, Result};
pub use storage::FileStorage;
pub use upload::{
    SavedFile, SweepReport, Sweeper, UploadError, UploadErrorKind, UploadManager, UploadSession,
    UploadSettings, UploadStatus,
};
pub use web::WebServer;
