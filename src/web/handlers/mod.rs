//! API handlers for the upload API.

pub mod files;
pub mod upload;

pub use files::*;
pub use upload::*;

use std::sync::Arc;

use crate::auth::{DirectoryPermissions, Identity, PermissionCheck};
use crate::config::{Config, DirectoryType};
use crate::storage::FileStorage;
use crate::upload::UploadManager;
use crate::web::error::ApiError;

/// Shared application state.
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Chunked upload engine.
    pub uploads: Arc<UploadManager>,
    /// Completed file storage.
    pub storage: Arc<FileStorage>,
    /// Directory permission checker.
    pub permissions: Arc<dyn PermissionCheck>,
}

impl AppState {
    /// Create the state with the configured directory permissions.
    pub fn new(config: Arc<Config>, uploads: Arc<UploadManager>, storage: Arc<FileStorage>) -> Self {
        let permissions = Arc::new(DirectoryPermissions::new(Arc::clone(&config)));
        Self {
            config,
            uploads,
            storage,
            permissions,
        }
    }

    /// Replace the permission checker.
    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionCheck>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Create the caller's own private folder when `directory` names it.
    pub(crate) fn prepare_user_directory(
        &self,
        identity: &Identity,
        directory: &str,
    ) -> Result<(), ApiError> {
        let mut parts = directory.split('/');
        let (Some(root), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
            return Ok(());
        };
        let private = self
            .config
            .directory_config(root)
            .map(|d| d.dir_type == DirectoryType::UserPrivate)
            .unwrap_or(false);

        if private && name == identity.username {
            self.storage.ensure_user_directory(root, name)?;
        }
        Ok(())
    }
}

/// Run blocking engine work off the async runtime.
pub(crate) async fn run_blocking<T, E, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!("Blocking task failed: {}", e);
            ApiError::internal("An internal error occurred")
        })?
        .map_err(Into::into)
}
