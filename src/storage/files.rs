//! Physical file storage rooted at the configured upload path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::naming::{is_upload_artifact, normalize_directory, original_name, sanitize_filename};
use crate::config::DirectoryConfig;
use crate::{FileServerError, Result};

/// A completed file as seen in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFileInfo {
    /// Name on disk (`{uuid}_{original}`).
    pub filename: String,
    /// Original name as uploaded.
    pub original_name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
}

/// File storage service for the upload tree.
///
/// Layout:
/// ```text
/// {root}/
/// ├── public/
/// │   ├── 5b1c…_report.pdf
/// │   ├── 9e0a…_video.mp4.temp   (in-progress chunked upload)
/// │   └── 9e0a…_video.mp4.meta   (its sidecar)
/// └── user/
///     └── alice/
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root of the upload tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every configured top-level directory.
    pub fn initialize_directories(&self, directories: &[DirectoryConfig]) -> Result<()> {
        for dir in directories {
            let path = self.resolve_directory(&dir.path)?;
            fs::create_dir_all(&path)?;
            tracing::info!(path = %path.display(), "Storage directory ready");
        }
        Ok(())
    }

    /// Create `{container}/{username}` on first use of a private directory.
    pub fn ensure_user_directory(&self, container: &str, username: &str) -> Result<PathBuf> {
        let name = sanitize_filename(username);
        if name.is_empty() {
            return Err(FileServerError::Validation(format!(
                "invalid user directory name: {username}"
            )));
        }
        let path = self.resolve_directory(&format!("{container}/{name}"))?;
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Map a client-supplied directory to an absolute path under the root.
    pub fn resolve_directory(&self, directory: &str) -> Result<PathBuf> {
        let normalized = normalize_directory(directory)?;
        Ok(self.root.join(normalized))
    }

    /// List completed files in a directory, newest first.
    ///
    /// Sub-directories and in-progress upload artifacts are skipped.
    pub fn list_files(&self, directory: &str) -> Result<Vec<StoredFileInfo>> {
        let path = self.resolve_directory(directory)?;
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FileServerError::NotFound(format!("directory '{directory}'")))
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            if is_upload_artifact(&filename) {
                continue;
            }
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            files.push(StoredFileInfo {
                original_name: original_name(&filename).to_string(),
                filename,
                size: metadata.len(),
                modified_at,
            });
        }

        files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Action, DirectoryType};
    use tempfile::TempDir;

    fn setup_storage() -> (TempDir, FileStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        (temp_dir, storage)
    }

    fn dir(path: &str) -> DirectoryConfig {
        DirectoryConfig {
            path: path.to_string(),
            dir_type: DirectoryType::Public,
            required_roles: vec![],
            permissions: vec![Action::Read],
        }
    }

    #[test]
    fn test_new_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("uploads");
        assert!(!root.exists());

        let storage = FileStorage::new(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(storage.root(), root);
    }

    #[test]
    fn test_initialize_directories() {
        let (_temp_dir, storage) = setup_storage();
        storage
            .initialize_directories(&[dir("public"), dir("staff")])
            .unwrap();

        assert!(storage.root().join("public").is_dir());
        assert!(storage.root().join("staff").is_dir());
    }

    #[test]
    fn test_ensure_user_directory() {
        let (_temp_dir, storage) = setup_storage();
        let path = storage.ensure_user_directory("user", "alice").unwrap();
        assert_eq!(path, storage.root().join("user/alice"));
        assert!(path.is_dir());

        assert!(storage.ensure_user_directory("user", "..").is_err());
    }

    #[test]
    fn test_resolve_directory_rejects_traversal() {
        let (_temp_dir, storage) = setup_storage();
        assert!(storage.resolve_directory("../outside").is_err());
        assert_eq!(
            storage.resolve_directory("public/docs").unwrap(),
            storage.root().join("public/docs")
        );
    }

    #[test]
    fn test_list_files_skips_artifacts_and_dirs() {
        let (_temp_dir, storage) = setup_storage();
        let public = storage.root().join("public");
        fs::create_dir_all(public.join("nested")).unwrap();
        fs::write(public.join("id1_report.pdf"), b"12345").unwrap();
        fs::write(public.join("id2_video.mp4.temp"), b"").unwrap();
        fs::write(public.join("id2_video.mp4.meta"), b"{}").unwrap();
        fs::write(public.join("id2_video.mp4.meta.tmp"), b"{}").unwrap();

        let files = storage.list_files("public").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "id1_report.pdf");
        assert_eq!(files[0].original_name, "report.pdf");
        assert_eq!(files[0].size, 5);
    }

    #[test]
    fn test_list_files_missing_directory() {
        let (_temp_dir, storage) = setup_storage();
        let result = storage.list_files("nope");
        assert!(matches!(result, Err(FileServerError::NotFound(_))));
    }
}
