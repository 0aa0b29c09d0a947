//! Sidecar records persisted next to each temporary upload file.
//!
//! A sidecar is a JSON mirror of the session, named
//! `{upload_id}_{sanitized}.meta` and kept in the destination directory.
//! It is the durable source of truth for reconstructing a session after a
//! restart and for the sweeper's on-disk pass.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::UploadError;
use super::session::{total_chunks, ChunkSet, UploadSession, MAX_CHUNKS};
use crate::storage::{META_SUFFIX, META_TMP_SUFFIX, TEMP_SUFFIX};

/// On-disk form of an [`UploadSession`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarRecord {
    pub upload_id: String,
    pub user_id: String,
    pub filename: String,
    pub directory: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    /// Received indices, ascending.
    pub uploaded_chunks: Vec<u32>,
    pub uploaded_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&UploadSession> for SidecarRecord {
    fn from(session: &UploadSession) -> Self {
        Self {
            upload_id: session.upload_id.clone(),
            user_id: session.owner_id.clone(),
            filename: session.filename.clone(),
            directory: session.directory.clone(),
            total_size: session.total_size,
            chunk_size: session.chunk_size,
            total_chunks: session.total_chunks(),
            uploaded_chunks: session.uploaded_chunks.iter().collect(),
            uploaded_size: session.uploaded_size(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            expires_at: session.expires_at,
        }
    }
}

impl From<SidecarRecord> for UploadSession {
    /// Received indices are normalized: duplicates and indices outside
    /// `0..total_chunks` are dropped.
    fn from(record: SidecarRecord) -> Self {
        Self {
            uploaded_chunks: ChunkSet::from_indices(record.total_chunks, record.uploaded_chunks),
            upload_id: record.upload_id,
            owner_id: record.user_id,
            filename: record.filename,
            directory: record.directory,
            total_size: record.total_size,
            chunk_size: record.chunk_size,
            created_at: record.created_at,
            updated_at: record.updated_at,
            expires_at: record.expires_at,
        }
    }
}

/// Locations of a session's temporary file and sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub temp: PathBuf,
    pub meta: PathBuf,
}

impl SessionPaths {
    /// Paths for a session under the storage root.
    pub fn for_session(root: &Path, session: &UploadSession) -> Self {
        let dir = root.join(&session.directory);
        let stem = session.artifact_stem();
        Self {
            temp: dir.join(format!("{stem}{TEMP_SUFFIX}")),
            meta: dir.join(format!("{stem}{META_SUFFIX}")),
        }
    }

    /// Paths derived from a sidecar path found on disk.
    pub fn from_meta(meta: &Path) -> Self {
        let name = meta
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = name.strip_suffix(META_SUFFIX).unwrap_or(&name);
        Self {
            temp: meta.with_file_name(format!("{stem}{TEMP_SUFFIX}")),
            meta: meta.to_path_buf(),
        }
    }

    /// Paths derived from an interrupted sidecar rewrite found on disk.
    pub fn from_meta_tmp(meta_tmp: &Path) -> Self {
        let name = meta_tmp
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let meta = name.strip_suffix(".tmp").unwrap_or(&name);
        Self::from_meta(&meta_tmp.with_file_name(meta))
    }

    /// Where a sidecar rewrite is staged before being renamed into place.
    pub fn meta_tmp(&self) -> PathBuf {
        tmp_path(&self.meta)
    }
}

/// Persist a session to its sidecar.
///
/// The record is written to a `.meta.tmp` file and renamed into place, so a
/// crash mid-write leaves the previous sidecar intact.
pub fn write(path: &Path, session: &UploadSession) -> Result<(), UploadError> {
    let record = SidecarRecord::from(session);
    let json = serde_json::to_vec_pretty(&record).map_err(|e| UploadError::Sidecar {
        path: path.to_path_buf(),
        source: e,
    })?;

    let tmp = tmp_path(path);
    fs::write(&tmp, json).map_err(|e| UploadError::io("write sidecar", &tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(UploadError::io("replace sidecar", path, e));
    }
    Ok(())
}

/// Load a session from a sidecar.
pub fn read(path: &Path) -> Result<UploadSession, UploadError> {
    let data = fs::read(path).map_err(|e| UploadError::io("read sidecar", path, e))?;
    let record: SidecarRecord =
        serde_json::from_slice(&data).map_err(|e| UploadError::Sidecar {
            path: path.to_path_buf(),
            source: e,
        })?;

    if record.chunk_size == 0 || record.total_size == 0 {
        return Err(UploadError::InvalidRequest(format!(
            "sidecar {} declares an empty upload",
            path.display()
        )));
    }
    if total_chunks(record.total_size, record.chunk_size) != u64::from(record.total_chunks) {
        return Err(UploadError::InvalidRequest(format!(
            "sidecar {} has an inconsistent chunk count",
            path.display()
        )));
    }
    if u64::from(record.total_chunks) > MAX_CHUNKS {
        return Err(UploadError::InvalidRequest(format!(
            "sidecar {} declares {} chunks",
            path.display(),
            record.total_chunks
        )));
    }
    Ok(record.into())
}

/// Collect every sidecar below the configured directories.
///
/// Missing directories are skipped; unreadable ones are logged and skipped.
pub fn discover(root: &Path, directories: &[String]) -> Vec<PathBuf> {
    collect_all(root, directories, META_SUFFIX)
}

/// Collect staged sidecar rewrites left behind by an interrupted process.
pub fn discover_interrupted(root: &Path, directories: &[String]) -> Vec<PathBuf> {
    collect_all(root, directories, META_TMP_SUFFIX)
}

fn collect_all(root: &Path, directories: &[String], suffix: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in directories {
        collect(&root.join(dir), suffix, &mut found);
    }
    found.sort();
    found
}

/// Find the sidecar of a specific upload and load it.
///
/// Returns `None` when no readable sidecar with that id exists.
pub fn find(root: &Path, directories: &[String], upload_id: &str) -> Option<UploadSession> {
    let prefix = format!("{upload_id}_");

    discover(root, directories)
        .into_iter()
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().starts_with(&prefix))
                .unwrap_or(false)
        })
        .find_map(|path| match read(&path) {
            Ok(session) if session.upload_id == upload_id => Some(session),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(upload_id = %upload_id, path = %path.display(), "Unreadable sidecar: {}", e);
                None
            }
        })
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn tmp_path(meta: &Path) -> PathBuf {
    let mut name = meta
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    meta.with_file_name(name)
}

fn collect(dir: &Path, suffix: &str, found: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!(path = %dir.display(), "Cannot scan directory for sidecars: {}", e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect(&path, suffix, found);
        } else if file_type.is_file()
            && path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(suffix))
                .unwrap_or(false)
        {
            found.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn session(directory: &str) -> UploadSession {
        UploadSession::new(
            "7",
            "report.pdf",
            directory,
            2500,
            1000,
            Duration::from_secs(3600),
            Utc::now(),
        )
    }

    #[test]
    fn test_session_paths() {
        let s = session("public");
        let paths = SessionPaths::for_session(Path::new("/data"), &s);
        assert_eq!(
            paths.temp,
            PathBuf::from(format!("/data/public/{}_report.pdf.temp", s.upload_id))
        );
        assert_eq!(
            paths.meta,
            PathBuf::from(format!("/data/public/{}_report.pdf.meta", s.upload_id))
        );
        assert_eq!(SessionPaths::from_meta(&paths.meta), paths);
    }

    #[test]
    fn test_write_and_read_preserves_progress() {
        let dir = TempDir::new().unwrap();
        let mut s = session("public");
        s.uploaded_chunks.insert(2);
        s.uploaded_chunks.insert(0);
        let path = dir.path().join("x.meta");

        write(&path, &s).unwrap();
        let loaded = read(&path).unwrap();

        assert_eq!(loaded, s);
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_sidecar_json_layout() {
        let dir = TempDir::new().unwrap();
        let mut s = session("public");
        s.uploaded_chunks.insert(1);
        let path = dir.path().join("x.meta");
        write(&path, &s).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["user_id"], "7");
        assert_eq!(value["total_chunks"], 3);
        assert_eq!(value["uploaded_chunks"], serde_json::json!([1]));
        assert_eq!(value["uploaded_size"], 1000);
    }

    #[test]
    fn test_read_normalizes_chunk_list() {
        let dir = TempDir::new().unwrap();
        let s = session("public");
        let mut record = SidecarRecord::from(&s);
        record.uploaded_chunks = vec![2, 2, 0, 17];
        let path = dir.path().join("x.meta");
        fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.uploaded_chunks.iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_read_corrupt_sidecar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.meta");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(read(&path), Err(UploadError::Sidecar { .. })));
    }

    #[test]
    fn test_read_rejects_zero_chunk_size() {
        let dir = TempDir::new().unwrap();
        let mut record = SidecarRecord::from(&session("public"));
        record.chunk_size = 0;
        let path = dir.path().join("x.meta");
        fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();
        assert!(read(&path).is_err());
    }

    #[test]
    fn test_read_rejects_oversized_chunk_count() {
        let dir = TempDir::new().unwrap();
        let mut record = SidecarRecord::from(&session("public"));
        record.total_size = 4_000_000_000;
        record.chunk_size = 1;
        record.total_chunks = 4_000_000_000;
        record.uploaded_chunks = vec![];
        let path = dir.path().join("x.meta");
        fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();
        assert!(matches!(read(&path), Err(UploadError::InvalidRequest(_))));
    }

    #[test]
    fn test_discover_interrupted_writes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("user/alice")).unwrap();
        fs::write(root.join("user/alice/b.meta"), b"").unwrap();
        fs::write(root.join("user/alice/b.meta.tmp"), b"").unwrap();

        let dirs = vec!["user".to_string()];
        assert_eq!(discover(root, &dirs), vec![root.join("user/alice/b.meta")]);
        let staged = discover_interrupted(root, &dirs);
        assert_eq!(staged, vec![root.join("user/alice/b.meta.tmp")]);

        let paths = SessionPaths::from_meta_tmp(&staged[0]);
        assert_eq!(paths.meta, root.join("user/alice/b.meta"));
        assert_eq!(paths.temp, root.join("user/alice/b.temp"));
        assert_eq!(paths.meta_tmp(), staged[0]);
    }

    #[test]
    fn test_discover_walks_nested_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("public")).unwrap();
        fs::create_dir_all(root.join("user/alice")).unwrap();
        fs::write(root.join("public/a.meta"), b"").unwrap();
        fs::write(root.join("public/a.temp"), b"").unwrap();
        fs::write(root.join("user/alice/b.meta"), b"").unwrap();
        fs::write(root.join("outside.meta"), b"").unwrap();

        let found = discover(
            root,
            &["public".to_string(), "user".to_string(), "missing".to_string()],
        );
        assert_eq!(
            found,
            vec![root.join("public/a.meta"), root.join("user/alice/b.meta")]
        );
    }

    #[test]
    fn test_find_by_upload_id() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let dirs = vec!["user".to_string()];
        let s = session("user/alice");
        let paths = SessionPaths::for_session(root, &s);
        fs::create_dir_all(paths.meta.parent().unwrap()).unwrap();
        write(&paths.meta, &s).unwrap();

        let found = find(root, &dirs, &s.upload_id).unwrap();
        assert_eq!(found.upload_id, s.upload_id);
        assert_eq!(found.directory, "user/alice");
        assert!(find(root, &dirs, "00000000-0000-0000-0000-000000000000").is_none());
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone");
        remove_if_exists(&path).unwrap();
        fs::write(&path, b"x").unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
    }
}
