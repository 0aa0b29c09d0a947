//! Upload lifecycle: create, receive chunks, complete, cancel and sweep.
//!
//! Every operation that reads or mutates session state runs under a single
//! store lock, including the sidecar write that follows a chunk. Only the
//! post-completion stat and hash run outside it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::chunk::{file_sha256, ChunkWriter};
use super::error::UploadError;
use super::session::{total_chunks, SavedFile, UploadSession, UploadStatus, MAX_CHUNKS};
use super::sidecar::{self, SessionPaths};
use super::store::{InMemorySessionRepository, SessionRepository, SessionStore};
use crate::config::StorageConfig;
use crate::storage::{normalize_directory, sanitize_filename, stored_name};

/// Tunables of the upload engine.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Largest accepted declared file size.
    pub max_file_size: u64,
    /// Chunk size used when the client does not pick one.
    pub default_chunk_size: u64,
    /// Largest chunk size a client may pick.
    pub max_chunk_size: u64,
    /// Active uploads allowed per owner.
    pub max_concurrent_uploads: usize,
    /// Fixed session lifetime.
    pub session_ttl: Duration,
    /// Compute a SHA-256 of completed files.
    pub hash_on_complete: bool,
}

impl UploadSettings {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_file_size: config.max_chunk_file_size,
            default_chunk_size: config.chunk_size,
            max_chunk_size: config.max_chunk_size,
            max_concurrent_uploads: config.max_concurrent_uploads,
            session_ttl: config.session_ttl(),
            hash_on_complete: config.hash_on_complete,
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Live sessions removed because they expired.
    pub expired_sessions: usize,
    /// Expired sidecars with no live session, removed from disk.
    pub orphaned_files: usize,
    /// Artifacts that could not be read or deleted.
    pub errors: usize,
}

/// Coordinates resumable uploads under a storage root.
pub struct UploadManager<R = InMemorySessionRepository> {
    root: PathBuf,
    directories: Vec<String>,
    settings: UploadSettings,
    store: Mutex<SessionStore<R>>,
}

impl UploadManager {
    /// Create a manager with an in-memory session registry.
    ///
    /// `directories` are the top-level directories searched for sidecars.
    pub fn new(root: impl Into<PathBuf>, directories: Vec<String>, settings: UploadSettings) -> Self {
        Self::with_repository(root, directories, settings, InMemorySessionRepository::new())
    }

    /// Create a manager from the storage configuration.
    pub fn from_config(config: &StorageConfig) -> Self {
        let directories = config.directories.iter().map(|d| d.path.clone()).collect();
        Self::new(
            &config.upload_path,
            directories,
            UploadSettings::from_config(config),
        )
    }
}

impl<R: SessionRepository> UploadManager<R> {
    /// Create a manager backed by a custom session repository.
    pub fn with_repository(
        root: impl Into<PathBuf>,
        directories: Vec<String>,
        settings: UploadSettings,
        repository: R,
    ) -> Self {
        let limit = settings.max_concurrent_uploads;
        Self {
            root: root.into(),
            directories,
            settings,
            store: Mutex::new(SessionStore::new(repository, limit)),
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new upload.
    ///
    /// Creates the empty temporary file and the initial sidecar. On any
    /// failure nothing is left behind and no quota is consumed.
    pub fn create(
        &self,
        owner_id: &str,
        filename: &str,
        directory: &str,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<UploadSession, UploadError> {
        if owner_id.is_empty() {
            return Err(UploadError::InvalidRequest("owner is required".to_string()));
        }
        if total_size == 0 {
            return Err(UploadError::InvalidRequest(
                "file size must be greater than zero".to_string(),
            ));
        }
        if chunk_size == 0 {
            return Err(UploadError::InvalidRequest(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if chunk_size > self.settings.max_chunk_size {
            return Err(UploadError::InvalidRequest(format!(
                "chunk size {chunk_size} exceeds the limit of {} bytes",
                self.settings.max_chunk_size
            )));
        }
        if total_size > self.settings.max_file_size {
            return Err(UploadError::FileTooLarge {
                size: total_size,
                limit: self.settings.max_file_size,
            });
        }
        if total_chunks(total_size, chunk_size) > MAX_CHUNKS {
            return Err(UploadError::InvalidRequest(format!(
                "chunk size {chunk_size} splits the file into more than {MAX_CHUNKS} chunks"
            )));
        }
        if sanitize_filename(filename).is_empty() {
            return Err(UploadError::InvalidRequest(format!(
                "invalid filename: {filename:?}"
            )));
        }
        let directory = self.check_directory(directory)?;

        let mut store = self.lock_store();
        store.quota.try_acquire(owner_id)?;

        let session = UploadSession::new(
            owner_id,
            filename,
            directory,
            total_size,
            chunk_size,
            self.settings.session_ttl,
            Utc::now(),
        );
        let paths = SessionPaths::for_session(&self.root, &session);

        if let Err(e) = self.create_artifacts(&paths, &session) {
            store.quota.release(owner_id);
            return Err(e);
        }

        tracing::info!(
            upload_id = %session.upload_id,
            owner = %owner_id,
            path = %paths.temp.display(),
            total_size,
            total_chunks = session.total_chunks(),
            "Upload session created"
        );

        store.sessions.insert(session.clone());
        Ok(session)
    }

    /// Record one chunk.
    ///
    /// Re-sending an already recorded index is a successful no-op. A session
    /// known only from its sidecar becomes live here.
    pub fn save_chunk(&self, upload_id: &str, chunk_index: u32, data: &[u8]) -> Result<(), UploadError> {
        let now = Utc::now();
        let mut store = self.lock_store();

        if store.sessions.get(upload_id).is_none() {
            let session = self
                .reconstruct(upload_id, now)
                .ok_or_else(|| UploadError::NotFound(upload_id.to_string()))?;
            validate_chunk(&session, chunk_index, data)?;
            tracing::info!(
                upload_id = %upload_id,
                owner = %session.owner_id,
                received = session.uploaded_chunks.len(),
                "Upload session reconstructed from sidecar"
            );
            store.adopt(session);
        }

        let session = store
            .sessions
            .get_mut(upload_id)
            .filter(|s| !s.is_expired(now))
            .ok_or_else(|| UploadError::NotFound(upload_id.to_string()))?;
        validate_chunk(session, chunk_index, data)?;

        if session.uploaded_chunks.contains(chunk_index) {
            tracing::debug!(upload_id = %upload_id, chunk_index, "Chunk already received");
            return Ok(());
        }

        let paths = SessionPaths::for_session(&self.root, session);
        ChunkWriter::new(&paths.temp)
            .write_at(session.chunk_offset(chunk_index), data)
            .map_err(|e| UploadError::io("write chunk to", &paths.temp, e))?;

        let previous_update = session.updated_at;
        session.uploaded_chunks.insert(chunk_index);
        session.updated_at = now;

        if let Err(e) = sidecar::write(&paths.meta, session) {
            session.uploaded_chunks.remove(chunk_index);
            session.updated_at = previous_update;
            return Err(e);
        }

        tracing::debug!(
            upload_id = %upload_id,
            chunk_index,
            received = session.uploaded_chunks.len(),
            total = session.total_chunks(),
            "Chunk saved"
        );
        Ok(())
    }

    /// Look up a session, live or reconstructed from its sidecar.
    ///
    /// Reads never make a reconstructed session live.
    pub fn get(&self, upload_id: &str) -> Result<UploadSession, UploadError> {
        let now = Utc::now();
        let live = self.lock_store().sessions.get(upload_id).cloned();

        match live {
            Some(session) if !session.is_expired(now) => Ok(session),
            Some(_) => Err(UploadError::NotFound(upload_id.to_string())),
            None => self
                .reconstruct(upload_id, now)
                .ok_or_else(|| UploadError::NotFound(upload_id.to_string())),
        }
    }

    /// Progress snapshot of an upload.
    pub fn status(&self, upload_id: &str) -> Result<UploadStatus, UploadError> {
        self.get(upload_id).map(|s| s.status())
    }

    /// Finalize a fully received upload.
    ///
    /// The temporary file is renamed to `{uuid}_{sanitized}` in the
    /// destination directory. If the rename fails, the session, sidecar and
    /// temporary file are left untouched so the call can be retried.
    pub fn complete(&self, upload_id: &str) -> Result<SavedFile, UploadError> {
        let now = Utc::now();

        let (session, stored, final_path) = {
            let mut store = self.lock_store();
            let (session, live) = match store.sessions.get(upload_id) {
                Some(s) => (s.clone(), true),
                None => (
                    self.reconstruct(upload_id, now)
                        .ok_or_else(|| UploadError::NotFound(upload_id.to_string()))?,
                    false,
                ),
            };

            if session.is_expired(now) {
                return Err(UploadError::NotFound(upload_id.to_string()));
            }
            if !session.is_complete() {
                return Err(UploadError::IncompleteUpload {
                    received: session.uploaded_chunks.len(),
                    expected: session.total_chunks(),
                });
            }

            let paths = SessionPaths::for_session(&self.root, &session);
            let stored = stored_name(&session.filename);
            let final_path = self.root.join(&session.directory).join(&stored);

            fs::rename(&paths.temp, &final_path)
                .map_err(|e| UploadError::io("move completed upload", &paths.temp, e))?;

            if let Err(e) = sidecar::remove_if_exists(&paths.meta) {
                tracing::warn!(
                    upload_id = %upload_id,
                    path = %paths.meta.display(),
                    "Failed to remove sidecar: {}",
                    e
                );
            }
            if live {
                store.evict(upload_id);
            }
            (session, stored, final_path)
        };

        let size = fs::metadata(&final_path)
            .map_err(|e| UploadError::io("stat completed upload", &final_path, e))?
            .len();
        let sha256 = if self.settings.hash_on_complete {
            Some(
                file_sha256(&final_path)
                    .map_err(|e| UploadError::io("hash completed upload", &final_path, e))?,
            )
        } else {
            None
        };

        tracing::info!(
            upload_id = %upload_id,
            owner = %session.owner_id,
            path = %final_path.display(),
            size,
            "Upload completed"
        );

        Ok(SavedFile {
            path: format!("{}/{}", session.directory, stored),
            filename: stored,
            size,
            sha256,
        })
    }

    /// Abort an upload and delete its artifacts.
    ///
    /// Works on expired sessions too. Missing files are not an error.
    pub fn cancel(&self, upload_id: &str) -> Result<(), UploadError> {
        let mut store = self.lock_store();
        let session = match store.evict(upload_id) {
            Some(session) => session,
            None => self
                .find_sidecar(upload_id)
                .ok_or_else(|| UploadError::NotFound(upload_id.to_string()))?,
        };

        let paths = SessionPaths::for_session(&self.root, &session);
        remove_artifacts(upload_id, &paths);

        tracing::info!(upload_id = %upload_id, owner = %session.owner_id, "Upload cancelled");
        Ok(())
    }

    /// All live sessions, oldest first.
    pub fn list_all(&self) -> Vec<UploadSession> {
        self.lock_store().sessions.list()
    }

    /// Active uploads counted against an owner.
    pub fn active_uploads(&self, owner_id: &str) -> usize {
        self.lock_store().quota.active(owner_id)
    }

    /// Adopt every unexpired sidecar on disk as a live session.
    ///
    /// Run once at startup so the per-owner quota reflects uploads that
    /// survived a restart. Returns the number of sessions restored.
    pub fn restore(&self) -> usize {
        let now = Utc::now();
        let mut store = self.lock_store();
        let mut restored = 0;

        for path in sidecar::discover(&self.root, &self.directories) {
            let session = match sidecar::read(&path) {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable sidecar: {}", e);
                    continue;
                }
            };
            if session.is_expired(now) || store.sessions.get(&session.upload_id).is_some() {
                continue;
            }
            tracing::debug!(
                upload_id = %session.upload_id,
                owner = %session.owner_id,
                path = %path.display(),
                "Restored upload session"
            );
            store.adopt(session);
            restored += 1;
        }

        if restored > 0 {
            tracing::info!(restored, "Restored upload sessions from sidecars");
        }
        restored
    }

    /// Remove expired sessions and orphaned artifacts.
    ///
    /// The in-memory pass evicts expired live sessions; the on-disk pass
    /// deletes expired sidecars (and their temp files) that have no live
    /// session. Unreadable sidecars are counted and skipped.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let mut store = self.lock_store();

        for upload_id in store.sessions.expired_ids(now) {
            let Some(session) = store.evict(&upload_id) else {
                continue;
            };
            let paths = SessionPaths::for_session(&self.root, &session);
            report.errors += remove_artifacts(&upload_id, &paths);
            report.expired_sessions += 1;
            tracing::info!(upload_id = %upload_id, owner = %session.owner_id, "Expired upload session removed");
        }

        for meta in sidecar::discover(&self.root, &self.directories) {
            let session = match sidecar::read(&meta) {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(path = %meta.display(), "Skipping unreadable sidecar: {}", e);
                    report.errors += 1;
                    continue;
                }
            };
            if !session.is_expired(now) || store.sessions.get(&session.upload_id).is_some() {
                continue;
            }
            let paths = SessionPaths::from_meta(&meta);
            report.errors += remove_artifacts(&session.upload_id, &paths);
            report.orphaned_files += 1;
            tracing::info!(
                upload_id = %session.upload_id,
                path = %meta.display(),
                "Orphaned upload artifacts removed"
            );
        }

        for staged in sidecar::discover_interrupted(&self.root, &self.directories) {
            match self.sweep_interrupted_write(&staged, now) {
                Ok(true) => report.orphaned_files += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %staged.display(), "Failed to remove interrupted sidecar write: {}", e);
                    report.errors += 1;
                }
            }
        }

        report
    }

    /// Remove a staged sidecar rewrite once it is older than a session
    /// lifetime. When no sidecar was ever committed next to it, the temp
    /// file can no longer be reached and goes too.
    fn sweep_interrupted_write(&self, staged: &Path, now: DateTime<Utc>) -> std::io::Result<bool> {
        let modified: DateTime<Utc> = fs::metadata(staged)?.modified()?.into();
        let stale = now
            .signed_duration_since(modified)
            .to_std()
            .map(|age| age >= self.settings.session_ttl)
            .unwrap_or(false);
        if !stale {
            return Ok(false);
        }

        let paths = SessionPaths::from_meta_tmp(staged);
        sidecar::remove_if_exists(staged)?;
        if !paths.meta.exists() {
            sidecar::remove_if_exists(&paths.temp)?;
        }
        tracing::info!(path = %staged.display(), "Interrupted sidecar write removed");
        Ok(true)
    }

    fn lock_store(&self) -> MutexGuard<'_, SessionStore<R>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_directory(&self, directory: &str) -> Result<String, UploadError> {
        let directory =
            normalize_directory(directory).map_err(|e| UploadError::InvalidRequest(e.to_string()))?;
        let root = directory.split('/').next().unwrap_or_default();
        if !self.directories.iter().any(|d| d == root) {
            return Err(UploadError::InvalidRequest(format!(
                "unknown directory: {directory}"
            )));
        }
        Ok(directory)
    }

    fn create_artifacts(&self, paths: &SessionPaths, session: &UploadSession) -> Result<(), UploadError> {
        ChunkWriter::new(&paths.temp)
            .create()
            .map_err(|e| UploadError::io("create temp file", &paths.temp, e))?;

        if let Err(e) = sidecar::write(&paths.meta, session) {
            let _ = sidecar::remove_if_exists(&paths.temp);
            return Err(e);
        }
        Ok(())
    }

    fn find_sidecar(&self, upload_id: &str) -> Option<UploadSession> {
        if Uuid::parse_str(upload_id).is_err() {
            return None;
        }
        sidecar::find(&self.root, &self.directories, upload_id)
    }

    fn reconstruct(&self, upload_id: &str, now: DateTime<Utc>) -> Option<UploadSession> {
        self.find_sidecar(upload_id).filter(|s| !s.is_expired(now))
    }
}

fn validate_chunk(session: &UploadSession, index: u32, data: &[u8]) -> Result<(), UploadError> {
    let total = session.total_chunks();
    if index >= total {
        return Err(UploadError::ChunkOutOfRange { index, total });
    }
    if data.is_empty() {
        return Err(UploadError::InvalidRequest(format!("chunk {index} is empty")));
    }
    let max = session.chunk_len(index);
    if data.len() as u64 > max {
        return Err(UploadError::ChunkTooLarge {
            index,
            len: data.len(),
            max,
        });
    }
    Ok(())
}

/// Delete a session's temp file, sidecar and staged sidecar rewrite,
/// returning the failure count.
fn remove_artifacts(upload_id: &str, paths: &SessionPaths) -> usize {
    let mut errors = 0;
    for path in [&paths.temp, &paths.meta, &paths.meta_tmp()] {
        if let Err(e) = sidecar::remove_if_exists(path) {
            tracing::warn!(upload_id = %upload_id, path = %path.display(), "Failed to remove upload artifact: {}", e);
            errors += 1;
        }
    }
    errors
}
