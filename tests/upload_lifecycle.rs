//! Upload Lifecycle Tests
//!
//! Integration tests for the chunked upload engine: ordering, retries,
//! quota, restart recovery and expiry.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fileserver::storage::{original_name, FileStorage, MAX_NAME_BYTES};
use fileserver::upload::{SessionPaths, UploadError, UploadManager, UploadSettings};
use tempfile::TempDir;

const MB: u64 = 1_000_000;

fn settings() -> UploadSettings {
    UploadSettings {
        max_file_size: 50 * MB,
        default_chunk_size: MB,
        max_chunk_size: 2 * MB,
        max_concurrent_uploads: 3,
        session_ttl: Duration::from_secs(3600),
        hash_on_complete: false,
    }
}

fn create_manager(root: &Path) -> UploadManager {
    UploadManager::new(
        root,
        vec!["public".to_string(), "user".to_string()],
        settings(),
    )
}

fn chunk(index: u32, len: usize) -> Vec<u8> {
    vec![index as u8; len]
}

fn artifacts(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| n.ends_with(".temp") || n.ends_with(".meta"))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ============================================================================
// Ordering and Retries
// ============================================================================

#[test]
fn test_reverse_order_upload_assembles_file() {
    let dir = TempDir::new().unwrap();
    let manager = create_manager(dir.path());

    let session = manager
        .create("42", "video.mp4", "public", 10 * MB, MB)
        .unwrap();
    assert_eq!(session.total_chunks(), 10);

    for index in (0..10).rev() {
        manager
            .save_chunk(&session.upload_id, index, &chunk(index, MB as usize))
            .unwrap();
    }

    let saved = manager.complete(&session.upload_id).unwrap();
    assert_eq!(saved.size, 10 * MB);
    assert_eq!(original_name(&saved.filename), "video.mp4");

    let content = fs::read(dir.path().join("public").join(&saved.filename)).unwrap();
    for index in 0..10u32 {
        let start = index as usize * MB as usize;
        assert!(content[start..start + MB as usize]
            .iter()
            .all(|b| *b == index as u8));
    }
    assert!(artifacts(&dir.path().join("public")).is_empty());
}

#[test]
fn test_retried_chunk_counts_once() {
    let dir = TempDir::new().unwrap();
    let manager = create_manager(dir.path());
    let session = manager.create("42", "a.bin", "public", 3 * MB, MB).unwrap();

    manager
        .save_chunk(&session.upload_id, 1, &chunk(1, MB as usize))
        .unwrap();
    manager
        .save_chunk(&session.upload_id, 1, &chunk(1, MB as usize))
        .unwrap();

    let status = manager.status(&session.upload_id).unwrap();
    assert_eq!(status.uploaded_chunks, vec![1]);
    assert_eq!(status.uploaded_size, MB);

    let err = manager.complete(&session.upload_id).unwrap_err();
    assert!(matches!(
        err,
        UploadError::IncompleteUpload {
            received: 1,
            expected: 3
        }
    ));
}

#[test]
fn test_short_last_chunk() {
    let dir = TempDir::new().unwrap();
    let manager = create_manager(dir.path());
    let session = manager.create("42", "odd.bin", "public", 2500, 1000).unwrap();

    manager.save_chunk(&session.upload_id, 2, &chunk(2, 500)).unwrap();
    manager.save_chunk(&session.upload_id, 0, &chunk(0, 1000)).unwrap();
    manager.save_chunk(&session.upload_id, 1, &chunk(1, 1000)).unwrap();

    let status = manager.status(&session.upload_id).unwrap();
    assert_eq!(status.uploaded_size, 2500);

    let saved = manager.complete(&session.upload_id).unwrap();
    assert_eq!(saved.size, 2500);
}

#[test]
fn test_long_filenames_are_shortened() {
    let dir = TempDir::new().unwrap();
    let manager = create_manager(dir.path());

    for name in [
        format!("{}.bin", "a".repeat(220)),
        format!("{}.txt", "資".repeat(79)),
    ] {
        let session = manager.create("42", &name, "public", 10, 10).unwrap();
        let paths = SessionPaths::for_session(dir.path(), &session);
        assert!(paths.temp.exists());
        assert!(paths.meta.exists());

        manager
            .save_chunk(&session.upload_id, 0, &chunk(0, 10))
            .unwrap();
        let saved = manager.complete(&session.upload_id).unwrap();

        let extension = &name[name.len() - 4..];
        assert!(original_name(&saved.filename).ends_with(extension));
        assert!(original_name(&saved.filename).len() <= MAX_NAME_BYTES);
        assert!(dir.path().join("public").join(&saved.filename).exists());
    }
}

#[test]
fn test_concurrent_chunks_for_one_session() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(create_manager(dir.path()));
    let session = manager.create("42", "par.bin", "public", 16_000, 1000).unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4u32 {
            let manager = Arc::clone(&manager);
            let upload_id = session.upload_id.clone();
            scope.spawn(move || {
                for index in (worker..16).step_by(4) {
                    manager
                        .save_chunk(&upload_id, index, &chunk(index, 1000))
                        .unwrap();
                    // Every chunk is delivered twice
                    manager
                        .save_chunk(&upload_id, index, &chunk(index, 1000))
                        .unwrap();
                }
            });
        }
    });

    let saved = manager.complete(&session.upload_id).unwrap();
    assert_eq!(saved.size, 16_000);
    let content = fs::read(dir.path().join("public").join(&saved.filename)).unwrap();
    assert_eq!(content[15_500], 15);
}

// ============================================================================
// Quota and Limits
// ============================================================================

#[test]
fn test_quota_is_per_owner_and_released() {
    let dir = TempDir::new().unwrap();
    let manager = create_manager(dir.path());

    let first = manager.create("7", "1.bin", "public", 10, 10).unwrap();
    manager.create("7", "2.bin", "public", 10, 10).unwrap();
    manager.create("7", "3.bin", "public", 10, 10).unwrap();

    let err = manager.create("7", "4.bin", "public", 10, 10).unwrap_err();
    assert!(matches!(err, UploadError::QuotaExceeded { limit: 3, .. }));

    // Other owners are unaffected
    manager.create("8", "x.bin", "public", 10, 10).unwrap();

    manager.save_chunk(&first.upload_id, 0, &chunk(0, 10)).unwrap();
    manager.complete(&first.upload_id).unwrap();
    manager.create("7", "4.bin", "public", 10, 10).unwrap();
}

#[test]
fn test_file_too_large_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let manager = create_manager(dir.path());

    let err = manager
        .create("7", "huge.iso", "public", 50 * MB + 1, MB)
        .unwrap_err();
    assert!(matches!(err, UploadError::FileTooLarge { .. }));
    assert!(artifacts(&dir.path().join("public")).is_empty());
    assert_eq!(manager.active_uploads("7"), 0);
}

#[test]
fn test_cancel_twice() {
    let dir = TempDir::new().unwrap();
    let manager = create_manager(dir.path());
    let session = manager.create("7", "a.bin", "public", 20, 10).unwrap();
    manager.save_chunk(&session.upload_id, 0, &chunk(0, 10)).unwrap();

    manager.cancel(&session.upload_id).unwrap();
    assert!(artifacts(&dir.path().join("public")).is_empty());

    let err = manager.cancel(&session.upload_id).unwrap_err();
    assert!(matches!(err, UploadError::NotFound(_)));
}

#[test]
fn test_complete_after_complete_is_not_found() {
    let dir = TempDir::new().unwrap();
    let manager = create_manager(dir.path());
    let session = manager.create("7", "a.bin", "public", 10, 10).unwrap();
    manager.save_chunk(&session.upload_id, 0, &chunk(0, 10)).unwrap();

    manager.complete(&session.upload_id).unwrap();
    let err = manager.complete(&session.upload_id).unwrap_err();
    assert!(matches!(err, UploadError::NotFound(_)));
}

// ============================================================================
// Restart Recovery
// ============================================================================

#[test]
fn test_resume_after_restart() {
    let dir = TempDir::new().unwrap();

    let upload_id = {
        let manager = create_manager(dir.path());
        let session = manager
            .create("42", "backup.tar", "user/alice", 10 * 1000, 1000)
            .unwrap();
        for index in 0..5 {
            manager
                .save_chunk(&session.upload_id, index, &chunk(index, 1000))
                .unwrap();
        }
        session.upload_id
    };

    // New process, empty in-memory store
    let manager = create_manager(dir.path());
    let status = manager.status(&upload_id).unwrap();
    assert_eq!(status.uploaded_chunks, vec![0, 1, 2, 3, 4]);
    assert_eq!(status.directory, "user/alice");

    for index in 5..10 {
        manager
            .save_chunk(&upload_id, index, &chunk(index, 1000))
            .unwrap();
    }
    let saved = manager.complete(&upload_id).unwrap();
    assert_eq!(saved.size, 10_000);
    assert!(saved.path.starts_with("user/alice/"));
    assert_eq!(manager.active_uploads("42"), 0);
}

#[test]
fn test_restore_counts_surviving_uploads_against_quota() {
    let dir = TempDir::new().unwrap();
    {
        let manager = create_manager(dir.path());
        for name in ["a", "b", "c"] {
            manager.create("7", name, "public", 10, 10).unwrap();
        }
    }

    let manager = create_manager(dir.path());
    assert_eq!(manager.restore(), 3);
    assert_eq!(manager.list_all().len(), 3);

    let err = manager.create("7", "d", "public", 10, 10).unwrap_err();
    assert!(matches!(err, UploadError::QuotaExceeded { .. }));
}

#[test]
fn test_crash_between_chunk_write_and_sidecar_is_recoverable() {
    let dir = TempDir::new().unwrap();
    let manager = create_manager(dir.path());
    let session = manager.create("7", "a.bin", "public", 20, 10).unwrap();
    manager.save_chunk(&session.upload_id, 0, &chunk(0, 10)).unwrap();

    // A leftover temp sidecar from an interrupted write must not confuse recovery
    let paths = SessionPaths::for_session(dir.path(), &session);
    let mut stale = paths.meta.clone().into_os_string();
    stale.push(".tmp");
    fs::write(&stale, b"{half written").unwrap();

    let restarted = create_manager(dir.path());
    let status = restarted.status(&session.upload_id).unwrap();
    assert_eq!(status.uploaded_chunks, vec![0]);
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn test_sweep_reclaims_expired_and_orphaned_uploads() {
    let dir = TempDir::new().unwrap();
    {
        let previous = create_manager(dir.path());
        previous.create("9", "left.bin", "user/bob", 10, 10).unwrap();
    }

    let manager = create_manager(dir.path());
    let live = manager.create("7", "live.bin", "public", 10, 10).unwrap();

    // A sidecar rewrite that never got renamed into place
    let live_paths = SessionPaths::for_session(dir.path(), &live);
    let mut staged = live_paths.meta.clone().into_os_string();
    staged.push(".tmp");
    fs::write(&staged, b"{half written").unwrap();

    let report = manager.sweep(Utc::now());
    assert_eq!(report.expired_sessions, 0);
    assert_eq!(report.orphaned_files, 0);

    // Nothing unexpired is touched
    assert_eq!(artifacts(&dir.path().join("public")).len(), 2);
    assert_eq!(artifacts(&dir.path().join("user/bob")).len(), 2);
    assert!(Path::new(&staged).exists());
    assert!(manager.status(&live.upload_id).is_ok());

    let report = manager.sweep(Utc::now() + chrono::Duration::hours(2));
    assert_eq!(report.expired_sessions, 1);
    assert_eq!(report.orphaned_files, 1);
    assert_eq!(report.errors, 0);

    assert!(artifacts(&dir.path().join("public")).is_empty());
    assert!(artifacts(&dir.path().join("user/bob")).is_empty());
    assert!(!Path::new(&staged).exists());
    assert!(matches!(
        manager.status(&live.upload_id),
        Err(UploadError::NotFound(_))
    ));
    assert_eq!(manager.active_uploads("7"), 0);
}

#[test]
fn test_listing_hides_in_progress_uploads() {
    let dir = TempDir::new().unwrap();
    let storage = FileStorage::new(dir.path()).unwrap();
    let manager = create_manager(dir.path());

    let pending = manager.create("7", "pending.bin", "public", 20, 10).unwrap();
    manager.save_chunk(&pending.upload_id, 0, &chunk(0, 10)).unwrap();

    let done = manager.create("7", "done.bin", "public", 10, 10).unwrap();
    manager.save_chunk(&done.upload_id, 0, &chunk(0, 10)).unwrap();
    let saved = manager.complete(&done.upload_id).unwrap();

    let files = storage.list_files("public").unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, saved.filename);
    assert_eq!(files[0].original_name, "done.bin");
    assert_eq!(files[0].size, 10);
}
