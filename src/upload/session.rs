//! Upload session record and chunk bookkeeping.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::storage::sanitize_filename;

/// Largest number of chunks a single upload may be split into.
pub const MAX_CHUNKS: u64 = 1_000_000;

/// Set of received chunk indices, stored as a fixed-size bitmap.
///
/// Inserting an index twice is a no-op, so re-delivered chunks can never
/// inflate the count used by the completion check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSet {
    words: Vec<u64>,
    total: u32,
    count: u32,
}

impl ChunkSet {
    /// Create an empty set for indices `0..total`.
    pub fn new(total: u32) -> Self {
        Self {
            words: vec![0; (total as usize).div_ceil(64)],
            total,
            count: 0,
        }
    }

    /// Build a set from a list of indices.
    ///
    /// Duplicates and indices outside `0..total` are dropped.
    pub fn from_indices(total: u32, indices: impl IntoIterator<Item = u32>) -> Self {
        let mut set = Self::new(total);
        for index in indices {
            set.insert(index);
        }
        set
    }

    /// Insert an index. Returns `true` if it was not present before.
    pub fn insert(&mut self, index: u32) -> bool {
        if index >= self.total || self.contains(index) {
            return false;
        }
        self.words[(index / 64) as usize] |= 1 << (index % 64);
        self.count += 1;
        true
    }

    /// Remove an index. Returns `true` if it was present.
    pub fn remove(&mut self, index: u32) -> bool {
        if !self.contains(index) {
            return false;
        }
        self.words[(index / 64) as usize] &= !(1 << (index % 64));
        self.count -= 1;
        true
    }

    /// Whether the index has been received.
    pub fn contains(&self, index: u32) -> bool {
        index < self.total && self.words[(index / 64) as usize] & (1 << (index % 64)) != 0
    }

    /// Number of distinct indices received.
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Whether no index has been received.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Size of the index space.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Whether every index in `0..total` has been received.
    pub fn is_full(&self) -> bool {
        self.count == self.total
    }

    /// Received indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.total).filter(|i| self.contains(*i))
    }

    /// Indices still missing, in ascending order.
    pub fn missing(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.total).filter(|i| !self.contains(*i))
    }
}

/// Compute the number of chunks needed for `total_size` bytes.
pub fn total_chunks(total_size: u64, chunk_size: u64) -> u64 {
    total_size.div_ceil(chunk_size)
}

/// One in-progress resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Opaque unique identifier.
    pub upload_id: String,
    /// Uploading user.
    pub owner_id: String,
    /// Logical target filename as supplied by the client.
    pub filename: String,
    /// Normalized destination directory.
    pub directory: String,
    /// Declared file size in bytes.
    pub total_size: u64,
    /// Size of every chunk except possibly the last.
    pub chunk_size: u64,
    /// Received chunk indices.
    pub uploaded_chunks: ChunkSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fixed at creation; activity never extends it.
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    /// Create a new session with a fresh id.
    ///
    /// `total_size` and `chunk_size` must be non-zero and the chunk count
    /// must fit in `u32`; the lifecycle validates both before calling this.
    pub fn new(
        owner_id: impl Into<String>,
        filename: impl Into<String>,
        directory: impl Into<String>,
        total_size: u64,
        chunk_size: u64,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let total = total_chunks(total_size, chunk_size) as u32;
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            upload_id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            filename: filename.into(),
            directory: directory.into(),
            total_size,
            chunk_size,
            uploaded_chunks: ChunkSet::new(total),
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    /// Number of chunks the upload is split into.
    pub fn total_chunks(&self) -> u32 {
        self.uploaded_chunks.total()
    }

    /// Bytes accounted for by received chunks, capped at the declared size.
    pub fn uploaded_size(&self) -> u64 {
        (u64::from(self.uploaded_chunks.len()) * self.chunk_size).min(self.total_size)
    }

    /// Byte offset of a chunk within the file.
    pub fn chunk_offset(&self, index: u32) -> u64 {
        u64::from(index) * self.chunk_size
    }

    /// Expected length of a chunk; only the last one may be short.
    pub fn chunk_len(&self, index: u32) -> u64 {
        self.total_size
            .saturating_sub(self.chunk_offset(index))
            .min(self.chunk_size)
    }

    /// Whether every chunk has been received.
    pub fn is_complete(&self) -> bool {
        self.uploaded_chunks.is_full()
    }

    /// Whether the session's fixed lifetime has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Common file name stem of the temp file and sidecar.
    pub fn artifact_stem(&self) -> String {
        format!("{}_{}", self.upload_id, sanitize_filename(&self.filename))
    }

    /// Snapshot of the session's progress.
    pub fn status(&self) -> UploadStatus {
        UploadStatus {
            upload_id: self.upload_id.clone(),
            filename: self.filename.clone(),
            directory: self.directory.clone(),
            total_chunks: self.total_chunks(),
            uploaded_chunks: self.uploaded_chunks.iter().collect(),
            total_size: self.total_size,
            uploaded_size: self.uploaded_size(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        }
    }
}

/// Progress of an upload as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadStatus {
    pub upload_id: String,
    pub filename: String,
    pub directory: String,
    pub total_chunks: u32,
    pub uploaded_chunks: Vec<u32>,
    pub total_size: u64,
    pub uploaded_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A finished upload moved into its destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedFile {
    /// Stored name (`{uuid}_{sanitized original}`).
    pub filename: String,
    /// Path relative to the storage root.
    pub path: String,
    /// Size observed on disk after the rename.
    pub size: u64,
    /// Hex SHA-256 of the content, when hashing is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}
