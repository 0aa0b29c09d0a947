//! In-memory session registry and per-owner concurrency quota.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::error::UploadError;
use super::session::UploadSession;

/// Storage for live upload sessions.
///
/// The upload manager serializes all access behind one lock, so
/// implementations do not need interior synchronization.
pub trait SessionRepository: Send {
    /// Insert or replace a session.
    fn insert(&mut self, session: UploadSession);

    /// Look up a session.
    fn get(&self, upload_id: &str) -> Option<&UploadSession>;

    /// Look up a session for modification.
    fn get_mut(&mut self, upload_id: &str) -> Option<&mut UploadSession>;

    /// Remove a session, returning it if it was present.
    fn remove(&mut self, upload_id: &str) -> Option<UploadSession>;

    /// All live sessions.
    fn list(&self) -> Vec<UploadSession>;

    /// Ids of the sessions expired at `now`.
    fn expired_ids(&self, now: DateTime<Utc>) -> Vec<String> {
        self.list()
            .into_iter()
            .filter(|s| s.is_expired(now))
            .map(|s| s.upload_id)
            .collect()
    }
}

/// Session repository backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: HashMap<String, UploadSession>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn insert(&mut self, session: UploadSession) {
        self.sessions.insert(session.upload_id.clone(), session);
    }

    fn get(&self, upload_id: &str) -> Option<&UploadSession> {
        self.sessions.get(upload_id)
    }

    fn get_mut(&mut self, upload_id: &str) -> Option<&mut UploadSession> {
        self.sessions.get_mut(upload_id)
    }

    fn remove(&mut self, upload_id: &str) -> Option<UploadSession> {
        self.sessions.remove(upload_id)
    }

    fn list(&self) -> Vec<UploadSession> {
        let mut sessions: Vec<UploadSession> = self.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    fn expired_ids(&self, now: DateTime<Utc>) -> Vec<String> {
        self.sessions
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.upload_id.clone())
            .collect()
    }
}

/// Counts active uploads per owner.
#[derive(Debug)]
pub struct QuotaGuard {
    limit: usize,
    active: HashMap<String, usize>,
}

impl QuotaGuard {
    /// Create a guard allowing `limit` concurrent uploads per owner.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            active: HashMap::new(),
        }
    }

    /// Reserve a slot for the owner.
    pub fn try_acquire(&mut self, owner: &str) -> Result<(), UploadError> {
        let count = self.active.entry(owner.to_string()).or_insert(0);
        if *count >= self.limit {
            return Err(UploadError::QuotaExceeded {
                owner: owner.to_string(),
                limit: self.limit,
            });
        }
        *count += 1;
        Ok(())
    }

    /// Count a session that became live without going through creation.
    ///
    /// Never fails; the owner may end up above the limit until some of
    /// their uploads finish.
    pub fn adopt(&mut self, owner: &str) {
        *self.active.entry(owner.to_string()).or_insert(0) += 1;
    }

    /// Release a slot. Never drops below zero.
    pub fn release(&mut self, owner: &str) {
        if let Some(count) = self.active.get_mut(owner) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.active.remove(owner);
            }
        }
    }

    /// Active uploads for the owner.
    pub fn active(&self, owner: &str) -> usize {
        self.active.get(owner).copied().unwrap_or(0)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Live sessions plus the quota counts derived from them.
#[derive(Debug)]
pub struct SessionStore<R> {
    pub sessions: R,
    pub quota: QuotaGuard,
}

impl<R: SessionRepository> SessionStore<R> {
    pub fn new(sessions: R, limit: usize) -> Self {
        Self {
            sessions,
            quota: QuotaGuard::new(limit),
        }
    }

    /// Make a session live and count it against its owner.
    pub fn adopt(&mut self, session: UploadSession) {
        self.quota.adopt(&session.owner_id);
        self.sessions.insert(session);
    }

    /// Remove a live session and release its owner's slot.
    pub fn evict(&mut self, upload_id: &str) -> Option<UploadSession> {
        let session = self.sessions.remove(upload_id)?;
        self.quota.release(&session.owner_id);
        Some(session)
    }
}
