//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemorySessionStore`, `MemoryLedgerStore`, `MemorySnapshotStore`
//! and `MemoryArtifactStore` that satisfy the trait contracts without any
//! external dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(m: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| StorageError::Backend("in-memory store lock poisoned".to_string()))
}

// ---------------------------------------------------------------------------
// MemorySessionStore
// ---------------------------------------------------------------------------

/// In-memory session store backed by a `HashMap<session_id, SessionRecord>`.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, owner_id: &str) -> StorageResult<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            session_id: SessionId::new(),
            owner_id: owner_id.to_string(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        };
        lock(&self.sessions)?.insert(record.session_id.0.clone(), record.clone());
        Ok(record)
    }

    async fn get_session(&self, session_id: &SessionId) -> StorageResult<SessionRecord> {
        lock(&self.sessions)?
            .get(&session_id.0)
            .cloned()
            .ok_or_else(|| StorageError::SessionNotFound {
                session_id: session_id.0.clone(),
            })
    }

    async fn update_session_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> StorageResult<SessionRecord> {
        let mut sessions = lock(&self.sessions)?;
        let record = sessions
            .get_mut(&session_id.0)
            .ok_or_else(|| StorageError::SessionNotFound {
                session_id: session_id.0.clone(),
            })?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list_sessions(&self, owner_id: Option<&str>) -> StorageResult<Vec<SessionRecord>> {
        let sessions = lock(&self.sessions)?;
        let mut records: Vec<SessionRecord> = sessions
            .values()
            .filter(|s| owner_id.map(|o| s.owner_id == o).unwrap_or(true))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// MemoryLedgerStore
// ---------------------------------------------------------------------------

/// In-memory ledger backed by a `HashMap<session_id, Vec<LedgerEntry>>`.
///
/// Sequence numbers are assigned under the map lock, so concurrent appends
/// stay gap-free. `fail_next_appends` scripts transient outages for retry tests.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<HashMap<String, Vec<LedgerEntry>>>,
    pending_failures: AtomicU32,
    lost_receipts: AtomicU32,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` appends fail with `StorageError::Unavailable`.
    pub fn fail_next_appends(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Commit the next `n` appends but report them as `Unavailable`, as if
    /// the response was lost on the way back.
    pub fn lose_next_receipts(&self, n: u32) {
        self.lost_receipts.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        take_one(&self.pending_failures)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(
        &self,
        session_id: &SessionId,
        entry: NewLedgerEntry,
    ) -> StorageResult<AppendReceipt> {
        entry.validate()?;
        if self.take_failure() {
            return Err(StorageError::Unavailable("scripted ledger outage".to_string()));
        }
        let mut entries = lock(&self.entries)?;
        let log = entries.entry(session_id.0.clone()).or_default();
        if let Some(existing) = log.iter().find(|e| e.entry_id == entry.entry_id) {
            return Ok(AppendReceipt {
                entry_id: existing.entry_id.clone(),
                sequence_num: existing.sequence_num,
            });
        }
        let seq = log.last().map(|e| e.sequence_num).unwrap_or(0) + 1;
        let stored = entry.into_entry(session_id, seq);
        let receipt = AppendReceipt {
            entry_id: stored.entry_id.clone(),
            sequence_num: seq,
        };
        log.push(stored);
        if take_one(&self.lost_receipts) {
            return Err(StorageError::Unavailable("scripted lost receipt".to_string()));
        }
        Ok(receipt)
    }

    async fn query(
        &self,
        session_id: &SessionId,
        filter: &LedgerFilter,
        limit: Option<usize>,
    ) -> StorageResult<Vec<LedgerEntry>> {
        let entries = lock(&self.entries)?;
        let matched = entries
            .get(&session_id.0)
            .map(|log| {
                log.iter()
                    .filter(|e| filter.matches(e))
                    .take(limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(matched)
    }

    async fn get_entry(
        &self,
        session_id: &SessionId,
        sequence_num: u64,
    ) -> StorageResult<LedgerEntry> {
        let entries = lock(&self.entries)?;
        entries
            .get(&session_id.0)
            .and_then(|log| log.iter().find(|e| e.sequence_num == sequence_num))
            .cloned()
            .ok_or_else(|| StorageError::EntryNotFound {
                session_id: session_id.0.clone(),
                sequence_num,
            })
    }

    async fn mark_promoted(
        &self,
        session_id: &SessionId,
        sequence_num: u64,
        external_id: &str,
    ) -> StorageResult<()> {
        let mut entries = lock(&self.entries)?;
        let entry = entries
            .get_mut(&session_id.0)
            .and_then(|log| log.iter_mut().find(|e| e.sequence_num == sequence_num))
            .ok_or_else(|| StorageError::EntryNotFound {
                session_id: session_id.0.clone(),
                sequence_num,
            })?;
        match &entry.external_id {
            Some(existing) if entry.promoted && existing != external_id => {
                Err(StorageError::AlreadyPromoted {
                    session_id: session_id.0.clone(),
                    sequence_num,
                    existing: existing.clone(),
                })
            }
            _ => {
                entry.promoted = true;
                entry.external_id = Some(external_id.to_string());
                Ok(())
            }
        }
    }

    async fn last_sequence(&self, session_id: &SessionId) -> StorageResult<u64> {
        let entries = lock(&self.entries)?;
        Ok(entries
            .get(&session_id.0)
            .and_then(|log| log.last())
            .map(|e| e.sequence_num)
            .unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// MemorySnapshotStore
// ---------------------------------------------------------------------------

/// In-memory snapshot store keeping only the latest record per session.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, SnapshotRecord>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save_snapshot(&self, record: SnapshotRecord) -> StorageResult<()> {
        lock(&self.snapshots)?.insert(record.session_id.0.clone(), record);
        Ok(())
    }

    async fn load_snapshot(&self, session_id: &SessionId) -> StorageResult<Option<SnapshotRecord>> {
        Ok(lock(&self.snapshots)?.get(&session_id.0).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ArtifactTables {
    artifacts: HashMap<String, ArtifactRecord>,
    versions: HashMap<String, Vec<ArtifactVersionRecord>>,
    reviews: HashMap<String, Vec<ArtifactReviewRecord>>,
}

impl ArtifactTables {
    fn check_status(
        &self,
        artifact_id: &str,
        expected: ArtifactStatus,
    ) -> StorageResult<&ArtifactRecord> {
        let current =
            self.artifacts
                .get(artifact_id)
                .ok_or_else(|| StorageError::ArtifactNotFound {
                    artifact_id: artifact_id.to_string(),
                })?;
        if current.status != expected {
            return Err(StorageError::StaleWrite {
                artifact_id: artifact_id.to_string(),
                expected: expected.to_string(),
                actual: current.status.to_string(),
            });
        }
        Ok(current)
    }

    fn push_version(&mut self, version: ArtifactVersionRecord) -> StorageResult<()> {
        let history = self.versions.entry(version.artifact_id.clone()).or_default();
        if history.iter().any(|v| v.version == version.version) {
            return Err(StorageError::DuplicateVersion {
                artifact_id: version.artifact_id,
                version: version.version,
            });
        }
        history.push(version);
        history.sort_by_key(|v| v.version);
        Ok(())
    }
}

/// In-memory artifact store. All tables share one lock, which makes
/// `insert_artifact` and `commit_revision` atomic.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    tables: Mutex<ArtifactTables>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn insert_artifact(
        &self,
        artifact: ArtifactRecord,
        initial: ArtifactVersionRecord,
    ) -> StorageResult<ArtifactRecord> {
        let mut tables = lock(&self.tables)?;
        if tables.artifacts.contains_key(&artifact.artifact_id) {
            return Err(StorageError::Backend(format!(
                "artifact {} already exists",
                artifact.artifact_id
            )));
        }
        tables.push_version(initial)?;
        tables
            .artifacts
            .insert(artifact.artifact_id.clone(), artifact.clone());
        Ok(artifact)
    }

    async fn get_artifact(&self, artifact_id: &str) -> StorageResult<ArtifactRecord> {
        lock(&self.tables)?
            .artifacts
            .get(artifact_id)
            .cloned()
            .ok_or_else(|| StorageError::ArtifactNotFound {
                artifact_id: artifact_id.to_string(),
            })
    }

    async fn list_artifacts(&self, session_id: &SessionId) -> StorageResult<Vec<ArtifactRecord>> {
        let tables = lock(&self.tables)?;
        let mut records: Vec<ArtifactRecord> = tables
            .artifacts
            .values()
            .filter(|a| &a.session_id == session_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn update_artifact(
        &self,
        mut artifact: ArtifactRecord,
        expected_status: ArtifactStatus,
    ) -> StorageResult<ArtifactRecord> {
        let mut tables = lock(&self.tables)?;
        tables.check_status(&artifact.artifact_id, expected_status)?;
        artifact.updated_at = Utc::now();
        tables
            .artifacts
            .insert(artifact.artifact_id.clone(), artifact.clone());
        Ok(artifact)
    }

    async fn commit_revision(
        &self,
        mut artifact: ArtifactRecord,
        expected_status: ArtifactStatus,
        version: ArtifactVersionRecord,
    ) -> StorageResult<ArtifactRecord> {
        let mut tables = lock(&self.tables)?;
        tables.check_status(&artifact.artifact_id, expected_status)?;
        tables.push_version(version)?;
        artifact.updated_at = Utc::now();
        tables
            .artifacts
            .insert(artifact.artifact_id.clone(), artifact.clone());
        Ok(artifact)
    }

    async fn list_versions(&self, artifact_id: &str) -> StorageResult<Vec<ArtifactVersionRecord>> {
        let tables = lock(&self.tables)?;
        if !tables.artifacts.contains_key(artifact_id) {
            return Err(StorageError::ArtifactNotFound {
                artifact_id: artifact_id.to_string(),
            });
        }
        Ok(tables.versions.get(artifact_id).cloned().unwrap_or_default())
    }

    async fn append_review(&self, review: ArtifactReviewRecord) -> StorageResult<()> {
        let mut tables = lock(&self.tables)?;
        if !tables.artifacts.contains_key(&review.artifact_id) {
            return Err(StorageError::ArtifactNotFound {
                artifact_id: review.artifact_id,
            });
        }
        tables
            .reviews
            .entry(review.artifact_id.clone())
            .or_default()
            .push(review);
        Ok(())
    }

    async fn list_reviews(&self, artifact_id: &str) -> StorageResult<Vec<ArtifactReviewRecord>> {
        let tables = lock(&self.tables)?;
        Ok(tables.reviews.get(artifact_id).cloned().unwrap_or_default())
    }
}
