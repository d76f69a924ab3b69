//! SurrealDB-backed session, ledger and snapshot stores
//!
//! Uses `schema::SessionRow`, `schema::LedgerEntryRow` and
//! `schema::SnapshotRow` for persistence, converting to/from
//! `storage_traits` types at the boundary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::{LedgerEntryRow, SessionRow, SnapshotRow};
use crate::storage_traits::{
    AppendReceipt, LedgerEntry, LedgerFilter, LedgerStore, NewLedgerEntry, SessionId,
    SessionRecord, SessionStatus, SessionStore, SnapshotRecord, SnapshotStore, StorageResult,
};

/// Whether a SurrealDB error is a unique-index violation.
pub(crate) fn is_unique_violation(err: &surrealdb::Error) -> bool {
    err.to_string().contains("already contains")
}

#[derive(Debug, Deserialize)]
struct SeqRow {
    sequence_num: u64,
}

#[derive(Debug, Deserialize)]
struct ReceiptRow {
    entry_id: String,
    sequence_num: u64,
}

/// SurrealDB-backed implementation of [`SessionStore`], [`LedgerStore`]
/// and [`SnapshotStore`].
///
/// Appends within one process are serialized per session; the
/// `(session_id, sequence_num)` unique index rejects racing writers from
/// other processes with `SequenceConflict`.
pub struct SurrealLedgerStore {
    db: Surreal<Any>,
    allocators: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SurrealLedgerStore {
    pub fn new(handle: &SurrealHandle) -> Self {
        Self {
            db: handle.db().clone(),
            allocators: Mutex::new(HashMap::new()),
        }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(&SurrealHandle::in_memory().await?))
    }

    /// Create from environment variables (see [`SurrealHandle::from_env`]).
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(&SurrealHandle::from_env().await?))
    }

    // -- private helpers -----------------------------------------------------

    fn allocator(&self, session_id: &SessionId) -> StorageResult<Arc<tokio::sync::Mutex<()>>> {
        let mut map = self
            .allocators
            .lock()
            .map_err(|_| StorageError::Backend("sequence allocator lock poisoned".to_string()))?;
        Ok(map.entry(session_id.0.clone()).or_default().clone())
    }

    async fn fetch_session(&self, sid: &str) -> StorageResult<SessionRow> {
        let mut res = self
            .db
            .query("SELECT * FROM sessions WHERE session_id = $sid")
            .bind(("sid", sid.to_string()))
            .await?;
        let rows: Vec<SessionRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::SessionNotFound {
                session_id: sid.to_string(),
            })
    }

    async fn committed_receipt(
        &self,
        session_id: &SessionId,
        entry_id: &str,
    ) -> StorageResult<Option<AppendReceipt>> {
        let mut res = self
            .db
            .query(
                "SELECT entry_id, sequence_num FROM ledger_entries \
                 WHERE session_id = $sid AND entry_id = $eid LIMIT 1",
            )
            .bind(("sid", session_id.0.clone()))
            .bind(("eid", entry_id.to_string()))
            .await?;
        let rows: Vec<ReceiptRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(|r| AppendReceipt {
            entry_id: r.entry_id,
            sequence_num: r.sequence_num,
        }))
    }

    async fn fetch_entry_row(&self, sid: &str, seq: u64) -> StorageResult<LedgerEntryRow> {
        let mut res = self
            .db
            .query("SELECT * FROM ledger_entries WHERE session_id = $sid AND sequence_num = $seq")
            .bind(("sid", sid.to_string()))
            .bind(("seq", seq))
            .await?;
        let rows: Vec<LedgerEntryRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::EntryNotFound {
                session_id: sid.to_string(),
                sequence_num: seq,
            })
    }
}

#[async_trait]
impl SessionStore for SurrealLedgerStore {
    async fn create_session(&self, owner_id: &str) -> StorageResult<SessionRecord> {
        let row = SessionRow::new(owner_id);
        debug!(session_id = %row.session_id, owner_id, "creating session");

        let created: Option<SessionRow> = self.db.create("sessions").content(row).await?;
        created
            .ok_or_else(|| StorageError::Backend("session create returned no row".to_string()))?
            .into_record()
    }

    async fn get_session(&self, session_id: &SessionId) -> StorageResult<SessionRecord> {
        self.fetch_session(&session_id.0).await?.into_record()
    }

    async fn update_session_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> StorageResult<SessionRecord> {
        let mut res = self
            .db
            .query(
                "UPDATE sessions SET status = $status, updated_at = time::now() \
                 WHERE session_id = $sid RETURN AFTER",
            )
            .bind(("status", status.as_str().to_string()))
            .bind(("sid", session_id.0.clone()))
            .await?;
        let rows: Vec<SessionRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::SessionNotFound {
                session_id: session_id.0.clone(),
            })?
            .into_record()
    }

    async fn list_sessions(&self, owner_id: Option<&str>) -> StorageResult<Vec<SessionRecord>> {
        let rows: Vec<SessionRow> = if let Some(owner) = owner_id {
            let mut res = self
                .db
                .query("SELECT * FROM sessions WHERE owner_id = $owner ORDER BY created_at DESC")
                .bind(("owner", owner.to_string()))
                .await?;
            res.take(0)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM sessions ORDER BY created_at DESC")
                .await?;
            res.take(0)?
        };
        rows.into_iter().map(SessionRow::into_record).collect()
    }
}

#[async_trait]
impl LedgerStore for SurrealLedgerStore {
    async fn append(
        &self,
        session_id: &SessionId,
        entry: NewLedgerEntry,
    ) -> StorageResult<AppendReceipt> {
        entry.validate()?;

        let allocator = self.allocator(session_id)?;
        let _guard = allocator.lock().await;

        // A retry of an append whose response was lost finds its own row.
        if let Some(committed) = self.committed_receipt(session_id, &entry.entry_id).await? {
            debug!(session_id = %session_id, seq = committed.sequence_num, "append already committed");
            return Ok(committed);
        }

        let seq = self.last_sequence(session_id).await? + 1;
        let stored = entry.into_entry(session_id, seq);
        let receipt = AppendReceipt {
            entry_id: stored.entry_id.clone(),
            sequence_num: seq,
        };
        let row = LedgerEntryRow::from(&stored);

        let created: std::result::Result<Option<LedgerEntryRow>, surrealdb::Error> =
            self.db.create("ledger_entries").content(row).await;
        match created {
            Ok(_) => {
                debug!(session_id = %session_id, seq, entry_type = %stored.entry_type, "ledger entry appended");
                Ok(receipt)
            }
            Err(e) if is_unique_violation(&e) => {
                warn!(session_id = %session_id, seq, "sequence conflict on append");
                Err(StorageError::SequenceConflict {
                    session_id: session_id.0.clone(),
                    sequence_num: seq,
                })
            }
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }

    async fn query(
        &self,
        session_id: &SessionId,
        filter: &LedgerFilter,
        limit: Option<usize>,
    ) -> StorageResult<Vec<LedgerEntry>> {
        let mut sql = String::from("SELECT * FROM ledger_entries WHERE session_id = $sid");
        if filter.entry_types.is_some() {
            sql.push_str(" AND entry_type INSIDE $types");
        }
        if filter.scopes.is_some() {
            sql.push_str(" AND scope INSIDE $scopes");
        }
        if filter.since_sequence.is_some() {
            sql.push_str(" AND sequence_num > $since");
        }
        if filter.promoted.is_some() {
            sql.push_str(" AND promoted = $promoted");
        }
        sql.push_str(" ORDER BY sequence_num ASC");
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        let types: Vec<String> = filter
            .entry_types
            .iter()
            .flatten()
            .map(|t| t.as_str().to_string())
            .collect();
        let scopes: Vec<String> = filter.scopes.clone().unwrap_or_default();

        let mut res = self
            .db
            .query(sql)
            .bind(("sid", session_id.0.clone()))
            .bind(("types", types))
            .bind(("scopes", scopes))
            .bind(("since", filter.since_sequence.unwrap_or(0)))
            .bind(("promoted", filter.promoted.unwrap_or(false)))
            .await?;
        let rows: Vec<LedgerEntryRow> = res.take(0)?;
        rows.into_iter().map(LedgerEntryRow::into_entry).collect()
    }

    async fn get_entry(
        &self,
        session_id: &SessionId,
        sequence_num: u64,
    ) -> StorageResult<LedgerEntry> {
        self.fetch_entry_row(&session_id.0, sequence_num)
            .await?
            .into_entry()
    }

    async fn mark_promoted(
        &self,
        session_id: &SessionId,
        sequence_num: u64,
        external_id: &str,
    ) -> StorageResult<()> {
        let row = self.fetch_entry_row(&session_id.0, sequence_num).await?;
        if let (true, Some(existing)) = (row.promoted, &row.external_id) {
            if existing == external_id {
                return Ok(());
            }
            return Err(StorageError::AlreadyPromoted {
                session_id: session_id.0.clone(),
                sequence_num,
                existing: existing.clone(),
            });
        }

        self.db
            .query(
                "UPDATE ledger_entries SET promoted = true, external_id = $eid \
                 WHERE session_id = $sid AND sequence_num = $seq",
            )
            .bind(("eid", external_id.to_string()))
            .bind(("sid", session_id.0.clone()))
            .bind(("seq", sequence_num))
            .await?
            .check()?;
        Ok(())
    }

    async fn last_sequence(&self, session_id: &SessionId) -> StorageResult<u64> {
        let mut res = self
            .db
            .query(
                "SELECT sequence_num FROM ledger_entries WHERE session_id = $sid \
                 ORDER BY sequence_num DESC LIMIT 1",
            )
            .bind(("sid", session_id.0.clone()))
            .await?;
        let rows: Vec<SeqRow> = res.take(0)?;
        Ok(rows.first().map(|r| r.sequence_num).unwrap_or(0))
    }
}

#[async_trait]
impl SnapshotStore for SurrealLedgerStore {
    async fn save_snapshot(&self, record: SnapshotRecord) -> StorageResult<()> {
        let row = SnapshotRow::from(&record);
        debug!(
            session_id = %record.session_id,
            last_sequence = record.last_sequence,
            size_bytes = record.size_bytes,
            "saving snapshot"
        );
        let _saved: Option<SnapshotRow> = self
            .db
            .upsert(("snapshots", record.session_id.0.clone()))
            .content(row)
            .await?;
        Ok(())
    }

    async fn load_snapshot(&self, session_id: &SessionId) -> StorageResult<Option<SnapshotRecord>> {
        let row: Option<SnapshotRow> = self
            .db
            .select(("snapshots", session_id.0.clone()))
            .await?;
        row.map(SnapshotRow::into_record).transpose()
    }
}
