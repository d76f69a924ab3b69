//! Checkpoint and restore of the working context.
//!
//! A snapshot is the serialized context plus the last ledger sequence folded
//! into it. Restore loads the snapshot and replays the ledger tail written
//! after it; without a usable snapshot it replays the whole ledger.

use std::sync::Arc;

use strata_state::{LedgerFilter, LedgerStore, SessionId, SnapshotRecord, SnapshotStore};
use tracing::{debug, instrument, warn};

use crate::error::{Result, StrataError};
use crate::retry::{retry_transient, RetryPolicy};
use crate::working_context::WorkingContext;

/// Result of [`SnapshotManager::restore`].
#[derive(Debug, Clone)]
pub struct Restored {
    pub context: WorkingContext,
    /// Sequence of the snapshot the replay started from (0 for a full replay).
    pub base_sequence: u64,
    /// Ledger entries applied on top of the base.
    pub replayed: usize,
}

pub struct SnapshotManager {
    snapshots: Arc<dyn SnapshotStore>,
    ledger: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
}

impl SnapshotManager {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        ledger: Arc<dyn LedgerStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            snapshots,
            ledger,
            retry,
        }
    }

    /// Persist `ctx`, replacing the previous snapshot of its session.
    #[instrument(skip(self, ctx), fields(session_id = %ctx.session_id, seq = ctx.last_applied_seq))]
    pub async fn save_snapshot(&self, ctx: &WorkingContext) -> Result<SnapshotRecord> {
        let state = serde_json::to_value(ctx)?;
        let record = SnapshotRecord::new(ctx.session_id.clone(), state, ctx.last_applied_seq)?;
        retry_transient(&self.retry, "save_snapshot", || {
            self.snapshots.save_snapshot(record.clone())
        })
        .await?;
        debug!(size_bytes = record.size_bytes, digest = record.digest.short(), "snapshot saved");
        Ok(record)
    }

    /// Load the last snapshot. A snapshot whose digest does not verify or
    /// whose state no longer decodes is treated as absent.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn load_snapshot(&self, session_id: &SessionId) -> Result<Option<WorkingContext>> {
        let record = retry_transient(&self.retry, "load_snapshot", || {
            self.snapshots.load_snapshot(session_id)
        })
        .await?;
        let Some(record) = record else {
            return Ok(None);
        };
        if !record.verify() {
            warn!(digest = %record.digest, "snapshot digest mismatch, ignoring snapshot");
            return Ok(None);
        }
        match serde_json::from_value::<WorkingContext>(record.state) {
            Ok(ctx) => Ok(Some(ctx)),
            Err(e) => {
                warn!(error = %e, "snapshot state does not decode, ignoring snapshot");
                Ok(None)
            }
        }
    }

    /// Snapshot plus ledger tail, or a full replay when no snapshot is usable.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn restore(&self, session_id: &SessionId) -> Result<Restored> {
        let base = match self.load_snapshot(session_id).await? {
            Some(ctx) => ctx,
            None => {
                let missing = StrataError::SnapshotMissing {
                    session_id: session_id.to_string(),
                };
                warn!(error = %missing, "replaying full ledger");
                WorkingContext::new(session_id.clone())
            }
        };

        let base_sequence = base.last_applied_seq;
        let filter = LedgerFilter::all().since(base_sequence);
        let tail = retry_transient(&self.retry, "query_ledger_tail", || {
            self.ledger.query(session_id, &filter, None)
        })
        .await?;

        let mut context = base;
        let replayed = context.apply_all(&tail);
        debug!(base_sequence, replayed, "working context restored");
        Ok(Restored {
            context,
            base_sequence,
            replayed,
        })
    }
}
