//! Promotion of durable ledger facts to long-term memory.
//!
//! A run selects unpromoted entries of promotable types, submits them to the
//! gateway in bounded batches, and marks only the records the gateway
//! accepted. Failed entries stay unpromoted and are retried by the next run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use strata_state::{EntryType, LedgerEntry, LedgerFilter, LedgerStore, SessionId, SessionStore};
use tracing::{debug, instrument, warn};

use crate::config::PromotionPolicy;
use crate::error::{Result, StrataError};
use crate::gateway::{MemoryGateway, MemoryRecord, Namespace, StoreOutcome};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::{retry_transient, RetryPolicy};

/// One entry that could not be promoted in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionFailure {
    pub entry_id: String,
    pub sequence_num: u64,
    pub code: String,
    pub message: String,
}

/// Outcome of a promotion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionReport {
    pub session_id: String,
    pub promoted_count: usize,
    pub failed_count: usize,
    pub external_ids: Vec<String>,
    pub failures: Vec<PromotionFailure>,
}

impl PromotionReport {
    pub fn is_complete(&self) -> bool {
        self.failed_count == 0
    }

    /// Turn a report with failures into `PromotionPartialFailure`.
    pub fn ensure_complete(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(StrataError::PromotionPartialFailure {
                session_id: self.session_id,
                promoted: self.promoted_count,
                failed: self.failed_count,
            })
        }
    }

    fn fail(&mut self, entry: &LedgerEntry, code: &str, message: impl Into<String>) {
        self.failed_count += 1;
        self.failures.push(PromotionFailure {
            entry_id: entry.entry_id.clone(),
            sequence_num: entry.sequence_num,
            code: code.to_string(),
            message: message.into(),
        });
    }
}

/// Entry types that may ever be promoted under `policy`.
pub fn promotable_types(policy: &PromotionPolicy) -> Vec<EntryType> {
    let mut types = vec![EntryType::Decision, EntryType::Constraint];
    if policy.include_research_findings {
        types.push(EntryType::ResearchFinding);
    }
    types
}

/// Whether `entry` qualifies for promotion under `policy`.
pub fn is_promotable(entry: &LedgerEntry, policy: &PromotionPolicy) -> bool {
    match entry.entry_type {
        EntryType::Decision | EntryType::Constraint => true,
        EntryType::ResearchFinding if policy.include_research_findings => {
            match &policy.research_scopes {
                Some(scopes) => scopes.iter().any(|s| s == &entry.scope),
                None => true,
            }
        }
        _ => false,
    }
}

/// Long-term memory record for a ledger entry. The entry id is the
/// idempotency key.
pub fn format_record(entry: &LedgerEntry) -> MemoryRecord {
    let content = match &entry.reasoning {
        Some(reasoning) => format!("{}\nWhy: {}", entry.summary, reasoning),
        None => entry.summary.clone(),
    };
    MemoryRecord::new(entry.entry_id.clone(), content).with_metadata(serde_json::json!({
        "session_id": entry.session_id.as_str(),
        "entry_id": entry.entry_id,
        "sequence_num": entry.sequence_num,
        "entry_type": entry.entry_type.as_str(),
        "scope": entry.scope,
    }))
}

pub struct PromotionEngine {
    sessions: Arc<dyn SessionStore>,
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn MemoryGateway>,
    policy: PromotionPolicy,
    retry: RetryPolicy,
    runs: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PromotionEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn MemoryGateway>,
        policy: PromotionPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            sessions,
            ledger,
            gateway,
            policy,
            retry,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &PromotionPolicy {
        &self.policy
    }

    fn run_lock(&self, session_id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        runs.entry(session_id.0.clone()).or_default().clone()
    }

    /// Promote every eligible unpromoted entry of the session.
    ///
    /// Runs for the same session are serialized. The report is returned even
    /// when some entries failed; see [`PromotionReport::ensure_complete`].
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn promote(&self, session_id: &SessionId) -> Result<PromotionReport> {
        let lock = self.run_lock(session_id);
        let _run = lock.lock().await;

        let session = retry_transient(&self.retry, "get_session", || {
            self.sessions.get_session(session_id)
        })
        .await?;
        let namespace = Namespace::project_facts(&session.owner_id);

        let filter = LedgerFilter::all()
            .with_types(promotable_types(&self.policy))
            .unpromoted();
        let candidates = retry_transient(&self.retry, "query_unpromoted", || {
            self.ledger.query(session_id, &filter, None)
        })
        .await?;
        let eligible: Vec<LedgerEntry> = candidates
            .into_iter()
            .filter(|e| is_promotable(e, &self.policy))
            .collect();

        let mut report = PromotionReport {
            session_id: session_id.to_string(),
            ..Default::default()
        };
        let batch_size = self.policy.batch_size.max(1);
        for batch in eligible.chunks(batch_size) {
            self.promote_batch(session_id, &namespace, batch, &mut report)
                .await;
        }

        METRICS.add_entries_promoted(report.promoted_count as u64);
        METRICS.add_promotion_failures(report.failed_count as u64);
        obs::emit_promotion_finished(
            session_id.as_str(),
            report.promoted_count,
            report.failed_count,
        );
        Ok(report)
    }

    async fn promote_batch(
        &self,
        session_id: &SessionId,
        namespace: &Namespace,
        batch: &[LedgerEntry],
        report: &mut PromotionReport,
    ) {
        let records: Vec<MemoryRecord> = batch.iter().map(format_record).collect();
        let outcomes = match self.gateway.store(namespace, &records).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                warn!(error = %err, batch = batch.len(), "promotion batch failed");
                for entry in batch {
                    report.fail(entry, err.code(), err.to_string());
                }
                return;
            }
        };

        let mut by_key: HashMap<&str, &StoreOutcome> =
            outcomes.iter().map(|o| (o.key(), o)).collect();
        for entry in batch {
            match by_key.remove(entry.entry_id.as_str()) {
                Some(StoreOutcome::Stored { external_id, .. }) => {
                    let marked = retry_transient(&self.retry, "mark_promoted", || {
                        self.ledger
                            .mark_promoted(session_id, entry.sequence_num, external_id)
                    })
                    .await;
                    match marked {
                        Ok(()) => {
                            report.promoted_count += 1;
                            report.external_ids.push(external_id.clone());
                        }
                        Err(e) => report.fail(entry, "mark_failed", e.to_string()),
                    }
                }
                Some(StoreOutcome::Failed { code, message, .. }) => {
                    debug!(seq = entry.sequence_num, code = %code, "record rejected");
                    report.fail(entry, code, message.clone());
                }
                None => report.fail(entry, "missing_outcome", "gateway returned no outcome"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_state::NewLedgerEntry;

    fn entry(ty: EntryType, scope: &str) -> LedgerEntry {
        NewLedgerEntry::new(ty, scope, "summary", "orchestrator").into_entry(&SessionId::from("s"), 1)
    }

    #[test]
    fn only_decisions_constraints_and_research_are_promotable() {
        let policy = PromotionPolicy::default();
        for ty in EntryType::ALL {
            let expected = matches!(
                ty,
                EntryType::Decision | EntryType::Constraint | EntryType::ResearchFinding
            );
            assert_eq!(is_promotable(&entry(ty, "x"), &policy), expected, "{ty}");
        }
    }

    #[test]
    fn research_scope_allow_list() {
        let policy = PromotionPolicy {
            research_scopes: Some(vec!["market".into()]),
            ..Default::default()
        };
        assert!(is_promotable(&entry(EntryType::ResearchFinding, "market"), &policy));
        assert!(!is_promotable(&entry(EntryType::ResearchFinding, "ux"), &policy));

        let off = PromotionPolicy {
            include_research_findings: false,
            ..Default::default()
        };
        assert!(!is_promotable(&entry(EntryType::ResearchFinding, "market"), &off));
        assert!(!promotable_types(&off).contains(&EntryType::ResearchFinding));
    }

    #[test]
    fn record_carries_reasoning_and_metadata() {
        let e = NewLedgerEntry::new(EntryType::Decision, "product", "Mobile-first", "orchestrator")
            .with_reasoning("70% of traffic is mobile")
            .into_entry(&SessionId::from("s-9"), 4);
        let record = format_record(&e);
        assert_eq!(record.key, e.entry_id);
        assert_eq!(record.content, "Mobile-first\nWhy: 70% of traffic is mobile");
        assert_eq!(record.metadata["sequence_num"], 4);
        assert_eq!(record.metadata["entry_type"], "decision");
        assert_eq!(record.metadata["session_id"], "s-9");
    }

    #[test]
    fn partial_report_fails_ensure_complete() {
        let report = PromotionReport {
            session_id: "s".into(),
            promoted_count: 2,
            failed_count: 1,
            ..Default::default()
        };
        let err = report.ensure_complete().unwrap_err();
        assert!(matches!(
            err,
            StrataError::PromotionPartialFailure { promoted: 2, failed: 1, .. }
        ));
    }
}
