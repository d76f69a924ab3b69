//! Session coordinator.
//!
//! Top-level entry point for an orchestrator. Per turn it writes one ledger
//! entry per structural event, folds each entry into the working context,
//! and checkpoints every `checkpoint_interval` turns. Turns of one session
//! are serialized; different sessions never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use strata_state::fakes::{
    MemoryArtifactStore, MemoryLedgerStore, MemorySessionStore, MemorySnapshotStore,
};
use strata_state::{
    AppendReceipt, ArtifactRecord, ArtifactStore, DecisionOptions, EntryRefs, EntryType,
    LedgerEntry, LedgerFilter, LedgerStore, NewLedgerEntry, PublishTarget, SessionId,
    SessionRecord, SessionStatus, SessionStore, SnapshotRecord, SnapshotStore,
    SurrealArtifactStore, SurrealHandle, SurrealLedgerStore,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

use crate::artifact::{ArtifactManager, ContentReviser, Publisher};
use crate::config::StrataConfig;
use crate::error::{Result, StrataError};
use crate::gateway::{MemoryGateway, Namespace, ScoredRecord};
use crate::metrics::METRICS;
use crate::obs;
use crate::promotion::{PromotionEngine, PromotionReport};
use crate::retry::retry_transient;
use crate::snapshot::SnapshotManager;
use crate::working_context::{
    ArtifactRef, ChildResultDetail, ClarificationDetail, InjectionDetail, PlanDetail, PlanStep,
    PlanUpdateDetail, StepStatus, WorkingContext,
};

/// Source recorded on entries the orchestrator writes.
pub const ORCHESTRATOR: &str = "orchestrator";
/// Source recorded on entries Strata writes itself (checkpoints).
pub const SYSTEM: &str = "strata";

/// Storage backends used by the coordinator.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

impl Stores {
    /// Process-local fakes.
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(MemorySessionStore::new()),
            ledger: Arc::new(MemoryLedgerStore::new()),
            snapshots: Arc::new(MemorySnapshotStore::new()),
            artifacts: Arc::new(MemoryArtifactStore::new()),
        }
    }

    /// SurrealDB-backed stores sharing one connection.
    pub fn surreal(handle: &SurrealHandle) -> Self {
        let ledger = Arc::new(SurrealLedgerStore::new(handle));
        Self {
            sessions: ledger.clone(),
            ledger: ledger.clone(),
            snapshots: ledger,
            artifacts: Arc::new(SurrealArtifactStore::new(handle)),
        }
    }
}

/// Something that happened during a turn and must be remembered.
///
/// Each variant is written as exactly one ledger entry of the matching type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StructuralEvent {
    Decision {
        scope: String,
        summary: String,
        reasoning: Option<String>,
        options: Option<DecisionOptions>,
        #[serde(default)]
        refs: EntryRefs,
    },
    Constraint {
        scope: String,
        summary: String,
        reasoning: Option<String>,
    },
    ResearchFinding {
        scope: String,
        summary: String,
        #[serde(default)]
        refs: EntryRefs,
    },
    ChildAgentResult {
        scope: String,
        agent: String,
        summary: String,
        step_id: Option<String>,
        status: Option<StepStatus>,
    },
    PlanCreated {
        scope: String,
        summary: String,
        steps: Vec<PlanStep>,
    },
    PlanUpdated {
        scope: String,
        summary: String,
        update: PlanUpdateDetail,
    },
    ArtifactCreated {
        scope: String,
        summary: String,
        artifact: ArtifactRef,
    },
    ArtifactUpdated {
        scope: String,
        summary: String,
        artifact: ArtifactRef,
    },
    UserClarification {
        scope: String,
        question_id: String,
        answer: String,
    },
    ContextInjection {
        scope: String,
        summary: String,
        detail: InjectionDetail,
    },
}

impl StructuralEvent {
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::Decision { .. } => EntryType::Decision,
            Self::Constraint { .. } => EntryType::Constraint,
            Self::ResearchFinding { .. } => EntryType::ResearchFinding,
            Self::ChildAgentResult { .. } => EntryType::ChildAgentResult,
            Self::PlanCreated { .. } => EntryType::PlanCreated,
            Self::PlanUpdated { .. } => EntryType::PlanUpdated,
            Self::ArtifactCreated { .. } => EntryType::ArtifactCreated,
            Self::ArtifactUpdated { .. } => EntryType::ArtifactUpdated,
            Self::UserClarification { .. } => EntryType::UserClarification,
            Self::ContextInjection { .. } => EntryType::ContextInjection,
        }
    }

    /// The ledger entry this event is recorded as.
    pub fn into_entry(self, turn: u64) -> Result<NewLedgerEntry> {
        let ty = self.entry_type();
        let entry = match self {
            Self::Decision {
                scope,
                summary,
                reasoning,
                options,
                refs,
            } => {
                let mut e = NewLedgerEntry::new(ty, scope, summary, ORCHESTRATOR).with_refs(refs);
                e.reasoning = reasoning;
                e.options = options;
                e
            }
            Self::Constraint {
                scope,
                summary,
                reasoning,
            } => {
                let mut e = NewLedgerEntry::new(ty, scope, summary, ORCHESTRATOR);
                e.reasoning = reasoning;
                e
            }
            Self::ResearchFinding {
                scope,
                summary,
                refs,
            } => NewLedgerEntry::new(ty, scope, summary, ORCHESTRATOR).with_refs(refs),
            Self::ChildAgentResult {
                scope,
                agent,
                summary,
                step_id,
                status,
            } => NewLedgerEntry::new(ty, scope, summary, agent).with_detail(serde_json::to_value(
                ChildResultDetail { step_id, status },
            )?),
            Self::PlanCreated {
                scope,
                summary,
                steps,
            } => NewLedgerEntry::new(ty, scope, summary, ORCHESTRATOR)
                .with_detail(serde_json::to_value(PlanDetail { steps })?),
            Self::PlanUpdated {
                scope,
                summary,
                update,
            } => NewLedgerEntry::new(ty, scope, summary, ORCHESTRATOR)
                .with_detail(serde_json::to_value(update)?),
            Self::ArtifactCreated {
                scope,
                summary,
                artifact,
            }
            | Self::ArtifactUpdated {
                scope,
                summary,
                artifact,
            } => NewLedgerEntry::new(ty, scope, summary, ORCHESTRATOR)
                .with_refs(EntryRefs::artifact(artifact.artifact_id.clone()))
                .with_detail(serde_json::to_value(artifact)?),
            Self::UserClarification {
                scope,
                question_id,
                answer,
            } => NewLedgerEntry::new(ty, scope, answer, "user")
                .with_detail(serde_json::to_value(ClarificationDetail { question_id })?),
            Self::ContextInjection {
                scope,
                summary,
                detail,
            } => NewLedgerEntry::new(ty, scope, summary, ORCHESTRATOR)
                .with_detail(serde_json::to_value(detail)?),
        };
        Ok(entry.at_turn(turn))
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Abandoned,
}

impl From<SessionOutcome> for SessionStatus {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Completed => SessionStatus::Completed,
            SessionOutcome::Abandoned => SessionStatus::Abandoned,
        }
    }
}

/// Result of [`SessionCoordinator::process_turn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn: u64,
    pub receipts: Vec<AppendReceipt>,
    pub checkpoint: Option<u64>,
}

/// Result of [`SessionCoordinator::end_session`].
#[derive(Debug, Clone)]
pub struct SessionEnded {
    pub session: SessionRecord,
    /// `None` when promotion could not run; the entries stay eligible.
    pub promotion: Option<PromotionReport>,
}

struct LiveSession {
    owner_id: String,
    context: AsyncMutex<WorkingContext>,
    /// Set under the context lock by pause/end. Callers still queued on the
    /// lock see it once they get in.
    closed: OnceLock<SessionStatus>,
}

pub struct SessionCoordinator {
    config: StrataConfig,
    sessions: Arc<dyn SessionStore>,
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn MemoryGateway>,
    snapshots: SnapshotManager,
    promotion: PromotionEngine,
    artifacts: ArtifactManager,
    live: Mutex<HashMap<String, Arc<LiveSession>>>,
}

impl SessionCoordinator {
    /// Fails with `StrataError::Config` when `config` does not validate.
    pub fn new(
        config: StrataConfig,
        stores: Stores,
        gateway: Arc<dyn MemoryGateway>,
        publisher: Arc<dyn Publisher>,
        reviser: Arc<dyn ContentReviser>,
    ) -> Result<Self> {
        config.validate()?;
        let snapshots = SnapshotManager::new(
            stores.snapshots.clone(),
            stores.ledger.clone(),
            config.retry.clone(),
        );
        let promotion = PromotionEngine::new(
            stores.sessions.clone(),
            stores.ledger.clone(),
            gateway.clone(),
            config.promotion.clone(),
            config.retry.clone(),
        );
        let artifacts = ArtifactManager::new(
            stores.artifacts.clone(),
            publisher,
            reviser,
            config.dispatch_timeout(),
            config.retry.clone(),
        );
        Ok(Self {
            sessions: stores.sessions,
            ledger: stores.ledger,
            gateway,
            snapshots,
            promotion,
            artifacts,
            config,
            live: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    /// Human-facing artifact operations (reviews, publish, history).
    pub fn artifacts(&self) -> &ArtifactManager {
        &self.artifacts
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    // -- session lifecycle -----------------------------------------------

    /// Open a session and seed its working context with the intent and any
    /// prior knowledge long-term memory holds for the owner.
    #[instrument(skip(self, intent))]
    pub async fn start_session(&self, owner_id: &str, intent: &str) -> Result<WorkingContext> {
        let seed = NewLedgerEntry::new(
            EntryType::ContextInjection,
            "session",
            intent,
            ORCHESTRATOR,
        );
        seed.validate()?;

        let session = retry_transient(&self.config.retry, "create_session", || {
            self.sessions.create_session(owner_id)
        })
        .await?;
        let session_id = session.session_id.clone();

        let prior_knowledge = self.prior_knowledge(owner_id, intent).await;
        let detail = InjectionDetail {
            intent: Some(intent.to_string()),
            question: None,
            prior_knowledge: Some(prior_knowledge),
        };

        let mut context = WorkingContext::new(session_id.clone());
        self.append_and_apply(&mut context, seed.with_detail(serde_json::to_value(detail)?))
            .await?;

        self.insert_live(owner_id, context.clone());
        obs::emit_session_started(session_id.as_str(), owner_id, false);
        Ok(context)
    }

    /// Reload a paused (or crashed) session from its snapshot and ledger tail.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn resume_session(&self, session_id: &SessionId) -> Result<WorkingContext> {
        let session = self.open_session(session_id).await?;
        if session.status == SessionStatus::Paused {
            retry_transient(&self.config.retry, "update_session_status", || {
                self.sessions
                    .update_session_status(session_id, SessionStatus::Active)
            })
            .await?;
        }
        let restored = self.snapshots.restore(session_id).await?;
        let live = self.insert_live(&session.owner_id, restored.context);
        let context = live.context.lock().await.clone();
        obs::emit_session_started(session_id.as_str(), &session.owner_id, true);
        Ok(context)
    }

    /// Checkpoint and mark the session paused.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn pause_session(&self, session_id: &SessionId) -> Result<SessionRecord> {
        let live = self.live_session(session_id).await?;
        let mut context = self.lock_open(session_id, &live).await?;
        self.checkpoint_locked(&mut context).await?;
        let session = retry_transient(&self.config.retry, "update_session_status", || {
            self.sessions
                .update_session_status(session_id, SessionStatus::Paused)
        })
        .await?;
        self.close_live(session_id, &live, SessionStatus::Paused);
        obs::emit_session_closed(session_id.as_str(), "paused", context.turn_count);
        Ok(session)
    }

    /// Checkpoint, close the session and promote its durable facts.
    /// A failed promotion is logged; the entries stay eligible for later.
    /// Paused sessions can be ended without resuming them first.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn end_session(
        &self,
        session_id: &SessionId,
        outcome: SessionOutcome,
    ) -> Result<SessionEnded> {
        let live = self.load_session(session_id, true).await?;
        let status = SessionStatus::from(outcome);
        let (session, turns) = {
            let mut context = self.lock_open(session_id, &live).await?;
            self.checkpoint_locked(&mut context).await?;
            let session = retry_transient(&self.config.retry, "update_session_status", || {
                self.sessions.update_session_status(session_id, status)
            })
            .await?;
            self.close_live(session_id, &live, status);
            (session, context.turn_count)
        };

        let promotion = match self.promotion.promote(session_id).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "promotion at session end failed");
                None
            }
        };
        obs::emit_session_closed(session_id.as_str(), status.as_str(), turns);
        METRICS.flush();
        Ok(SessionEnded { session, promotion })
    }

    /// Sessions, optionally only those of one owner.
    pub async fn list_sessions(&self, owner_id: Option<&str>) -> Result<Vec<SessionRecord>> {
        Ok(retry_transient(&self.config.retry, "list_sessions", || {
            self.sessions.list_sessions(owner_id)
        })
        .await?)
    }

    // -- turns -----------------------------------------------------------

    /// Record a turn's structural events and fold them into the context.
    ///
    /// Waits behind an in-flight turn of the same session for at most
    /// `turn_queue_timeout`, then fails with `SessionBusy`. Every event is
    /// validated before anything is written.
    #[instrument(skip(self, events), fields(session_id = %session_id, events = events.len()))]
    pub async fn process_turn(
        &self,
        session_id: &SessionId,
        events: Vec<StructuralEvent>,
    ) -> Result<TurnOutcome> {
        let live = self.live_session(session_id).await?;
        let mut context = self.lock_open(session_id, &live).await?;

        let turn = context.turn_count + 1;
        let entries = events
            .into_iter()
            .map(|event| event.into_entry(turn))
            .collect::<Result<Vec<_>>>()?;
        for entry in &entries {
            entry.validate()?;
        }

        let mut receipts = Vec::with_capacity(entries.len());
        for entry in entries {
            receipts.push(self.append_and_apply(&mut context, entry).await?);
        }
        context.turn_count = turn;
        METRICS.inc_turns();

        let checkpoint = if turn % self.config.checkpoint_interval == 0 {
            Some(self.checkpoint_locked(&mut context).await?.last_sequence)
        } else {
            None
        };
        debug!(turn, appended = receipts.len(), "turn processed");
        Ok(TurnOutcome {
            turn,
            receipts,
            checkpoint,
        })
    }

    /// Checkpoint now (milestones).
    pub async fn checkpoint(&self, session_id: &SessionId) -> Result<SnapshotRecord> {
        let live = self.live_session(session_id).await?;
        let mut context = self.lock_open(session_id, &live).await?;
        self.checkpoint_locked(&mut context).await
    }

    /// Current working context.
    pub async fn working_context(&self, session_id: &SessionId) -> Result<WorkingContext> {
        let live = self.live_session(session_id).await?;
        let context = self.lock_turn(session_id, &live).await?;
        Ok(context.clone())
    }

    // -- ledger access ---------------------------------------------------

    /// Write an entry outside of a turn. Applied to the live context when
    /// the session is loaded; otherwise it is picked up on restore. The
    /// session must exist and be active or paused.
    pub async fn write_ledger(
        &self,
        session_id: &SessionId,
        entry: NewLedgerEntry,
    ) -> Result<AppendReceipt> {
        entry.validate()?;
        let live = self.live.lock().unwrap_or_else(|p| p.into_inner()).get(&session_id.0).cloned();
        match live {
            Some(live) => {
                let mut context = self.lock_open(session_id, &live).await?;
                self.append_and_apply(&mut context, entry).await
            }
            None => {
                self.open_session(session_id).await?;
                self.append(session_id, entry).await
            }
        }
    }

    /// Explicit recall of full ledger entries, reasoning included.
    pub async fn recall(
        &self,
        session_id: &SessionId,
        filter: &LedgerFilter,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(retry_transient(&self.config.retry, "query_ledger", || {
            self.ledger.query(session_id, filter, limit)
        })
        .await?)
    }

    /// Query long-term memory directly.
    pub async fn retrieve_memory(
        &self,
        namespace: &Namespace,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        Ok(self.gateway.retrieve(namespace, query, top_k).await?)
    }

    /// Promote the session's durable facts now.
    pub async fn promote(&self, session_id: &SessionId) -> Result<PromotionReport> {
        self.promotion.promote(session_id).await
    }

    // -- artifacts -------------------------------------------------------

    /// Create a draft artifact and record it in the ledger.
    pub async fn create_artifact(
        &self,
        session_id: &SessionId,
        artifact_type: &str,
        publish_target: PublishTarget,
        title: &str,
        content: &str,
        author: &str,
    ) -> Result<ArtifactRecord> {
        let live = self.live_session(session_id).await?;
        let mut context = self.lock_open(session_id, &live).await?;
        let artifact = self
            .artifacts
            .create_artifact(session_id, artifact_type, publish_target, title, content, author)
            .await?;
        let summary = format!("created {} \"{}\"", artifact.artifact_type, artifact.title);
        self.record_artifact(&mut context, EntryType::ArtifactCreated, &artifact, summary)
            .await?;
        Ok(artifact)
    }

    /// Generation finished: move the artifact to `review` and record it.
    pub async fn submit_artifact_for_review(
        &self,
        session_id: &SessionId,
        artifact_id: &str,
    ) -> Result<ArtifactRecord> {
        let live = self.live_session(session_id).await?;
        let mut context = self.lock_open(session_id, &live).await?;
        let artifact = self.artifacts.submit_for_review(artifact_id).await?;
        let summary = format!("\"{}\" v{} ready for review", artifact.title, artifact.version);
        self.record_artifact(&mut context, EntryType::ArtifactUpdated, &artifact, summary)
            .await?;
        Ok(artifact)
    }

    /// Record the artifact's current status (after human reviews or
    /// dispatches) so the working context reflects it.
    pub async fn sync_artifact(
        &self,
        session_id: &SessionId,
        artifact_id: &str,
    ) -> Result<ArtifactRecord> {
        let live = self.live_session(session_id).await?;
        let mut context = self.lock_open(session_id, &live).await?;
        let artifact = self.artifacts.get_artifact(artifact_id).await?;
        let unchanged = context
            .artifact_refs
            .iter()
            .any(|a| a.artifact_id == artifact.artifact_id && a.status == artifact.status);
        if !unchanged {
            let summary = format!("\"{}\" is {}", artifact.title, artifact.status);
            self.record_artifact(&mut context, EntryType::ArtifactUpdated, &artifact, summary)
                .await?;
        }
        Ok(artifact)
    }

    // -- internals -------------------------------------------------------

    async fn prior_knowledge(&self, owner_id: &str, intent: &str) -> Vec<String> {
        let top_k = self.config.prior_knowledge_top_k;
        let mut knowledge: Vec<String> = Vec::new();
        for namespace in [Namespace::project_facts(owner_id), Namespace::preferences(owner_id)] {
            match self.gateway.retrieve(&namespace, intent, top_k).await {
                Ok(hits) => {
                    for hit in hits {
                        if !knowledge.contains(&hit.record.content) {
                            knowledge.push(hit.record.content);
                        }
                    }
                }
                Err(e) => obs::emit_gateway_degraded("retrieve_prior_knowledge", &e),
            }
        }
        knowledge
    }

    async fn record_artifact(
        &self,
        context: &mut WorkingContext,
        entry_type: EntryType,
        artifact: &ArtifactRecord,
        summary: String,
    ) -> Result<AppendReceipt> {
        let artifact_ref = ArtifactRef {
            artifact_id: artifact.artifact_id.clone(),
            title: artifact.title.clone(),
            status: artifact.status,
            target: artifact.publish_target,
        };
        let entry = NewLedgerEntry::new(entry_type, "artifacts", summary, ORCHESTRATOR)
            .with_refs(EntryRefs::artifact(artifact.artifact_id.clone()))
            .with_detail(serde_json::to_value(artifact_ref)?)
            .at_turn(context.turn_count);
        self.append_and_apply(context, entry).await
    }

    async fn append(&self, session_id: &SessionId, entry: NewLedgerEntry) -> Result<AppendReceipt> {
        let entry_type = entry.entry_type;
        let receipt = retry_transient(&self.config.retry, "append", || {
            self.ledger.append(session_id, entry.clone())
        })
        .await?;
        METRICS.inc_entries_appended();
        obs::emit_entry_appended(session_id.as_str(), entry_type.as_str(), receipt.sequence_num);
        Ok(receipt)
    }

    async fn append_and_apply(
        &self,
        context: &mut WorkingContext,
        entry: NewLedgerEntry,
    ) -> Result<AppendReceipt> {
        let session_id = context.session_id.clone();
        let receipt = self.append(&session_id, entry.clone()).await?;
        let mut stored = entry.into_entry(&session_id, receipt.sequence_num);
        stored.entry_id = receipt.entry_id.clone();
        context.apply(&stored);
        Ok(receipt)
    }

    async fn checkpoint_locked(&self, context: &mut WorkingContext) -> Result<SnapshotRecord> {
        let marker = NewLedgerEntry::new(
            EntryType::Checkpoint,
            "session",
            format!("checkpoint at turn {}", context.turn_count),
            SYSTEM,
        )
        .at_turn(context.turn_count);
        self.append_and_apply(context, marker).await?;
        let record = self.snapshots.save_snapshot(context).await?;
        METRICS.inc_checkpoints();
        obs::emit_checkpointed(
            context.session_id.as_str(),
            record.last_sequence,
            record.size_bytes,
        );
        Ok(record)
    }

    /// [`Self::lock_turn`], then reject writers that queued behind a pause
    /// or end of the session.
    async fn lock_open<'a>(
        &self,
        session_id: &SessionId,
        live: &'a LiveSession,
    ) -> Result<tokio::sync::MutexGuard<'a, WorkingContext>> {
        let context = self.lock_turn(session_id, live).await?;
        if let Some(status) = live.closed.get() {
            return Err(StrataError::SessionClosed {
                session_id: session_id.to_string(),
                status: status.as_str().to_string(),
            });
        }
        Ok(context)
    }

    async fn lock_turn<'a>(
        &self,
        session_id: &SessionId,
        live: &'a LiveSession,
    ) -> Result<tokio::sync::MutexGuard<'a, WorkingContext>> {
        tokio::time::timeout(self.config.turn_queue_timeout(), live.context.lock())
            .await
            .map_err(|_| StrataError::SessionBusy {
                session_id: session_id.to_string(),
            })
    }

    async fn open_session(&self, session_id: &SessionId) -> Result<SessionRecord> {
        let session = retry_transient(&self.config.retry, "get_session", || {
            self.sessions.get_session(session_id)
        })
        .await?;
        if session.status.is_closed() {
            return Err(StrataError::SessionClosed {
                session_id: session_id.to_string(),
                status: session.status.as_str().to_string(),
            });
        }
        Ok(session)
    }

    /// The loaded session, restoring it after a crash when the store still
    /// reports it active.
    async fn live_session(&self, session_id: &SessionId) -> Result<Arc<LiveSession>> {
        self.load_session(session_id, false).await
    }

    async fn load_session(
        &self,
        session_id: &SessionId,
        allow_paused: bool,
    ) -> Result<Arc<LiveSession>> {
        let loaded = self
            .live
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&session_id.0)
            .cloned();
        if let Some(live) = loaded {
            return Ok(live);
        }

        let session = self.open_session(session_id).await?;
        if session.status == SessionStatus::Paused && !allow_paused {
            return Err(StrataError::SessionClosed {
                session_id: session_id.to_string(),
                status: session.status.as_str().to_string(),
            });
        }
        let restored = self.snapshots.restore(session_id).await?;
        info!(
            session_id = %session_id,
            replayed = restored.replayed,
            "session reloaded from storage"
        );
        Ok(self.insert_live(&session.owner_id, restored.context))
    }

    fn insert_live(&self, owner_id: &str, context: WorkingContext) -> Arc<LiveSession> {
        let mut live = self.live.lock().unwrap_or_else(|p| p.into_inner());
        live.entry(context.session_id.0.clone())
            .or_insert_with(|| {
                Arc::new(LiveSession {
                    owner_id: owner_id.to_string(),
                    context: AsyncMutex::new(context),
                    closed: OnceLock::new(),
                })
            })
            .clone()
    }

    /// Must be called while holding `live`'s context lock.
    fn close_live(&self, session_id: &SessionId, live: &LiveSession, status: SessionStatus) {
        let _ = live.closed.set(status);
        let mut loaded = self.live.lock().unwrap_or_else(|p| p.into_inner());
        if loaded
            .get(&session_id.0)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), live))
        {
            loaded.remove(&session_id.0);
        }
    }

    /// Owner of a loaded session.
    pub fn owner_of(&self, session_id: &SessionId) -> Option<String> {
        self.live
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&session_id.0)
            .map(|l| l.owner_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_maps_to_its_entry_type() {
        let artifact = ArtifactRef {
            artifact_id: "a-1".into(),
            title: "PRD".into(),
            status: strata_state::ArtifactStatus::Draft,
            target: PublishTarget::None,
        };
        let events = vec![
            StructuralEvent::Decision {
                scope: "s".into(),
                summary: "d".into(),
                reasoning: Some("r".into()),
                options: None,
                refs: EntryRefs::default(),
            },
            StructuralEvent::Constraint {
                scope: "s".into(),
                summary: "c".into(),
                reasoning: None,
            },
            StructuralEvent::ResearchFinding {
                scope: "s".into(),
                summary: "f".into(),
                refs: EntryRefs::default(),
            },
            StructuralEvent::ChildAgentResult {
                scope: "s".into(),
                agent: "researcher".into(),
                summary: "done".into(),
                step_id: Some("s1".into()),
                status: None,
            },
            StructuralEvent::PlanCreated {
                scope: "s".into(),
                summary: "plan".into(),
                steps: vec![PlanStep::new("s1", "one")],
            },
            StructuralEvent::PlanUpdated {
                scope: "s".into(),
                summary: "update".into(),
                update: PlanUpdateDetail::default(),
            },
            StructuralEvent::ArtifactCreated {
                scope: "s".into(),
                summary: "created".into(),
                artifact: artifact.clone(),
            },
            StructuralEvent::ArtifactUpdated {
                scope: "s".into(),
                summary: "updated".into(),
                artifact,
            },
            StructuralEvent::UserClarification {
                scope: "s".into(),
                question_id: "q1".into(),
                answer: "yes".into(),
            },
            StructuralEvent::ContextInjection {
                scope: "s".into(),
                summary: "intent".into(),
                detail: InjectionDetail::default(),
            },
        ];

        let mut seen = Vec::new();
        for event in events {
            let ty = event.entry_type();
            let entry = event.into_entry(3).unwrap();
            assert_eq!(entry.entry_type, ty);
            assert_eq!(entry.turn, 3);
            entry.validate().unwrap();
            seen.push(ty);
        }
        // One variant per entry type; checkpoints are written by Strata itself.
        assert_eq!(seen.len(), 10);
        for ty in EntryType::ALL {
            assert_eq!(seen.contains(&ty), ty != EntryType::Checkpoint, "{ty}");
        }
    }

    #[test]
    fn coordinator_rejects_a_zero_checkpoint_interval() {
        let config = StrataConfig {
            checkpoint_interval: 0,
            ..StrataConfig::default()
        };
        let built = SessionCoordinator::new(
            config,
            Stores::in_memory(),
            Arc::new(crate::gateway::InMemoryGateway::new()),
            Arc::new(crate::artifact::Unconfigured),
            Arc::new(crate::artifact::Unconfigured),
        );
        assert!(matches!(built, Err(StrataError::Config(_))));
    }

    #[test]
    fn child_result_source_is_the_agent() {
        let entry = StructuralEvent::ChildAgentResult {
            scope: "research".into(),
            agent: "market-researcher".into(),
            summary: "3 competitors".into(),
            step_id: None,
            status: None,
        }
        .into_entry(1)
        .unwrap();
        assert_eq!(entry.source, "market-researcher");
    }

    #[test]
    fn events_deserialize_from_tagged_json() {
        let event: StructuralEvent = serde_json::from_value(serde_json::json!({
            "type": "decision",
            "scope": "product",
            "summary": "Mobile-first, no email in v1",
            "reasoning": null,
            "options": null,
        }))
        .unwrap();
        assert_eq!(event.entry_type(), EntryType::Decision);
    }
}
