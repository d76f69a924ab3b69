//! Shared fixtures for the strata-core integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use strata_core::{
    ArtifactRecord, CollaboratorError, ContentReviser, InMemoryGateway, PublishReceipt, Publisher,
    Revision, RevisionFeedback, SessionCoordinator, Stores, StrataConfig, StructuralEvent,
};
use strata_state::fakes::MemoryLedgerStore;
use strata_state::{
    AppendReceipt, EntryRefs, LedgerEntry, LedgerFilter, LedgerStore, NewLedgerEntry, SessionId,
    StorageResult,
};

// ── Collaborators ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Mode {
    Succeed,
    Fail(String),
    Hang(Duration),
}

/// Publisher whose behavior can be switched between calls.
pub struct ScriptedPublisher {
    mode: Mutex<Mode>,
    calls: AtomicU32,
}

impl ScriptedPublisher {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(Mode::Succeed),
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        let publisher = Self::ok();
        publisher.fail_with(message);
        publisher
    }

    pub fn hanging(delay: Duration) -> Arc<Self> {
        let publisher = Self::ok();
        publisher.hang_for(delay);
        publisher
    }

    pub fn succeed(&self) {
        *self.mode.lock().unwrap() = Mode::Succeed;
    }

    pub fn fail_with(&self, message: &str) {
        *self.mode.lock().unwrap() = Mode::Fail(message.to_string());
    }

    pub fn hang_for(&self, delay: Duration) {
        *self.mode.lock().unwrap() = Mode::Hang(delay);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(
        &self,
        artifact: &ArtifactRecord,
        _target_config: &serde_json::Value,
    ) -> Result<PublishReceipt, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            Mode::Succeed => Ok(PublishReceipt {
                external_id: format!("doc-{}", artifact.artifact_id),
                url: format!("https://docs.example.test/{}", artifact.artifact_id),
            }),
            Mode::Fail(message) => Err(CollaboratorError::new(message)),
            Mode::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Err(CollaboratorError::new("hung publisher woke up"))
            }
        }
    }
}

/// Reviser that appends the reviewer feedback to the content.
pub struct ScriptedReviser {
    mode: Mutex<Mode>,
    calls: AtomicU32,
    last_feedback: Mutex<Option<RevisionFeedback>>,
}

impl ScriptedReviser {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(Mode::Succeed),
            calls: AtomicU32::new(0),
            last_feedback: Mutex::new(None),
        })
    }

    pub fn hanging(delay: Duration) -> Arc<Self> {
        let reviser = Self::ok();
        *reviser.mode.lock().unwrap() = Mode::Hang(delay);
        reviser
    }

    pub fn succeed(&self) {
        *self.mode.lock().unwrap() = Mode::Succeed;
    }

    pub fn last_feedback(&self) -> Option<RevisionFeedback> {
        self.last_feedback.lock().unwrap().clone()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentReviser for ScriptedReviser {
    async fn revise(
        &self,
        artifact: &ArtifactRecord,
        feedback: &RevisionFeedback,
    ) -> Result<Revision, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_feedback.lock().unwrap() = Some(feedback.clone());
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            Mode::Succeed => Ok(Revision {
                content: format!("{}\n\n[revised] {}", artifact.content, feedback.feedback),
                change_summary: format!("addressed: {}", feedback.feedback),
                author: "writer-agent".to_string(),
            }),
            Mode::Fail(message) => Err(CollaboratorError::new(message)),
            Mode::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Err(CollaboratorError::new("hung reviser woke up"))
            }
        }
    }
}

// ── Ledger wrapper ─────────────────────────────────────────────────────

/// In-memory ledger whose appends take `delay`.
pub struct SlowLedger {
    inner: MemoryLedgerStore,
    delay: Duration,
}

impl SlowLedger {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryLedgerStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl LedgerStore for SlowLedger {
    async fn append(
        &self,
        session_id: &SessionId,
        entry: NewLedgerEntry,
    ) -> StorageResult<AppendReceipt> {
        tokio::time::sleep(self.delay).await;
        self.inner.append(session_id, entry).await
    }

    async fn query(
        &self,
        session_id: &SessionId,
        filter: &LedgerFilter,
        limit: Option<usize>,
    ) -> StorageResult<Vec<LedgerEntry>> {
        self.inner.query(session_id, filter, limit).await
    }

    async fn get_entry(
        &self,
        session_id: &SessionId,
        sequence_num: u64,
    ) -> StorageResult<LedgerEntry> {
        self.inner.get_entry(session_id, sequence_num).await
    }

    async fn mark_promoted(
        &self,
        session_id: &SessionId,
        sequence_num: u64,
        external_id: &str,
    ) -> StorageResult<()> {
        self.inner
            .mark_promoted(session_id, sequence_num, external_id)
            .await
    }

    async fn last_sequence(&self, session_id: &SessionId) -> StorageResult<u64> {
        self.inner.last_sequence(session_id).await
    }
}

// ── Harness ────────────────────────────────────────────────────────────

pub struct Harness {
    pub coordinator: Arc<SessionCoordinator>,
    pub stores: Stores,
    pub gateway: Arc<InMemoryGateway>,
    pub publisher: Arc<ScriptedPublisher>,
    pub reviser: Arc<ScriptedReviser>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(StrataConfig::default())
    }

    pub fn with_config(config: StrataConfig) -> Self {
        Self::build(config, Stores::in_memory(), ScriptedPublisher::ok(), ScriptedReviser::ok())
    }

    pub fn build(
        config: StrataConfig,
        stores: Stores,
        publisher: Arc<ScriptedPublisher>,
        reviser: Arc<ScriptedReviser>,
    ) -> Self {
        let gateway = Arc::new(InMemoryGateway::new());
        let coordinator = Arc::new(
            SessionCoordinator::new(
                config,
                stores.clone(),
                gateway.clone(),
                publisher.clone(),
                reviser.clone(),
            )
            .expect("valid config"),
        );
        Self {
            coordinator,
            stores,
            gateway,
            publisher,
            reviser,
        }
    }

    /// A second coordinator over the same stores and gateway, as after a
    /// process restart.
    pub fn restarted(&self) -> SessionCoordinator {
        SessionCoordinator::new(
            self.coordinator.config().clone(),
            self.stores.clone(),
            self.gateway.clone(),
            self.publisher.clone(),
            self.reviser.clone(),
        )
        .expect("valid config")
    }
}

/// Config with quick retries so failure paths don't stall tests.
pub fn fast_config() -> StrataConfig {
    let mut config = StrataConfig::default();
    config.retry.max_attempts = 1;
    config.retry.backoff_base_ms = 1;
    config.retry.backoff_max_ms = 1;
    config
}

// ── Events ─────────────────────────────────────────────────────────────

pub fn decision(summary: &str, reasoning: &str) -> StructuralEvent {
    StructuralEvent::Decision {
        scope: "product".to_string(),
        summary: summary.to_string(),
        reasoning: Some(reasoning.to_string()),
        options: None,
        refs: EntryRefs::default(),
    }
}

pub fn constraint(summary: &str) -> StructuralEvent {
    StructuralEvent::Constraint {
        scope: "product".to_string(),
        summary: summary.to_string(),
        reasoning: None,
    }
}

pub fn finding(summary: &str) -> StructuralEvent {
    StructuralEvent::ResearchFinding {
        scope: "research".to_string(),
        summary: summary.to_string(),
        refs: EntryRefs::default(),
    }
}
