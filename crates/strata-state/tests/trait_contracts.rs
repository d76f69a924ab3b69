//! Trait contract tests for SessionStore, LedgerStore, SnapshotStore and
//! ArtifactStore.
//!
//! Each contract runs against the in-memory fakes and the SurrealDB
//! implementation on `mem://`. Any conforming implementation must pass these.

use std::collections::HashSet;
use std::sync::Arc;

use strata_state::fakes::{
    MemoryArtifactStore, MemoryLedgerStore, MemorySessionStore, MemorySnapshotStore,
};
use strata_state::storage_traits::*;
use strata_state::{StorageError, SurrealArtifactStore, SurrealLedgerStore};

fn decision(summary: &str) -> NewLedgerEntry {
    NewLedgerEntry::new(EntryType::Decision, "product", summary, "orchestrator")
}

// ===========================================================================
// SessionStore contract
// ===========================================================================

async fn session_contract(store: &dyn SessionStore) {
    let created = store.create_session("owner-1").await.unwrap();
    assert_eq!(created.status, SessionStatus::Active);

    let loaded = store.get_session(&created.session_id).await.unwrap();
    assert_eq!(loaded.owner_id, "owner-1");

    let paused = store
        .update_session_status(&created.session_id, SessionStatus::Paused)
        .await
        .unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);

    store.create_session("owner-2").await.unwrap();
    let mine = store.list_sessions(Some("owner-1")).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(store.list_sessions(None).await.unwrap().len(), 2);

    let err = store
        .get_session(&SessionId::from("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::SessionNotFound { .. }));
}

#[tokio::test]
async fn memory_session_contract() {
    session_contract(&MemorySessionStore::new()).await;
}

#[tokio::test]
async fn surreal_session_contract() {
    session_contract(&SurrealLedgerStore::in_memory().await.unwrap()).await;
}

// ===========================================================================
// LedgerStore contract
// ===========================================================================

async fn ledger_sequence_contract(store: &dyn LedgerStore) {
    let sid = SessionId::new();
    assert_eq!(store.last_sequence(&sid).await.unwrap(), 0);

    for i in 1..=3u64 {
        let receipt = store
            .append(&sid, decision(&format!("d{i}")).at_turn(i))
            .await
            .unwrap();
        assert_eq!(receipt.sequence_num, i);
    }
    assert_eq!(store.last_sequence(&sid).await.unwrap(), 3);

    // Sequences are per session.
    let other = SessionId::new();
    let receipt = store.append(&other, decision("other")).await.unwrap();
    assert_eq!(receipt.sequence_num, 1);

    let all = store.query(&sid, &LedgerFilter::all(), None).await.unwrap();
    let seqs: Vec<u64> = all.iter().map(|e| e.sequence_num).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(all[1].summary, "d2");
    assert_eq!(all[1].turn, 2);
    assert!(!all[1].promoted);
}

async fn ledger_filter_contract(store: &dyn LedgerStore) {
    let sid = SessionId::new();
    store.append(&sid, decision("pick A")).await.unwrap();
    store
        .append(
            &sid,
            NewLedgerEntry::new(EntryType::Constraint, "budget", "Under 10k", "user"),
        )
        .await
        .unwrap();
    store
        .append(
            &sid,
            NewLedgerEntry::new(EntryType::ResearchFinding, "market", "3 competitors", "research")
                .with_detail(serde_json::json!({"confidence": 0.7})),
        )
        .await
        .unwrap();
    store.append(&sid, decision("pick B")).await.unwrap();

    let decisions = store
        .query(&sid, &LedgerFilter::all().with_types([EntryType::Decision]), None)
        .await
        .unwrap();
    assert_eq!(decisions.len(), 2);
    assert!(decisions.windows(2).all(|w| w[0].sequence_num < w[1].sequence_num));

    let budget = store
        .query(&sid, &LedgerFilter::all().with_scopes(["budget"]), None)
        .await
        .unwrap();
    assert_eq!(budget.len(), 1);
    assert_eq!(budget[0].entry_type, EntryType::Constraint);

    let tail = store
        .query(&sid, &LedgerFilter::all().since(2), None)
        .await
        .unwrap();
    assert_eq!(
        tail.iter().map(|e| e.sequence_num).collect::<Vec<_>>(),
        vec![3, 4]
    );
    assert_eq!(tail[0].detail["confidence"], 0.7);

    let limited = store
        .query(&sid, &LedgerFilter::all(), Some(2))
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].sequence_num, 1);
}

async fn ledger_promotion_contract(store: &dyn LedgerStore) {
    let sid = SessionId::new();
    store.append(&sid, decision("keep")).await.unwrap();
    store.append(&sid, decision("also keep")).await.unwrap();

    store.mark_promoted(&sid, 1, "ext-1").await.unwrap();
    // Same id again is a no-op.
    store.mark_promoted(&sid, 1, "ext-1").await.unwrap();

    let err = store.mark_promoted(&sid, 1, "ext-other").await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyPromoted { ref existing, .. } if existing == "ext-1"));

    let entry = store.get_entry(&sid, 1).await.unwrap();
    assert!(entry.promoted);
    assert_eq!(entry.external_id.as_deref(), Some("ext-1"));

    let pending = store
        .query(&sid, &LedgerFilter::all().unpromoted(), None)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].sequence_num, 2);

    let err = store.mark_promoted(&sid, 99, "ext-9").await.unwrap_err();
    assert!(matches!(err, StorageError::EntryNotFound { sequence_num: 99, .. }));
}

async fn ledger_rejects_invalid_entries(store: &dyn LedgerStore) {
    let sid = SessionId::new();
    let err = store.append(&sid, decision("")).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidEntry { .. }));
    // Rejected entries do not consume a sequence number.
    assert_eq!(store.last_sequence(&sid).await.unwrap(), 0);
}

async fn ledger_resubmitted_entry_is_written_once(store: &dyn LedgerStore) {
    let sid = SessionId::new();
    let entry = decision("only once");
    let first = store.append(&sid, entry.clone()).await.unwrap();
    let again = store.append(&sid, entry).await.unwrap();
    assert_eq!(again, first);

    let next = store.append(&sid, decision("next")).await.unwrap();
    assert_eq!(next.sequence_num, 2);
    let all = store.query(&sid, &LedgerFilter::all(), None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].entry_id, first.entry_id);
}

async fn ledger_concurrent_appends_are_gap_free(store: Arc<dyn LedgerStore>) {
    let sid = SessionId::new();
    let handles: Vec<_> = (0..20)
        .map(|i| {
            let store = store.clone();
            let sid = sid.clone();
            tokio::spawn(async move {
                store
                    .append(&sid, decision(&format!("concurrent {i}")))
                    .await
                    .unwrap()
                    .sequence_num
            })
        })
        .collect();

    let mut seqs: Vec<u64> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=20).collect::<Vec<u64>>());

    let unique: HashSet<u64> = store
        .query(&sid, &LedgerFilter::all(), None)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.sequence_num)
        .collect();
    assert_eq!(unique.len(), 20);
}

#[tokio::test]
async fn memory_ledger_contract() {
    let store = MemoryLedgerStore::new();
    ledger_sequence_contract(&store).await;
    ledger_filter_contract(&store).await;
    ledger_promotion_contract(&store).await;
    ledger_rejects_invalid_entries(&store).await;
    ledger_resubmitted_entry_is_written_once(&store).await;
    ledger_concurrent_appends_are_gap_free(Arc::new(MemoryLedgerStore::new())).await;
}

#[tokio::test]
async fn surreal_ledger_contract() {
    let store = SurrealLedgerStore::in_memory().await.unwrap();
    ledger_sequence_contract(&store).await;
    ledger_filter_contract(&store).await;
    ledger_promotion_contract(&store).await;
    ledger_rejects_invalid_entries(&store).await;
    ledger_resubmitted_entry_is_written_once(&store).await;
    ledger_concurrent_appends_are_gap_free(Arc::new(store)).await;
}

#[tokio::test]
async fn memory_ledger_scripted_outage_is_transient() {
    let store = MemoryLedgerStore::new();
    let sid = SessionId::new();
    store.fail_next_appends(1);

    let err = store.append(&sid, decision("first")).await.unwrap_err();
    assert!(err.is_transient());

    let receipt = store.append(&sid, decision("first")).await.unwrap();
    assert_eq!(receipt.sequence_num, 1);
}

#[tokio::test]
async fn memory_ledger_retry_after_lost_receipt_finds_the_committed_row() {
    let store = MemoryLedgerStore::new();
    let sid = SessionId::new();
    store.lose_next_receipts(1);

    let entry = decision("committed but unacknowledged");
    let err = store.append(&sid, entry.clone()).await.unwrap_err();
    assert!(err.is_transient());

    let receipt = store.append(&sid, entry).await.unwrap();
    assert_eq!(receipt.sequence_num, 1);
    assert_eq!(store.last_sequence(&sid).await.unwrap(), 1);
}

// ===========================================================================
// SnapshotStore contract
// ===========================================================================

async fn snapshot_contract(store: &dyn SnapshotStore) {
    let sid = SessionId::new();
    assert!(store.load_snapshot(&sid).await.unwrap().is_none());

    let first = SnapshotRecord::new(sid.clone(), serde_json::json!({"turn_count": 5}), 12).unwrap();
    store.save_snapshot(first).await.unwrap();

    let second =
        SnapshotRecord::new(sid.clone(), serde_json::json!({"turn_count": 10}), 25).unwrap();
    store.save_snapshot(second.clone()).await.unwrap();

    let loaded = store.load_snapshot(&sid).await.unwrap().unwrap();
    assert_eq!(loaded.last_sequence, 25);
    assert_eq!(loaded.state, second.state);
    assert_eq!(loaded.digest, second.digest);
    assert!(loaded.verify());
}

#[tokio::test]
async fn memory_snapshot_contract() {
    snapshot_contract(&MemorySnapshotStore::new()).await;
}

#[tokio::test]
async fn surreal_snapshot_contract() {
    snapshot_contract(&SurrealLedgerStore::in_memory().await.unwrap()).await;
}

// ===========================================================================
// ArtifactStore contract
// ===========================================================================

fn draft(sid: &SessionId) -> (ArtifactRecord, ArtifactVersionRecord) {
    let artifact = ArtifactRecord::draft(
        sid.clone(),
        "prd",
        PublishTarget::DocumentRepository,
        "Checkout PRD",
        "v1 body",
    );
    let version = ArtifactVersionRecord::new(
        artifact.artifact_id.clone(),
        1,
        "v1 body",
        "initial draft",
        "orchestrator",
    );
    (artifact, version)
}

async fn artifact_contract(store: &dyn ArtifactStore) {
    let sid = SessionId::new();
    let (artifact, v1) = draft(&sid);
    let aid = artifact.artifact_id.clone();
    store.insert_artifact(artifact, v1).await.unwrap();

    let loaded = store.get_artifact(&aid).await.unwrap();
    assert_eq!(loaded.status, ArtifactStatus::Draft);
    assert_eq!(loaded.version, 1);

    // Compare-and-set succeeds from the expected status.
    let mut next = loaded.clone();
    next.status = ArtifactStatus::Review;
    store
        .update_artifact(next, ArtifactStatus::Draft)
        .await
        .unwrap();

    // And fails once the stored status moved on.
    let mut stale = loaded.clone();
    stale.status = ArtifactStatus::Approved;
    let err = store
        .update_artifact(stale, ArtifactStatus::Draft)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::StaleWrite { ref actual, .. } if actual == "review"
    ));

    // Revision bumps the version and writes the immutable row in one step.
    let mut revising = store.get_artifact(&aid).await.unwrap();
    revising.status = ArtifactStatus::Revising;
    store
        .update_artifact(revising, ArtifactStatus::Review)
        .await
        .unwrap();

    let mut revised = store.get_artifact(&aid).await.unwrap();
    revised.status = ArtifactStatus::Review;
    revised.version = 2;
    revised.content = "v2 body".to_string();
    let v2 = ArtifactVersionRecord::new(aid.clone(), 2, "v2 body", "tightened scope", "writer");
    store
        .commit_revision(revised.clone(), ArtifactStatus::Revising, v2.clone())
        .await
        .unwrap();

    // A second commit from the same expected status is stale.
    let err = store
        .commit_revision(revised, ArtifactStatus::Revising, v2)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::StaleWrite { .. }));

    let versions = store.list_versions(&aid).await.unwrap();
    assert_eq!(
        versions.iter().map(|v| v.version).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(versions[0].content, "v1 body");
    assert_eq!(versions[1].content, "v2 body");

    let current = store.get_artifact(&aid).await.unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(current.status, ArtifactStatus::Review);

    let review = ArtifactReviewRecord::new(aid.clone(), 2, ReviewAction::RequestRevision, "alice")
        .with_feedback(Some("add metrics".to_string()))
        .with_comments(vec![InlineComment {
            anchor: "## Goals".to_string(),
            comment: "quantify".to_string(),
        }]);
    store.append_review(review).await.unwrap();
    let reviews = store.list_reviews(&aid).await.unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].action, ReviewAction::RequestRevision);
    assert_eq!(reviews[0].inline_comments.len(), 1);

    let listed = store.list_artifacts(&sid).await.unwrap();
    assert_eq!(listed.len(), 1);

    let err = store.get_artifact("missing").await.unwrap_err();
    assert!(matches!(err, StorageError::ArtifactNotFound { .. }));
}

#[tokio::test]
async fn memory_artifact_contract() {
    artifact_contract(&MemoryArtifactStore::new()).await;
}

#[tokio::test]
async fn surreal_artifact_contract() {
    artifact_contract(&SurrealArtifactStore::in_memory().await.unwrap()).await;
}
