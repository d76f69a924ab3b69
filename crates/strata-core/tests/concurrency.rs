//! Concurrency, timeout and cancellation behavior.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{decision, fast_config, Harness, ScriptedPublisher, ScriptedReviser, SlowLedger};
use futures::future::join_all;
use serde_json::json;
use strata_core::{
    Actor, ArtifactStatus, EntryType, LedgerFilter, PublishTarget, ReviewAction,
    ReviewSubmission, SessionCoordinator, SessionId, SessionOutcome, SessionStatus, Stores,
    StrataConfig, StrataError,
};
use strata_state::fakes::MemoryLedgerStore;

async fn artifact_in_review(coordinator: &SessionCoordinator, sid: &SessionId) -> String {
    let id = coordinator
        .create_artifact(sid, "prd", PublishTarget::DocumentRepository, "PRD", "body", "writer-agent")
        .await
        .unwrap()
        .artifact_id;
    coordinator.submit_artifact_for_review(sid, &id).await.unwrap();
    id
}

async fn approved_artifact(coordinator: &SessionCoordinator, sid: &SessionId) -> String {
    let id = artifact_in_review(coordinator, sid).await;
    coordinator
        .artifacts()
        .submit_review(&id, ReviewSubmission::new(1, ReviewAction::Approve, Actor::human("alice")))
        .await
        .unwrap();
    id
}

// ── Ledger ordering ────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_turns_produce_gap_free_sequences() {
    let h = Harness::with_config(StrataConfig {
        checkpoint_interval: 1_000,
        ..StrataConfig::default()
    });
    let sid = h
        .coordinator
        .start_session("pm-1", "Parallel research")
        .await
        .unwrap()
        .session_id;

    let turns = (0..16).map(|i| {
        let coordinator = h.coordinator.clone();
        let sid = sid.clone();
        tokio::spawn(async move {
            coordinator
                .process_turn(&sid, vec![decision(&format!("d{i}"), "r"), common::finding("f")])
                .await
        })
    });
    for joined in join_all(turns).await {
        joined.unwrap().unwrap();
    }

    let entries = h.coordinator.recall(&sid, &LedgerFilter::all(), None).await.unwrap();
    assert_eq!(entries.len(), 1 + 16 * 2);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.sequence_num, i as u64 + 1);
    }

    // Turns were serialized: each turn's two entries are adjacent.
    let ctx = h.coordinator.working_context(&sid).await.unwrap();
    assert_eq!(ctx.turn_count, 16);
    for pair in entries[1..].chunks(2) {
        assert_eq!(pair[0].turn, pair[1].turn);
    }
}

#[tokio::test(start_paused = true)]
async fn queued_turn_gives_up_with_session_busy() {
    let mut stores = Stores::in_memory();
    stores.ledger = Arc::new(SlowLedger::new(Duration::from_millis(500)));
    let config = StrataConfig {
        turn_queue_timeout_ms: 50,
        checkpoint_interval: 1_000,
        ..StrataConfig::default()
    };
    let h = Harness::build(config, stores, ScriptedPublisher::ok(), ScriptedReviser::ok());
    let busy = h.coordinator.start_session("pm-1", "Busy").await.unwrap().session_id;
    let idle = h.coordinator.start_session("pm-2", "Idle").await.unwrap().session_id;

    let slow = {
        let coordinator = h.coordinator.clone();
        let sid = busy.clone();
        tokio::spawn(async move { coordinator.process_turn(&sid, vec![decision("slow", "r")]).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = h
        .coordinator
        .process_turn(&busy, vec![decision("queued", "r")])
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::SessionBusy { .. }), "{err}");

    // Another session is not held up by the slow one.
    h.coordinator
        .process_turn(&idle, vec![decision("independent", "r")])
        .await
        .unwrap();

    let outcome = slow.await.unwrap().unwrap();
    assert_eq!(outcome.turn, 1);
    let ctx = h.coordinator.working_context(&busy).await.unwrap();
    assert_eq!(ctx.active_decisions.len(), 1);
    assert_eq!(ctx.active_decisions[0].summary, "slow");
}

#[tokio::test(start_paused = true)]
async fn turn_queued_behind_session_end_is_rejected() {
    let mut stores = Stores::in_memory();
    stores.ledger = Arc::new(SlowLedger::new(Duration::from_millis(50)));
    let h = Harness::build(
        StrataConfig::default(),
        stores,
        ScriptedPublisher::ok(),
        ScriptedReviser::ok(),
    );
    let sid = h.coordinator.start_session("pm-1", "Closing").await.unwrap().session_id;

    let first = {
        let coordinator = h.coordinator.clone();
        let sid = sid.clone();
        tokio::spawn(async move { coordinator.process_turn(&sid, vec![decision("first", "r")]).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let end = {
        let coordinator = h.coordinator.clone();
        let sid = sid.clone();
        tokio::spawn(async move { coordinator.end_session(&sid, SessionOutcome::Completed).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    let late = {
        let coordinator = h.coordinator.clone();
        let sid = sid.clone();
        tokio::spawn(async move { coordinator.process_turn(&sid, vec![decision("LATE", "r")]).await })
    };

    first.await.unwrap().unwrap();
    let ended = end.await.unwrap().unwrap();
    assert_eq!(ended.session.status, SessionStatus::Completed);
    let err = late.await.unwrap().unwrap_err();
    assert!(
        matches!(&err, StrataError::SessionClosed { status, .. } if status == "completed"),
        "{err}"
    );

    let entries = h.coordinator.recall(&sid, &LedgerFilter::all(), None).await.unwrap();
    assert!(entries.iter().all(|e| e.summary != "LATE"));
    assert_eq!(entries.last().unwrap().entry_type, EntryType::Checkpoint);
}

#[tokio::test]
async fn retried_append_after_lost_receipt_is_not_duplicated() {
    let ledger = Arc::new(MemoryLedgerStore::new());
    let mut stores = Stores::in_memory();
    stores.ledger = ledger.clone();
    let mut config = StrataConfig::default();
    config.retry.max_attempts = 3;
    config.retry.backoff_base_ms = 1;
    config.retry.backoff_max_ms = 1;
    let h = Harness::build(config, stores, ScriptedPublisher::ok(), ScriptedReviser::ok());
    let sid = h.coordinator.start_session("pm-1", "Flaky link").await.unwrap().session_id;

    ledger.lose_next_receipts(1);
    let outcome = h
        .coordinator
        .process_turn(&sid, vec![decision("exactly once", "r")])
        .await
        .unwrap();
    assert_eq!(outcome.receipts[0].sequence_num, 2);

    let decisions = h
        .coordinator
        .recall(&sid, &LedgerFilter::all().with_types([EntryType::Decision]), None)
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].entry_id, outcome.receipts[0].entry_id);
    let ctx = h.coordinator.working_context(&sid).await.unwrap();
    assert_eq!(ctx.active_decisions.len(), 1);
}

// ── Reviews ────────────────────────────────────────────────────────────

#[tokio::test]
async fn conflicting_reviews_first_one_wins() {
    let h = Harness::new();
    let sid = h.coordinator.start_session("pm-1", "PRD").await.unwrap().session_id;
    let id = artifact_in_review(&h.coordinator, &sid).await;

    let approve = {
        let coordinator = h.coordinator.clone();
        let id = id.clone();
        tokio::spawn(async move {
            coordinator
                .artifacts()
                .submit_review(&id, ReviewSubmission::new(1, ReviewAction::Approve, Actor::human("alice")))
                .await
        })
    };
    let reject = {
        let coordinator = h.coordinator.clone();
        let id = id.clone();
        tokio::spawn(async move {
            coordinator
                .artifacts()
                .submit_review(&id, ReviewSubmission::new(1, ReviewAction::Reject, Actor::human("bob")))
                .await
        })
    };
    let results = [approve.await.unwrap(), reject.await.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser, StrataError::InvalidTransition { .. }), "{loser}");

    let final_status = h.coordinator.artifacts().get_artifact(&id).await.unwrap().status;
    assert_eq!(final_status, winners[0].status);
    assert_eq!(h.coordinator.artifacts().get_reviews(&id).await.unwrap().len(), 1);
}

// ── Publish dispatch ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn publish_timeout_lands_in_publish_failed_and_can_be_retried() {
    let config = StrataConfig {
        dispatch_timeout_ms: 100,
        ..fast_config()
    };
    let publisher = ScriptedPublisher::hanging(Duration::from_secs(30));
    let h = Harness::build(config, Stores::in_memory(), publisher, ScriptedReviser::ok());
    let sid = h.coordinator.start_session("pm-1", "PRD").await.unwrap().session_id;
    let id = approved_artifact(&h.coordinator, &sid).await;
    let alice = Actor::human("alice");

    let err = h
        .coordinator
        .artifacts()
        .request_publish(&id, &alice, &json!({}))
        .await
        .unwrap_err();
    match &err {
        StrataError::PublishFailure { reason, .. } => assert!(reason.contains("timed out"), "{reason}"),
        other => panic!("expected PublishFailure, got {other}"),
    }
    let failed = h.coordinator.artifacts().get_artifact(&id).await.unwrap();
    assert_eq!(failed.status, ArtifactStatus::PublishFailed);
    assert!(failed.last_error.is_some());
    assert!(failed.external_url.is_none());

    h.publisher.succeed();
    let published = h
        .coordinator
        .artifacts()
        .retry_publish(&id, &alice, &json!({}))
        .await
        .unwrap();
    assert_eq!(published.status, ArtifactStatus::Published);
    assert!(published.last_error.is_none());
    assert_eq!(h.publisher.calls(), 2);

    // Every publisher call is preceded by a publish review.
    let publish_reviews = h
        .coordinator
        .artifacts()
        .get_reviews(&id)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.action == ReviewAction::Publish)
        .count();
    assert_eq!(publish_reviews, 2);
}

#[tokio::test]
async fn publisher_error_is_reported_with_its_reason() {
    let publisher = ScriptedPublisher::failing("space PM is read-only");
    let h = Harness::build(fast_config(), Stores::in_memory(), publisher, ScriptedReviser::ok());
    let sid = h.coordinator.start_session("pm-1", "PRD").await.unwrap().session_id;
    let id = approved_artifact(&h.coordinator, &sid).await;

    let err = h
        .coordinator
        .artifacts()
        .request_publish(&id, &Actor::human("alice"), &json!({ "space": "PM" }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("space PM is read-only"), "{err}");

    let failed = h.coordinator.artifacts().get_artifact(&id).await.unwrap();
    assert_eq!(failed.status, ArtifactStatus::PublishFailed);
    assert_eq!(failed.last_error.as_deref(), Some("space PM is read-only"));
}

#[tokio::test(start_paused = true)]
async fn cancelled_publish_lands_in_publish_failed() {
    let config = StrataConfig {
        dispatch_timeout_ms: 600_000,
        ..fast_config()
    };
    let publisher = ScriptedPublisher::hanging(Duration::from_secs(3_600));
    let h = Harness::build(config, Stores::in_memory(), publisher, ScriptedReviser::ok());
    let sid = h.coordinator.start_session("pm-1", "PRD").await.unwrap().session_id;
    let id = approved_artifact(&h.coordinator, &sid).await;

    assert!(!h.coordinator.artifacts().cancel_dispatch(&id));

    let publishing = {
        let coordinator = h.coordinator.clone();
        let id = id.clone();
        tokio::spawn(async move {
            coordinator
                .artifacts()
                .request_publish(&id, &Actor::human("alice"), &json!({}))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        h.coordinator.artifacts().get_artifact(&id).await.unwrap().status,
        ArtifactStatus::Publishing
    );
    assert!(h.coordinator.artifacts().cancel_dispatch(&id));

    let err = publishing.await.unwrap().unwrap_err();
    assert!(matches!(err, StrataError::PublishFailure { .. }), "{err}");
    let failed = h.coordinator.artifacts().get_artifact(&id).await.unwrap();
    assert_eq!(failed.status, ArtifactStatus::PublishFailed);
    assert_eq!(failed.last_error.as_deref(), Some("cancelled"));
}

// ── Revision dispatch ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn revision_timeout_returns_to_revision_requested() {
    let config = StrataConfig {
        dispatch_timeout_ms: 100,
        ..fast_config()
    };
    let reviser = ScriptedReviser::hanging(Duration::from_secs(30));
    let h = Harness::build(config, Stores::in_memory(), ScriptedPublisher::ok(), reviser);
    let sid = h.coordinator.start_session("pm-1", "PRD").await.unwrap().session_id;
    let id = artifact_in_review(&h.coordinator, &sid).await;
    let artifacts = h.coordinator.artifacts();

    artifacts
        .submit_review(
            &id,
            ReviewSubmission::new(1, ReviewAction::RequestRevision, Actor::human("alice"))
                .with_feedback("Tighten the scope"),
        )
        .await
        .unwrap();

    let err = artifacts.dispatch_revision(&id).await.unwrap_err();
    assert!(matches!(err, StrataError::RevisionFailure { .. }), "{err}");
    let back = artifacts.get_artifact(&id).await.unwrap();
    assert_eq!(back.status, ArtifactStatus::RevisionRequested);
    assert_eq!(back.version, 1);
    assert!(back.last_error.as_deref().unwrap_or("").contains("timed out"));

    h.reviser.succeed();
    let revised = artifacts.dispatch_revision(&id).await.unwrap();
    assert_eq!(revised.status, ArtifactStatus::Review);
    assert_eq!(revised.version, 2);
    assert!(revised.last_error.is_none());
    assert_eq!(h.reviser.calls(), 2);
    assert_eq!(artifacts.get_versions(&id).await.unwrap().len(), 2);
}
