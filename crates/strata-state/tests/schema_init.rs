//! Integration tests for SurrealDB schema initialization
//!
//! These tests verify that the migration functions set up the unique
//! indexes the stores rely on for ordering and write-once history.

use strata_state::migrations::init_schema;
use strata_state::SurrealHandle;

#[tokio::test]
async fn schema_init_twice_is_harmless() {
    let handle = SurrealHandle::in_memory().await.unwrap();
    init_schema(handle.db()).await.unwrap();
}

#[tokio::test]
async fn duplicate_ledger_sequence_is_rejected() {
    let handle = SurrealHandle::in_memory().await.unwrap();
    let db = handle.db();

    db.query("CREATE ledger_entries CONTENT { session_id: 's-1', sequence_num: 1, entry_id: 'a' }")
        .await
        .unwrap()
        .check()
        .unwrap();

    let result = db
        .query("CREATE ledger_entries CONTENT { session_id: 's-1', sequence_num: 1, entry_id: 'b' }")
        .await
        .unwrap()
        .check();
    assert!(
        result.is_err(),
        "second entry with the same (session_id, sequence_num) must fail"
    );

    // Same number in another session is fine.
    db.query("CREATE ledger_entries CONTENT { session_id: 's-2', sequence_num: 1, entry_id: 'c' }")
        .await
        .unwrap()
        .check()
        .unwrap();
}

#[tokio::test]
async fn duplicate_artifact_version_is_rejected() {
    let handle = SurrealHandle::in_memory().await.unwrap();
    let db = handle.db();

    db.query("CREATE artifact_versions CONTENT { artifact_id: 'a-1', version: 1 }")
        .await
        .unwrap()
        .check()
        .unwrap();
    let result = db
        .query("CREATE artifact_versions CONTENT { artifact_id: 'a-1', version: 1 }")
        .await
        .unwrap()
        .check();
    assert!(result.is_err());
}
