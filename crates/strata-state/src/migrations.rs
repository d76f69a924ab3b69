//! Table, field and index definitions for the Strata database.
//!
//! Artifact versions and reviews are immutable once written; ledger rows
//! only ever change their `promoted` flag.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Define every Strata table. Runs on each connect; re-running is a no-op.
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Strata SurrealDB schema");

    init_sessions_table(db).await?;
    init_ledger_entries_table(db).await?;
    init_snapshots_table(db).await?;
    init_artifacts_table(db).await?;
    init_artifact_versions_table(db).await?;
    init_artifact_reviews_table(db).await?;

    info!("Strata schema initialization complete");
    Ok(())
}

/// Initialize `sessions` table
///
/// Schema:
/// ```text
/// TABLE sessions {
///   session_id:  STRING (unique)
///   owner_id:    STRING (indexed)
///   status:      STRING (active | paused | completed | abandoned)
///   created_at:  DATETIME
///   updated_at:  DATETIME
/// }
/// ```
///
/// Sessions are never deleted.
async fn init_sessions_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing sessions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS sessions AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_session_id ON TABLE sessions COLUMNS session_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_owner_id ON TABLE sessions COLUMNS owner_id;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ sessions table initialized");
    Ok(())
}

/// Initialize `ledger_entries` table
///
/// Schema:
/// ```text
/// TABLE ledger_entries {
///   entry_id:      STRING (unique)
///   session_id:    STRING
///   sequence_num:  INT (1-indexed, gap-free per session)
///   entry_type:    STRING
///   scope:         STRING
///   summary:       STRING
///   reasoning:     STRING?
///   options:       OBJECT?
///   refs:          OBJECT
///   source:        STRING
///   turn:          INT
///   detail:        ANY
///   promoted:      BOOL
///   external_id:   STRING?
///   timestamp:     DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(session_id, sequence_num)` is unique; a concurrent writer racing for
///   the same number fails on this index.
/// - Only `promoted` and `external_id` are ever rewritten (enforced via app logic).
async fn init_ledger_entries_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing ledger_entries table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS ledger_entries AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_session_seq ON TABLE ledger_entries COLUMNS session_id, sequence_num UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_entry_id ON TABLE ledger_entries COLUMNS entry_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_session_type ON TABLE ledger_entries COLUMNS session_id, entry_type;
        DEFINE INDEX IF NOT EXISTS idx_session_promoted ON TABLE ledger_entries COLUMNS session_id, promoted;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ ledger_entries table initialized");
    Ok(())
}

/// Initialize `snapshots` table (latest working context per session)
async fn init_snapshots_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing snapshots table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS snapshots AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_snapshot_session ON TABLE snapshots COLUMNS session_id UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ snapshots table initialized");
    Ok(())
}

/// Initialize `artifacts` table
///
/// Status changes are compare-and-set on `status` (enforced via app logic).
async fn init_artifacts_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing artifacts table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS artifacts AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_artifact_id ON TABLE artifacts COLUMNS artifact_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_artifact_session ON TABLE artifacts COLUMNS session_id;
        DEFINE INDEX IF NOT EXISTS idx_artifact_status ON TABLE artifacts COLUMNS artifact_id, status;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ artifacts table initialized");
    Ok(())
}

/// Initialize `artifact_versions` table (write-once)
async fn init_artifact_versions_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing artifact_versions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS artifact_versions AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_artifact_version ON TABLE artifact_versions COLUMNS artifact_id, version UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ artifact_versions table initialized");
    Ok(())
}

/// Initialize `artifact_reviews` table (write-once)
async fn init_artifact_reviews_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing artifact_reviews table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS artifact_reviews AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_review_id ON TABLE artifact_reviews COLUMNS review_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_review_artifact ON TABLE artifact_reviews COLUMNS artifact_id, created_at;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ artifact_reviews table initialized");
    Ok(())
}
