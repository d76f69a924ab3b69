//! SurrealDB-backed ArtifactStore implementation

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::{ArtifactReviewRow, ArtifactRow, ArtifactVersionRow};
use crate::storage_traits::{
    ArtifactRecord, ArtifactReviewRecord, ArtifactStatus, ArtifactStore, ArtifactVersionRecord,
    SessionId, StorageResult,
};

const STALE_MARKER: &str = "strata_stale_write";

/// SurrealDB-backed implementation of [`ArtifactStore`].
///
/// Status updates are conditional on the stored status; multi-row writes
/// run inside a single SurrealQL transaction.
pub struct SurrealArtifactStore {
    db: Surreal<Any>,
}

impl SurrealArtifactStore {
    pub fn new(handle: &SurrealHandle) -> Self {
        Self {
            db: handle.db().clone(),
        }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(&SurrealHandle::in_memory().await?))
    }

    async fn fetch_artifact(&self, aid: &str) -> StorageResult<ArtifactRow> {
        let mut res = self
            .db
            .query("SELECT * FROM artifacts WHERE artifact_id = $aid")
            .bind(("aid", aid.to_string()))
            .await?;
        let rows: Vec<ArtifactRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::ArtifactNotFound {
                artifact_id: aid.to_string(),
            })
    }

    async fn version_exists(&self, aid: &str, version: u32) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("SELECT * FROM artifact_versions WHERE artifact_id = $aid AND version = $version")
            .bind(("aid", aid.to_string()))
            .bind(("version", version))
            .await?;
        let rows: Vec<ArtifactVersionRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    /// Build the error for a failed compare-and-set by reading the current row.
    async fn stale_write(&self, aid: &str, expected: ArtifactStatus) -> StorageError {
        match self.fetch_artifact(aid).await {
            Ok(row) => StorageError::StaleWrite {
                artifact_id: aid.to_string(),
                expected: expected.to_string(),
                actual: row.status,
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl ArtifactStore for SurrealArtifactStore {
    async fn insert_artifact(
        &self,
        artifact: ArtifactRecord,
        initial: ArtifactVersionRecord,
    ) -> StorageResult<ArtifactRecord> {
        debug!(artifact_id = %artifact.artifact_id, session_id = %artifact.session_id, "creating artifact");
        self.db
            .query(
                "BEGIN TRANSACTION; \
                 CREATE artifacts CONTENT $row; \
                 CREATE artifact_versions CONTENT $version; \
                 COMMIT TRANSACTION;",
            )
            .bind(("row", ArtifactRow::from(&artifact)))
            .bind(("version", ArtifactVersionRow::from(&initial)))
            .await?
            .check()
            .map_err(|e| {
                warn!(artifact_id = %initial.artifact_id, error = %e, "artifact insert rejected");
                StorageError::Backend(format!("artifact insert failed: {e}"))
            })?;
        Ok(artifact)
    }

    async fn get_artifact(&self, artifact_id: &str) -> StorageResult<ArtifactRecord> {
        self.fetch_artifact(artifact_id).await?.into_record()
    }

    async fn list_artifacts(&self, session_id: &SessionId) -> StorageResult<Vec<ArtifactRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM artifacts WHERE session_id = $sid ORDER BY created_at ASC")
            .bind(("sid", session_id.0.clone()))
            .await?;
        let rows: Vec<ArtifactRow> = res.take(0)?;
        rows.into_iter().map(ArtifactRow::into_record).collect()
    }

    async fn update_artifact(
        &self,
        mut artifact: ArtifactRecord,
        expected_status: ArtifactStatus,
    ) -> StorageResult<ArtifactRecord> {
        artifact.updated_at = chrono::Utc::now();
        let aid = artifact.artifact_id.clone();
        let mut res = self
            .db
            .query(
                "UPDATE artifacts CONTENT $row \
                 WHERE artifact_id = $aid AND status = $expected RETURN AFTER",
            )
            .bind(("row", ArtifactRow::from(&artifact)))
            .bind(("aid", aid.clone()))
            .bind(("expected", expected_status.as_str().to_string()))
            .await?;
        let rows: Vec<ArtifactRow> = res.take(0)?;
        match rows.into_iter().next() {
            Some(row) => row.into_record(),
            None => Err(self.stale_write(&aid, expected_status).await),
        }
    }

    async fn commit_revision(
        &self,
        mut artifact: ArtifactRecord,
        expected_status: ArtifactStatus,
        version: ArtifactVersionRecord,
    ) -> StorageResult<ArtifactRecord> {
        artifact.updated_at = chrono::Utc::now();
        let aid = artifact.artifact_id.clone();
        let sql = format!(
            "BEGIN TRANSACTION; \
             LET $current = (SELECT VALUE status FROM artifacts WHERE artifact_id = $aid); \
             IF array::first($current) != $expected {{ THROW \"{STALE_MARKER}\"; }}; \
             CREATE artifact_versions CONTENT $version; \
             UPDATE artifacts CONTENT $row WHERE artifact_id = $aid; \
             COMMIT TRANSACTION;"
        );
        let checked = self
            .db
            .query(sql)
            .bind(("aid", aid.clone()))
            .bind(("expected", expected_status.as_str().to_string()))
            .bind(("version", ArtifactVersionRow::from(&version)))
            .bind(("row", ArtifactRow::from(&artifact)))
            .await?
            .check();

        match checked {
            Ok(_) => {
                debug!(artifact_id = %aid, version = version.version, "revision committed");
                Ok(artifact)
            }
            Err(e) => {
                // A failed transaction reports a generic error for every
                // statement, so classify by reading back the current state.
                let current = self.fetch_artifact(&aid).await?;
                if current.status != expected_status.as_str() {
                    return Err(StorageError::StaleWrite {
                        artifact_id: aid,
                        expected: expected_status.to_string(),
                        actual: current.status,
                    });
                }
                if self.version_exists(&aid, version.version).await? {
                    return Err(StorageError::DuplicateVersion {
                        artifact_id: aid,
                        version: version.version,
                    });
                }
                Err(e.into())
            }
        }
    }

    async fn list_versions(&self, artifact_id: &str) -> StorageResult<Vec<ArtifactVersionRecord>> {
        self.fetch_artifact(artifact_id).await?;
        let mut res = self
            .db
            .query("SELECT * FROM artifact_versions WHERE artifact_id = $aid ORDER BY version ASC")
            .bind(("aid", artifact_id.to_string()))
            .await?;
        let rows: Vec<ArtifactVersionRow> = res.take(0)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn append_review(&self, review: ArtifactReviewRecord) -> StorageResult<()> {
        self.fetch_artifact(&review.artifact_id).await?;
        let _created: Option<ArtifactReviewRow> = self
            .db
            .create("artifact_reviews")
            .content(ArtifactReviewRow::from(&review))
            .await?;
        Ok(())
    }

    async fn list_reviews(&self, artifact_id: &str) -> StorageResult<Vec<ArtifactReviewRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM artifact_reviews WHERE artifact_id = $aid ORDER BY created_at ASC")
            .bind(("aid", artifact_id.to_string()))
            .await?;
        let rows: Vec<ArtifactReviewRow> = res.take(0)?;
        rows.into_iter().map(ArtifactReviewRow::into_record).collect()
    }
}
