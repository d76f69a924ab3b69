//! Schema definitions for Strata SurrealDB tables
//!
//! Tables:
//! - sessions: Session ownership and lifecycle status
//! - ledger_entries: Append-only structural events per session
//! - snapshots: Latest working-context snapshot per session
//! - artifacts / artifact_versions / artifact_reviews: Gated documents
//!
//! Row types here are the on-disk shape. Enums are stored as their string
//! forms; conversion to `storage_traits` types happens at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    ArtifactRecord, ArtifactReviewRecord, ArtifactStatus, ArtifactVersionRecord, ContentDigest,
    DecisionOptions, EntryRefs, EntryType, InlineComment, LedgerEntry, PublishTarget,
    ReviewAction, SessionId, SessionRecord, SessionStatus, SnapshotRecord, StorageResult,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

fn unknown(kind: &str, value: &str) -> StorageError {
    StorageError::Backend(format!("unknown {kind}: {value}"))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Session row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub session_id: String,
    pub owner_id: String,
    /// "active" | "paused" | "completed" | "abandoned"
    pub status: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl SessionRow {
    /// New active session row for `owner_id`
    pub fn new(owner_id: &str) -> Self {
        let now = Utc::now();
        SessionRow {
            id: None,
            session_id: SessionId::new().0,
            owner_id: owner_id.to_string(),
            status: SessionStatus::Active.as_str().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn into_record(self) -> StorageResult<SessionRecord> {
        let status =
            SessionStatus::parse(&self.status).ok_or_else(|| unknown("session status", &self.status))?;
        Ok(SessionRecord {
            session_id: SessionId(self.session_id),
            owner_id: self.owner_id,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Ledger entries
// ---------------------------------------------------------------------------

/// Ledger entry row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntryRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub entry_id: String,
    pub session_id: String,
    /// Gap-free sequence within session (1-indexed)
    pub sequence_num: u64,
    /// Kebab-case entry type, e.g. "research-finding"
    pub entry_type: String,
    pub scope: String,
    pub summary: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub options: Option<DecisionOptions>,
    #[serde(default)]
    pub refs: EntryRefs,
    pub source: String,
    pub turn: u64,
    #[serde(default)]
    pub detail: serde_json::Value,
    pub promoted: bool,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl From<&LedgerEntry> for LedgerEntryRow {
    fn from(e: &LedgerEntry) -> Self {
        LedgerEntryRow {
            id: None,
            entry_id: e.entry_id.clone(),
            session_id: e.session_id.0.clone(),
            sequence_num: e.sequence_num,
            entry_type: e.entry_type.as_str().to_string(),
            scope: e.scope.clone(),
            summary: e.summary.clone(),
            reasoning: e.reasoning.clone(),
            options: e.options.clone(),
            refs: e.refs.clone(),
            source: e.source.clone(),
            turn: e.turn,
            detail: e.detail.clone(),
            promoted: e.promoted,
            external_id: e.external_id.clone(),
            timestamp: e.timestamp,
        }
    }
}

impl LedgerEntryRow {
    pub fn into_entry(self) -> StorageResult<LedgerEntry> {
        let entry_type = EntryType::parse(&self.entry_type)
            .ok_or_else(|| unknown("entry type", &self.entry_type))?;
        Ok(LedgerEntry {
            entry_id: self.entry_id,
            session_id: SessionId(self.session_id),
            sequence_num: self.sequence_num,
            timestamp: self.timestamp,
            entry_type,
            scope: self.scope,
            summary: self.summary,
            reasoning: self.reasoning,
            options: self.options,
            refs: self.refs,
            source: self.source,
            turn: self.turn,
            detail: self.detail,
            promoted: self.promoted,
            external_id: self.external_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Snapshot row (one per session)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub session_id: String,
    pub state: serde_json::Value,
    pub last_sequence: u64,
    /// SHA-256 of the serialized state
    pub digest: String,
    pub size_bytes: u64,
    #[serde(with = "surreal_datetime")]
    pub saved_at: DateTime<Utc>,
}

impl From<&SnapshotRecord> for SnapshotRow {
    fn from(s: &SnapshotRecord) -> Self {
        SnapshotRow {
            id: None,
            session_id: s.session_id.0.clone(),
            state: s.state.clone(),
            last_sequence: s.last_sequence,
            digest: s.digest.as_str().to_string(),
            size_bytes: s.size_bytes,
            saved_at: s.saved_at,
        }
    }
}

impl SnapshotRow {
    pub fn into_record(self) -> StorageResult<SnapshotRecord> {
        Ok(SnapshotRecord {
            session_id: SessionId(self.session_id),
            state: self.state,
            last_sequence: self.last_sequence,
            digest: ContentDigest::try_from(self.digest)?,
            size_bytes: self.size_bytes,
            saved_at: self.saved_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Artifact row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub artifact_id: String,
    pub session_id: String,
    pub artifact_type: String,
    pub publish_target: String,
    pub title: String,
    pub content: String,
    pub version: u32,
    pub status: String,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<&ArtifactRecord> for ArtifactRow {
    fn from(a: &ArtifactRecord) -> Self {
        ArtifactRow {
            id: None,
            artifact_id: a.artifact_id.clone(),
            session_id: a.session_id.0.clone(),
            artifact_type: a.artifact_type.clone(),
            publish_target: a.publish_target.as_str().to_string(),
            title: a.title.clone(),
            content: a.content.clone(),
            version: a.version,
            status: a.status.as_str().to_string(),
            last_error: a.last_error.clone(),
            external_url: a.external_url.clone(),
            external_id: a.external_id.clone(),
            published_at: a.published_at,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

impl ArtifactRow {
    pub fn into_record(self) -> StorageResult<ArtifactRecord> {
        let status = ArtifactStatus::parse(&self.status)
            .ok_or_else(|| unknown("artifact status", &self.status))?;
        let publish_target = PublishTarget::parse(&self.publish_target)
            .ok_or_else(|| unknown("publish target", &self.publish_target))?;
        Ok(ArtifactRecord {
            artifact_id: self.artifact_id,
            session_id: SessionId(self.session_id),
            artifact_type: self.artifact_type,
            publish_target,
            title: self.title,
            content: self.content,
            version: self.version,
            status,
            last_error: self.last_error,
            external_url: self.external_url,
            external_id: self.external_id,
            published_at: self.published_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Artifact version row (write-once)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactVersionRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub artifact_id: String,
    pub version: u32,
    pub content: String,
    pub change_summary: String,
    pub author: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<&ArtifactVersionRecord> for ArtifactVersionRow {
    fn from(v: &ArtifactVersionRecord) -> Self {
        ArtifactVersionRow {
            id: None,
            artifact_id: v.artifact_id.clone(),
            version: v.version,
            content: v.content.clone(),
            change_summary: v.change_summary.clone(),
            author: v.author.clone(),
            created_at: v.created_at,
        }
    }
}

impl From<ArtifactVersionRow> for ArtifactVersionRecord {
    fn from(row: ArtifactVersionRow) -> Self {
        ArtifactVersionRecord {
            artifact_id: row.artifact_id,
            version: row.version,
            content: row.content,
            change_summary: row.change_summary,
            author: row.author,
            created_at: row.created_at,
        }
    }
}

/// Artifact review row (write-once)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReviewRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub review_id: String,
    pub artifact_id: String,
    pub version_reviewed: u32,
    pub action: String,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub inline_comments: Vec<InlineComment>,
    pub reviewer: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<&ArtifactReviewRecord> for ArtifactReviewRow {
    fn from(r: &ArtifactReviewRecord) -> Self {
        ArtifactReviewRow {
            id: None,
            review_id: r.review_id.clone(),
            artifact_id: r.artifact_id.clone(),
            version_reviewed: r.version_reviewed,
            action: r.action.as_str().to_string(),
            feedback: r.feedback.clone(),
            inline_comments: r.inline_comments.clone(),
            reviewer: r.reviewer.clone(),
            created_at: r.created_at,
        }
    }
}

impl ArtifactReviewRow {
    pub fn into_record(self) -> StorageResult<ArtifactReviewRecord> {
        let action =
            ReviewAction::parse(&self.action).ok_or_else(|| unknown("review action", &self.action))?;
        Ok(ArtifactReviewRecord {
            review_id: self.review_id,
            artifact_id: self.artifact_id,
            version_reviewed: self.version_reviewed,
            action,
            feedback: self.feedback,
            inline_comments: self.inline_comments,
            reviewer: self.reviewer,
            created_at: self.created_at,
        })
    }
}
