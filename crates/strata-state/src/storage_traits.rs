//! Records and storage seams for Strata.
//!
//! - `SessionStore`: Session rows (owner, lifecycle status)
//! - `LedgerStore`: Append-only per-session event ledger
//! - `SnapshotStore`: Last serialized working context per session
//! - `ArtifactStore`: Versioned artifacts, immutable versions and reviews
//!
//! Each trait has a SurrealDB implementation and an in-memory fake in
//! [`crate::fakes`]; the coordinator only sees the traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Lowercase SHA-256 hex of a snapshot's serialized state.
///
/// Only constructible by hashing or by validating a stored string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Digest of the canonical JSON encoding of `value`.
    pub fn from_json(value: &serde_json::Value) -> StorageResult<Self> {
        Ok(Self::from_bytes(&serde_json::to_vec(value)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for logs.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::Backend(format!("invalid digest: {s}")));
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Unique identifier for a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random SessionId
    pub fn new() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        SessionId(s)
    }
}

/// Status of a session. Sessions are never deleted; they end in
/// `Completed` or `Abandoned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    /// Whether the session has ended and accepts no further turns.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub owner_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session persistence.
///
/// Guarantees:
/// - Sessions are never physically deleted.
/// - Closed sessions (`Completed`, `Abandoned`) cannot be reopened.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new active session owned by `owner_id`.
    async fn create_session(&self, owner_id: &str) -> StorageResult<SessionRecord>;

    /// Retrieve a session by ID.
    async fn get_session(&self, session_id: &SessionId) -> StorageResult<SessionRecord>;

    /// Update the status of a session, returning the updated record.
    async fn update_session_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> StorageResult<SessionRecord>;

    /// List sessions, optionally filtered by owner (newest first).
    async fn list_sessions(&self, owner_id: Option<&str>) -> StorageResult<Vec<SessionRecord>>;
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// Kind of structural event recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    Decision,
    Constraint,
    ArtifactCreated,
    ArtifactUpdated,
    ResearchFinding,
    ChildAgentResult,
    PlanCreated,
    PlanUpdated,
    UserClarification,
    ContextInjection,
    Checkpoint,
}

impl EntryType {
    pub const ALL: [EntryType; 11] = [
        EntryType::Decision,
        EntryType::Constraint,
        EntryType::ArtifactCreated,
        EntryType::ArtifactUpdated,
        EntryType::ResearchFinding,
        EntryType::ChildAgentResult,
        EntryType::PlanCreated,
        EntryType::PlanUpdated,
        EntryType::UserClarification,
        EntryType::ContextInjection,
        EntryType::Checkpoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Constraint => "constraint",
            Self::ArtifactCreated => "artifact-created",
            Self::ArtifactUpdated => "artifact-updated",
            Self::ResearchFinding => "research-finding",
            Self::ChildAgentResult => "child-agent-result",
            Self::PlanCreated => "plan-created",
            Self::PlanUpdated => "plan-updated",
            Self::UserClarification => "user-clarification",
            Self::ContextInjection => "context-injection",
            Self::Checkpoint => "checkpoint",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alternatives considered for a decision and which one was chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOptions {
    pub considered: Vec<String>,
    pub chosen: Option<String>,
}

/// Cross references carried by a ledger entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRefs {
    #[serde(default)]
    pub artifact_ids: Vec<String>,
    #[serde(default)]
    pub issue_keys: Vec<String>,
    #[serde(default)]
    pub entry_ids: Vec<String>,
}

impl EntryRefs {
    pub fn is_empty(&self) -> bool {
        self.artifact_ids.is_empty() && self.issue_keys.is_empty() && self.entry_ids.is_empty()
    }

    pub fn artifact(artifact_id: impl Into<String>) -> Self {
        Self {
            artifact_ids: vec![artifact_id.into()],
            ..Default::default()
        }
    }
}

/// An entry as submitted by a writer, before a sequence number is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    /// Minted once per entry. Re-submitting the same entry (a retried
    /// append whose first attempt committed) returns the original receipt.
    #[serde(default = "new_entry_id")]
    pub entry_id: String,
    pub entry_type: EntryType,
    pub scope: String,
    pub summary: String,
    pub reasoning: Option<String>,
    pub options: Option<DecisionOptions>,
    #[serde(default)]
    pub refs: EntryRefs,
    /// Who wrote the entry (orchestrator, child agent name, user).
    pub source: String,
    /// Turn number that produced the entry.
    pub turn: u64,
    /// Structured payload read by the working-context update rules.
    #[serde(default)]
    pub detail: serde_json::Value,
}

fn new_entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl NewLedgerEntry {
    pub fn new(
        entry_type: EntryType,
        scope: impl Into<String>,
        summary: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: new_entry_id(),
            entry_type,
            scope: scope.into(),
            summary: summary.into(),
            reasoning: None,
            options: None,
            refs: EntryRefs::default(),
            source: source.into(),
            turn: 0,
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_options(mut self, options: DecisionOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_refs(mut self, refs: EntryRefs) -> Self {
        self.refs = refs;
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn at_turn(mut self, turn: u64) -> Self {
        self.turn = turn;
        self
    }

    /// Reject entries with missing required fields.
    pub fn validate(&self) -> StorageResult<()> {
        let missing = if self.scope.trim().is_empty() {
            Some("scope")
        } else if self.summary.trim().is_empty() {
            Some("summary")
        } else if self.source.trim().is_empty() {
            Some("source")
        } else {
            None
        };
        if let Some(field) = missing {
            return Err(StorageError::InvalidEntry {
                reason: format!("{} entry missing required field: {field}", self.entry_type),
            });
        }
        if let Some(reasoning) = &self.reasoning {
            if reasoning.trim().is_empty() {
                return Err(StorageError::InvalidEntry {
                    reason: "reasoning must be omitted rather than empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Materialize the stored entry once the ledger assigned a sequence number.
    pub fn into_entry(self, session_id: &SessionId, sequence_num: u64) -> LedgerEntry {
        LedgerEntry {
            entry_id: self.entry_id,
            session_id: session_id.clone(),
            sequence_num,
            timestamp: Utc::now(),
            entry_type: self.entry_type,
            scope: self.scope,
            summary: self.summary,
            reasoning: self.reasoning,
            options: self.options,
            refs: self.refs,
            source: self.source,
            turn: self.turn,
            detail: self.detail,
            promoted: false,
            external_id: None,
        }
    }
}

/// A single immutable entry in a session ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub session_id: SessionId,
    /// Gap-free, strictly increasing per session, starting at 1
    pub sequence_num: u64,
    pub timestamp: DateTime<Utc>,
    pub entry_type: EntryType,
    pub scope: String,
    pub summary: String,
    pub reasoning: Option<String>,
    pub options: Option<DecisionOptions>,
    pub refs: EntryRefs,
    pub source: String,
    pub turn: u64,
    pub detail: serde_json::Value,
    pub promoted: bool,
    pub external_id: Option<String>,
}

/// Returned by a successful append
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    pub entry_id: String,
    pub sequence_num: u64,
}

/// Filters for `LedgerStore::query`. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub entry_types: Option<Vec<EntryType>>,
    pub scopes: Option<Vec<String>>,
    /// Exclusive lower bound on `sequence_num`
    pub since_sequence: Option<u64>,
    pub promoted: Option<bool>,
}

impl LedgerFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = EntryType>) -> Self {
        self.entry_types = Some(types.into_iter().collect());
        self
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn since(mut self, sequence_num: u64) -> Self {
        self.since_sequence = Some(sequence_num);
        self
    }

    pub fn unpromoted(mut self) -> Self {
        self.promoted = Some(false);
        self
    }

    /// Whether `entry` passes every configured filter.
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.entry_types
            .as_ref()
            .map_or(true, |types| types.contains(&entry.entry_type))
            && self
                .scopes
                .as_ref()
                .map_or(true, |scopes| scopes.iter().any(|s| s == &entry.scope))
            && self
                .since_sequence
                .map_or(true, |since| entry.sequence_num > since)
            && self.promoted.map_or(true, |p| entry.promoted == p)
    }
}

/// Append-only session ledger.
///
/// Guarantees:
/// - Sequence numbers are assigned by the store, start at 1, and are
///   gap-free and strictly increasing per session.
/// - Entries are immutable once written; only the promotion marker changes.
/// - `query` results are ordered by `sequence_num` ascending.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Validate and append an entry, assigning the next sequence number.
    async fn append(
        &self,
        session_id: &SessionId,
        entry: NewLedgerEntry,
    ) -> StorageResult<AppendReceipt>;

    /// Entries matching `filter`, ascending by sequence, at most `limit`.
    async fn query(
        &self,
        session_id: &SessionId,
        filter: &LedgerFilter,
        limit: Option<usize>,
    ) -> StorageResult<Vec<LedgerEntry>>;

    /// Fetch one entry by sequence number.
    async fn get_entry(&self, session_id: &SessionId, sequence_num: u64)
        -> StorageResult<LedgerEntry>;

    /// Mark an entry promoted with its external record id.
    ///
    /// Idempotent when the entry is already promoted with the same id.
    async fn mark_promoted(
        &self,
        session_id: &SessionId,
        sequence_num: u64,
        external_id: &str,
    ) -> StorageResult<()>;

    /// Highest sequence number written for the session (0 when empty).
    async fn last_sequence(&self, session_id: &SessionId) -> StorageResult<u64>;
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Persisted working-context snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub session_id: SessionId,
    /// Serialized working context (JSON)
    pub state: serde_json::Value,
    /// Last ledger sequence folded into `state`
    pub last_sequence: u64,
    pub digest: ContentDigest,
    pub size_bytes: u64,
    pub saved_at: DateTime<Utc>,
}

impl SnapshotRecord {
    pub fn new(
        session_id: SessionId,
        state: serde_json::Value,
        last_sequence: u64,
    ) -> StorageResult<Self> {
        let bytes = serde_json::to_vec(&state)?;
        Ok(Self {
            session_id,
            digest: ContentDigest::from_bytes(&bytes),
            size_bytes: bytes.len() as u64,
            state,
            last_sequence,
            saved_at: Utc::now(),
        })
    }

    /// Whether `state` still hashes to the recorded digest.
    pub fn verify(&self) -> bool {
        ContentDigest::from_json(&self.state)
            .map(|d| d == self.digest)
            .unwrap_or(false)
    }
}

/// Snapshot persistence. Holds only the latest snapshot per session.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Save (replace) the snapshot for `record.session_id`.
    async fn save_snapshot(&self, record: SnapshotRecord) -> StorageResult<()>;

    /// Load the last snapshot, if any.
    async fn load_snapshot(&self, session_id: &SessionId) -> StorageResult<Option<SnapshotRecord>>;
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

/// Lifecycle status of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Draft,
    Review,
    RevisionRequested,
    Revising,
    Approved,
    Publishing,
    Published,
    PublishFailed,
    Rejected,
}

impl ArtifactStatus {
    pub const ALL: [ArtifactStatus; 9] = [
        ArtifactStatus::Draft,
        ArtifactStatus::Review,
        ArtifactStatus::RevisionRequested,
        ArtifactStatus::Revising,
        ArtifactStatus::Approved,
        ArtifactStatus::Publishing,
        ArtifactStatus::Published,
        ArtifactStatus::PublishFailed,
        ArtifactStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Review => "review",
            Self::RevisionRequested => "revision_requested",
            Self::Revising => "revising",
            Self::Approved => "approved",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::PublishFailed => "publish_failed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|st| st.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Rejected)
    }
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an artifact is published once approved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishTarget {
    DocumentRepository,
    IssueTracker,
    None,
}

impl PublishTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentRepository => "document-repository",
            Self::IssueTracker => "issue-tracker",
            Self::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document-repository" => Some(Self::DocumentRepository),
            "issue-tracker" => Some(Self::IssueTracker),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl std::fmt::Display for PublishTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable artifact row (status, content and version change in place)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub artifact_id: String,
    pub session_id: SessionId,
    pub artifact_type: String,
    pub publish_target: PublishTarget,
    pub title: String,
    pub content: String,
    pub version: u32,
    pub status: ArtifactStatus,
    /// Reason of the most recent failed publish or revision dispatch
    pub last_error: Option<String>,
    pub external_url: Option<String>,
    pub external_id: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// A fresh `Draft` artifact at version 1.
    pub fn draft(
        session_id: SessionId,
        artifact_type: impl Into<String>,
        publish_target: PublishTarget,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            artifact_id: uuid::Uuid::new_v4().to_string(),
            session_id,
            artifact_type: artifact_type.into(),
            publish_target,
            title: title.into(),
            content: content.into(),
            version: 1,
            status: ArtifactStatus::Draft,
            last_error: None,
            external_url: None,
            external_id: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable snapshot of an artifact's content at a version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactVersionRecord {
    pub artifact_id: String,
    pub version: u32,
    pub content: String,
    pub change_summary: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

impl ArtifactVersionRecord {
    pub fn new(
        artifact_id: impl Into<String>,
        version: u32,
        content: impl Into<String>,
        change_summary: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            version,
            content: content.into(),
            change_summary: change_summary.into(),
            author: author.into(),
            created_at: Utc::now(),
        }
    }
}

/// Human decision recorded against an artifact version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    RequestRevision,
    Publish,
    Reject,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::RequestRevision => "request_revision",
            Self::Publish => "publish",
            Self::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "request_revision" => Some(Self::RequestRevision),
            "publish" => Some(Self::Publish),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer comment anchored to a location in the artifact content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineComment {
    pub anchor: String,
    pub comment: String,
}

/// Write-once review row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactReviewRecord {
    pub review_id: String,
    pub artifact_id: String,
    pub version_reviewed: u32,
    pub action: ReviewAction,
    pub feedback: Option<String>,
    pub inline_comments: Vec<InlineComment>,
    pub reviewer: String,
    pub created_at: DateTime<Utc>,
}

impl ArtifactReviewRecord {
    pub fn new(
        artifact_id: impl Into<String>,
        version_reviewed: u32,
        action: ReviewAction,
        reviewer: impl Into<String>,
    ) -> Self {
        Self {
            review_id: uuid::Uuid::new_v4().to_string(),
            artifact_id: artifact_id.into(),
            version_reviewed,
            action,
            feedback: None,
            inline_comments: Vec::new(),
            reviewer: reviewer.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_feedback(mut self, feedback: Option<String>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_comments(mut self, comments: Vec<InlineComment>) -> Self {
        self.inline_comments = comments;
        self
    }
}

/// Artifact persistence.
///
/// Semantics:
/// - `update_artifact` is a compare-and-set on `status`: it fails with
///   `StaleWrite` when the stored status differs from `expected_status`.
/// - Version and review rows are write-once; `(artifact_id, version)` is unique.
/// - `insert_artifact` and `commit_revision` write the artifact row and its
///   version row atomically.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Insert a new artifact together with its initial version row.
    async fn insert_artifact(
        &self,
        artifact: ArtifactRecord,
        initial: ArtifactVersionRecord,
    ) -> StorageResult<ArtifactRecord>;

    /// Retrieve an artifact by ID.
    async fn get_artifact(&self, artifact_id: &str) -> StorageResult<ArtifactRecord>;

    /// All artifacts of a session, oldest first.
    async fn list_artifacts(&self, session_id: &SessionId) -> StorageResult<Vec<ArtifactRecord>>;

    /// Replace the artifact row if its stored status equals `expected_status`.
    async fn update_artifact(
        &self,
        artifact: ArtifactRecord,
        expected_status: ArtifactStatus,
    ) -> StorageResult<ArtifactRecord>;

    /// Compare-and-set the artifact row and append `version` in one step.
    async fn commit_revision(
        &self,
        artifact: ArtifactRecord,
        expected_status: ArtifactStatus,
        version: ArtifactVersionRecord,
    ) -> StorageResult<ArtifactRecord>;

    /// Full version history, ascending by version.
    async fn list_versions(&self, artifact_id: &str) -> StorageResult<Vec<ArtifactVersionRecord>>;

    /// Append a review row.
    async fn append_review(&self, review: ArtifactReviewRecord) -> StorageResult<()>;

    /// All reviews for an artifact, oldest first.
    async fn list_reviews(&self, artifact_id: &str) -> StorageResult<Vec<ArtifactReviewRecord>>;
}
