//! Error types for strata-state

use thiserror::Error;

/// Errors that can occur while connecting to or initialising the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage traits.
///
/// `SequenceConflict` and `Unavailable` are transient; callers retry them
/// with bounded backoff. Everything else is a semantic error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("artifact not found: {artifact_id}")]
    ArtifactNotFound { artifact_id: String },

    #[error("ledger entry not found: session {session_id} seq {sequence_num}")]
    EntryNotFound {
        session_id: String,
        sequence_num: u64,
    },

    #[error("invalid ledger entry: {reason}")]
    InvalidEntry { reason: String },

    #[error("sequence conflict in session {session_id} at seq {sequence_num}")]
    SequenceConflict {
        session_id: String,
        sequence_num: u64,
    },

    #[error("entry {session_id}#{sequence_num} already promoted as {existing}")]
    AlreadyPromoted {
        session_id: String,
        sequence_num: u64,
        existing: String,
    },

    #[error("stale write on {artifact_id}: expected status {expected}, found {actual}")]
    StaleWrite {
        artifact_id: String,
        expected: String,
        actual: String,
    },

    #[error("artifact {artifact_id} already has version {version}")]
    DuplicateVersion { artifact_id: String, version: u32 },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether the operation may succeed if retried unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::SequenceConflict { .. } | StorageError::Unavailable(_)
        )
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(format!("serialization: {err}"))
    }
}
