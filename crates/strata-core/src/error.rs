//! Domain-level error taxonomy for Strata.

use strata_state::{ArtifactStatus, StorageError};

use crate::artifact::lifecycle::LifecycleAction;
use crate::gateway::GatewayError;

fn join_statuses(statuses: &[ArtifactStatus]) -> String {
    if statuses.is_empty() {
        return "none".to_string();
    }
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Strata domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    #[error("invalid ledger entry: {0}")]
    InvalidEntry(String),

    #[error(
        "invalid transition for artifact {artifact_id}: cannot {action} from {current} (allowed next: {})",
        join_statuses(.allowed)
    )]
    InvalidTransition {
        artifact_id: String,
        current: ArtifactStatus,
        action: LifecycleAction,
        allowed: Vec<ArtifactStatus>,
    },

    #[error("{action} on artifact {artifact_id} requires a human actor")]
    HumanGateRequired {
        artifact_id: String,
        action: LifecycleAction,
    },

    #[error("requesting a revision of artifact {artifact_id} requires feedback")]
    FeedbackRequired { artifact_id: String },

    #[error("review of artifact {artifact_id} targets version {reviewed}, current is {current}")]
    StaleReview {
        artifact_id: String,
        reviewed: u32,
        current: u32,
    },

    #[error("publish of artifact {artifact_id} failed: {reason}")]
    PublishFailure { artifact_id: String, reason: String },

    #[error("revision of artifact {artifact_id} failed: {reason}")]
    RevisionFailure { artifact_id: String, reason: String },

    #[error("no snapshot for session {session_id}")]
    SnapshotMissing { session_id: String },

    #[error("promotion for session {session_id} partially failed: {promoted} promoted, {failed} failed")]
    PromotionPartialFailure {
        session_id: String,
        promoted: usize,
        failed: usize,
    },

    #[error("session {session_id} is busy with another turn")]
    SessionBusy { session_id: String },

    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("session {session_id} is {status}")]
    SessionClosed { session_id: String, status: String },

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for StrataError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidEntry { reason } => StrataError::InvalidEntry(reason),
            StorageError::SessionNotFound { session_id } => {
                StrataError::SessionNotFound { session_id }
            }
            other => StrataError::Storage(other),
        }
    }
}

/// Result type for Strata domain operations.
pub type Result<T> = std::result::Result<T, StrataError>;
