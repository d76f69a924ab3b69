//! Artifact lifecycle state machine.
//!
//! A single (status, action) table decides every transition. Pairs missing
//! from the table are rejected, and human-gated actions refuse non-human
//! actors.

use serde::{Deserialize, Serialize};
use strata_state::ArtifactStatus;

use crate::error::{Result, StrataError};

/// Something that moves an artifact from one status to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Content generation finished.
    SubmitForReview,
    Approve,
    RequestRevision,
    Reject,
    /// Revision handed to a reviser.
    DispatchRevision,
    /// Reviser returned new content.
    CompleteRevision,
    /// Reviser failed, timed out or was cancelled.
    RevisionFailed,
    Publish,
    PublishSucceeded,
    /// Publisher failed, timed out or was cancelled.
    PublishFailed,
    RetryPublish,
}

impl LifecycleAction {
    pub const ALL: [LifecycleAction; 11] = [
        LifecycleAction::SubmitForReview,
        LifecycleAction::Approve,
        LifecycleAction::RequestRevision,
        LifecycleAction::Reject,
        LifecycleAction::DispatchRevision,
        LifecycleAction::CompleteRevision,
        LifecycleAction::RevisionFailed,
        LifecycleAction::Publish,
        LifecycleAction::PublishSucceeded,
        LifecycleAction::PublishFailed,
        LifecycleAction::RetryPublish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmitForReview => "submit_for_review",
            Self::Approve => "approve",
            Self::RequestRevision => "request_revision",
            Self::Reject => "reject",
            Self::DispatchRevision => "dispatch_revision",
            Self::CompleteRevision => "complete_revision",
            Self::RevisionFailed => "revision_failed",
            Self::Publish => "publish",
            Self::PublishSucceeded => "publish_succeeded",
            Self::PublishFailed => "publish_failed",
            Self::RetryPublish => "retry_publish",
        }
    }

    /// Whether only a human may trigger this action.
    pub fn requires_human(&self) -> bool {
        matches!(
            self,
            Self::Approve
                | Self::RequestRevision
                | Self::Reject
                | Self::Publish
                | Self::RetryPublish
        )
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is asking for a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Actor {
    Human(String),
    System,
}

impl Actor {
    pub fn human(id: impl Into<String>) -> Self {
        Actor::Human(id.into())
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Actor::Human(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Actor::Human(id) => id,
            Actor::System => "system",
        }
    }
}

/// The transition table. `None` means the pair is not allowed.
pub fn next_status(current: ArtifactStatus, action: LifecycleAction) -> Option<ArtifactStatus> {
    use ArtifactStatus as S;
    use LifecycleAction as A;

    match (current, action) {
        (S::Draft, A::SubmitForReview) => Some(S::Review),
        (S::Review, A::Approve) => Some(S::Approved),
        (S::Review, A::RequestRevision) => Some(S::RevisionRequested),
        (S::Review, A::Reject) => Some(S::Rejected),
        (S::RevisionRequested, A::DispatchRevision) => Some(S::Revising),
        (S::Revising, A::CompleteRevision) => Some(S::Review),
        (S::Revising, A::RevisionFailed) => Some(S::RevisionRequested),
        (S::Approved, A::Publish) => Some(S::Publishing),
        (S::Publishing, A::PublishSucceeded) => Some(S::Published),
        (S::Publishing, A::PublishFailed) => Some(S::PublishFailed),
        (S::PublishFailed, A::RetryPublish) => Some(S::Publishing),
        _ => None,
    }
}

/// Actions accepted from `current`.
pub fn allowed_actions(current: ArtifactStatus) -> Vec<LifecycleAction> {
    LifecycleAction::ALL
        .into_iter()
        .filter(|a| next_status(current, *a).is_some())
        .collect()
}

/// Statuses reachable from `current` in one step.
pub fn allowed_next(current: ArtifactStatus) -> Vec<ArtifactStatus> {
    let mut next: Vec<ArtifactStatus> = LifecycleAction::ALL
        .into_iter()
        .filter_map(|a| next_status(current, a))
        .collect();
    next.dedup();
    next
}

/// Validate a transition and return the target status.
pub fn transition(
    artifact_id: &str,
    current: ArtifactStatus,
    action: LifecycleAction,
    actor: &Actor,
) -> Result<ArtifactStatus> {
    let next = next_status(current, action).ok_or_else(|| StrataError::InvalidTransition {
        artifact_id: artifact_id.to_string(),
        current,
        action,
        allowed: allowed_next(current),
    })?;
    if action.requires_human() && !actor.is_human() {
        return Err(StrataError::HumanGateRequired {
            artifact_id: artifact_id.to_string(),
            action,
        });
    }
    Ok(next)
}
