//! Artifact lifecycle manager.
//!
//! Owns every write to artifacts, their versions and their reviews. Status
//! changes go through the lifecycle table and are persisted as
//! compare-and-set updates, so two reviewers racing on the same version
//! cannot both win. Publish and revision dispatches are bounded by a timeout
//! and can be cancelled; both outcomes land in a failure state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use strata_state::{
    ArtifactRecord, ArtifactReviewRecord, ArtifactStore, ArtifactVersionRecord, InlineComment,
    PublishTarget, ReviewAction, SessionId, StorageError,
};
use tokio::sync::Notify;
use tracing::{debug, instrument};

use super::lifecycle::{allowed_next, transition, Actor, LifecycleAction};
use crate::error::{Result, StrataError};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::{retry_transient, RetryPolicy};

/// Failure reported by a publisher or reviser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Where a published artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub external_id: String,
    pub url: String,
}

/// New content returned by a reviser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub content: String,
    pub change_summary: String,
    pub author: String,
}

/// Reviewer feedback handed to a reviser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionFeedback {
    pub feedback: String,
    pub inline_comments: Vec<InlineComment>,
}

/// Pushes approved artifacts to an outside system.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        artifact: &ArtifactRecord,
        target_config: &serde_json::Value,
    ) -> std::result::Result<PublishReceipt, CollaboratorError>;
}

/// Produces revised content from reviewer feedback.
#[async_trait]
pub trait ContentReviser: Send + Sync {
    async fn revise(
        &self,
        artifact: &ArtifactRecord,
        feedback: &RevisionFeedback,
    ) -> std::result::Result<Revision, CollaboratorError>;
}

/// Collaborator for deployments without a publisher or reviser. Every call
/// fails, so dispatches land in their failure state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl Publisher for Unconfigured {
    async fn publish(
        &self,
        artifact: &ArtifactRecord,
        _target_config: &serde_json::Value,
    ) -> std::result::Result<PublishReceipt, CollaboratorError> {
        Err(CollaboratorError(format!(
            "no publisher configured for target {}",
            artifact.publish_target
        )))
    }
}

#[async_trait]
impl ContentReviser for Unconfigured {
    async fn revise(
        &self,
        _artifact: &ArtifactRecord,
        _feedback: &RevisionFeedback,
    ) -> std::result::Result<Revision, CollaboratorError> {
        Err(CollaboratorError::new("no reviser configured"))
    }
}

/// A human review of one artifact version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub version_reviewed: u32,
    pub action: ReviewAction,
    pub actor: Actor,
    pub feedback: Option<String>,
    #[serde(default)]
    pub inline_comments: Vec<InlineComment>,
    /// Only read for `ReviewAction::Publish`.
    #[serde(default)]
    pub target_config: serde_json::Value,
}

impl ReviewSubmission {
    pub fn new(version_reviewed: u32, action: ReviewAction, actor: Actor) -> Self {
        Self {
            version_reviewed,
            action,
            actor,
            feedback: None,
            inline_comments: Vec::new(),
            target_config: serde_json::Value::Null,
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    pub fn with_comments(mut self, comments: Vec<InlineComment>) -> Self {
        self.inline_comments = comments;
        self
    }
}

#[derive(Debug)]
enum DispatchFailure {
    Failed(CollaboratorError),
    TimedOut(Duration),
    Cancelled,
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchFailure::Failed(e) => write!(f, "{e}"),
            DispatchFailure::TimedOut(d) => write!(f, "timed out after {} ms", d.as_millis()),
            DispatchFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}

pub struct ArtifactManager {
    store: Arc<dyn ArtifactStore>,
    publisher: Arc<dyn Publisher>,
    reviser: Arc<dyn ContentReviser>,
    dispatch_timeout: Duration,
    retry: RetryPolicy,
    in_flight: Mutex<HashMap<String, Arc<Notify>>>,
}

impl ArtifactManager {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        publisher: Arc<dyn Publisher>,
        reviser: Arc<dyn ContentReviser>,
        dispatch_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            publisher,
            reviser,
            dispatch_timeout,
            retry,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    // -- reads ------------------------------------------------------------

    pub async fn get_artifact(&self, artifact_id: &str) -> Result<ArtifactRecord> {
        Ok(retry_transient(&self.retry, "get_artifact", || {
            self.store.get_artifact(artifact_id)
        })
        .await?)
    }

    pub async fn list_artifacts(&self, session_id: &SessionId) -> Result<Vec<ArtifactRecord>> {
        Ok(retry_transient(&self.retry, "list_artifacts", || {
            self.store.list_artifacts(session_id)
        })
        .await?)
    }

    pub async fn get_versions(&self, artifact_id: &str) -> Result<Vec<ArtifactVersionRecord>> {
        Ok(retry_transient(&self.retry, "list_versions", || {
            self.store.list_versions(artifact_id)
        })
        .await?)
    }

    pub async fn get_reviews(&self, artifact_id: &str) -> Result<Vec<ArtifactReviewRecord>> {
        Ok(retry_transient(&self.retry, "list_reviews", || {
            self.store.list_reviews(artifact_id)
        })
        .await?)
    }

    // -- generation -------------------------------------------------------

    /// Create a `draft` artifact with version 1.
    #[instrument(skip(self, content), fields(session_id = %session_id))]
    pub async fn create_artifact(
        &self,
        session_id: &SessionId,
        artifact_type: &str,
        publish_target: PublishTarget,
        title: &str,
        content: &str,
        author: &str,
    ) -> Result<ArtifactRecord> {
        let artifact =
            ArtifactRecord::draft(session_id.clone(), artifact_type, publish_target, title, content);
        let initial = ArtifactVersionRecord::new(
            artifact.artifact_id.clone(),
            1,
            content,
            "initial draft",
            author,
        );
        let created = retry_transient(&self.retry, "insert_artifact", || {
            self.store.insert_artifact(artifact.clone(), initial.clone())
        })
        .await?;
        debug!(artifact_id = %created.artifact_id, "artifact created");
        Ok(created)
    }

    /// Content generation finished: `draft` → `review`.
    pub async fn submit_for_review(&self, artifact_id: &str) -> Result<ArtifactRecord> {
        let current = self.get_artifact(artifact_id).await?;
        self.advance(&current, LifecycleAction::SubmitForReview, &Actor::System, |_| {})
            .await
    }

    // -- human review -----------------------------------------------------

    /// Record a human review of the current version.
    ///
    /// `Publish` reviews start a publish dispatch with the submission's
    /// `target_config`.
    #[instrument(skip(self, submission), fields(action = %submission.action, reviewer = submission.actor.name()))]
    pub async fn submit_review(
        &self,
        artifact_id: &str,
        submission: ReviewSubmission,
    ) -> Result<ArtifactRecord> {
        let current = self.get_artifact(artifact_id).await?;
        let action = match submission.action {
            ReviewAction::Approve => LifecycleAction::Approve,
            ReviewAction::RequestRevision => LifecycleAction::RequestRevision,
            ReviewAction::Reject => LifecycleAction::Reject,
            ReviewAction::Publish => LifecycleAction::Publish,
        };
        transition(artifact_id, current.status, action, &submission.actor)?;

        if submission.version_reviewed != current.version {
            return Err(StrataError::StaleReview {
                artifact_id: artifact_id.to_string(),
                reviewed: submission.version_reviewed,
                current: current.version,
            });
        }
        let feedback = submission
            .feedback
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        if action == LifecycleAction::RequestRevision && feedback.is_none() {
            return Err(StrataError::FeedbackRequired {
                artifact_id: artifact_id.to_string(),
            });
        }

        if action == LifecycleAction::Publish {
            return self
                .publish_from(&current, action, &submission.actor, feedback, &submission.target_config)
                .await;
        }

        let updated = self.advance(&current, action, &submission.actor, |_| {}).await?;
        let review = ArtifactReviewRecord::new(
            artifact_id,
            submission.version_reviewed,
            submission.action,
            submission.actor.name(),
        )
        .with_feedback(feedback)
        .with_comments(submission.inline_comments);
        self.append_review(review).await?;
        Ok(updated)
    }

    /// Human triggers publish of an `approved` artifact.
    pub async fn request_publish(
        &self,
        artifact_id: &str,
        actor: &Actor,
        target_config: &serde_json::Value,
    ) -> Result<ArtifactRecord> {
        let current = self.get_artifact(artifact_id).await?;
        self.publish_from(&current, LifecycleAction::Publish, actor, None, target_config)
            .await
    }

    /// Human retries a `publish_failed` artifact.
    pub async fn retry_publish(
        &self,
        artifact_id: &str,
        actor: &Actor,
        target_config: &serde_json::Value,
    ) -> Result<ArtifactRecord> {
        let current = self.get_artifact(artifact_id).await?;
        self.publish_from(&current, LifecycleAction::RetryPublish, actor, None, target_config)
            .await
    }

    // -- revision ---------------------------------------------------------

    /// Hand the latest revision request to the reviser and wait for new
    /// content, bounded by the dispatch timeout.
    ///
    /// On failure, timeout or cancellation the artifact returns to
    /// `revision_requested` and `RevisionFailure` is returned.
    #[instrument(skip(self))]
    pub async fn dispatch_revision(&self, artifact_id: &str) -> Result<ArtifactRecord> {
        let current = self.get_artifact(artifact_id).await?;
        let revising = self
            .advance(&current, LifecycleAction::DispatchRevision, &Actor::System, |a| {
                a.last_error = None;
            })
            .await?;

        let feedback = self.latest_revision_feedback(artifact_id).await?;
        let outcome = self
            .bounded(artifact_id, self.reviser.revise(&revising, &feedback))
            .await;

        match outcome {
            Ok(revision) => self.complete_revision(artifact_id, revision).await,
            Err(failure) => {
                obs::emit_dispatch_failed(artifact_id, "revision", &failure);
                METRICS.inc_dispatch_failures();
                let reason = failure.to_string();
                self.advance(&revising, LifecycleAction::RevisionFailed, &Actor::System, |a| {
                    a.last_error = Some(reason.clone());
                })
                .await?;
                Err(StrataError::RevisionFailure {
                    artifact_id: artifact_id.to_string(),
                    reason,
                })
            }
        }
    }

    /// Revised content returned: `revising` → `review` with a new version.
    #[instrument(skip(self, revision))]
    pub async fn complete_revision(
        &self,
        artifact_id: &str,
        revision: Revision,
    ) -> Result<ArtifactRecord> {
        let current = self.get_artifact(artifact_id).await?;
        let next = transition(
            artifact_id,
            current.status,
            LifecycleAction::CompleteRevision,
            &Actor::System,
        )?;

        let mut updated = current.clone();
        updated.status = next;
        updated.version = current.version + 1;
        updated.content = revision.content.clone();
        updated.last_error = None;
        updated.updated_at = Utc::now();
        let version = ArtifactVersionRecord::new(
            artifact_id,
            updated.version,
            revision.content,
            revision.change_summary,
            revision.author,
        );

        let result = retry_transient(&self.retry, "commit_revision", || {
            self.store
                .commit_revision(updated.clone(), current.status, version.clone())
        })
        .await;
        match result {
            Ok(saved) => {
                self.record_transition(&current, &saved, &Actor::System);
                Ok(saved)
            }
            Err(StorageError::StaleWrite { .. }) | Err(StorageError::DuplicateVersion { .. }) => {
                Err(self
                    .lost_race(artifact_id, LifecycleAction::CompleteRevision)
                    .await)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel an in-flight publish or revision dispatch. Returns `false` when
    /// nothing was in flight for the artifact.
    pub fn cancel_dispatch(&self, artifact_id: &str) -> bool {
        let in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        match in_flight.get(artifact_id) {
            Some(notify) => {
                notify.notify_one();
                true
            }
            None => false,
        }
    }

    // -- internals --------------------------------------------------------

    async fn publish_from(
        &self,
        current: &ArtifactRecord,
        action: LifecycleAction,
        actor: &Actor,
        feedback: Option<String>,
        target_config: &serde_json::Value,
    ) -> Result<ArtifactRecord> {
        let artifact_id = current.artifact_id.as_str();
        let publishing = self
            .advance(current, action, actor, |a| a.last_error = None)
            .await?;

        let review = ArtifactReviewRecord::new(
            artifact_id,
            publishing.version,
            ReviewAction::Publish,
            actor.name(),
        )
        .with_feedback(feedback);
        if let Err(e) = self.append_review(review).await {
            // Never call the publisher without a publish review on record.
            let reason = format!("could not record publish review: {e}");
            self.advance(&publishing, LifecycleAction::PublishFailed, &Actor::System, |a| {
                a.last_error = Some(reason.clone());
            })
            .await?;
            return Err(StrataError::PublishFailure {
                artifact_id: artifact_id.to_string(),
                reason,
            });
        }

        let outcome = self
            .bounded(artifact_id, self.publisher.publish(&publishing, target_config))
            .await;
        match outcome {
            Ok(receipt) => {
                self.advance(&publishing, LifecycleAction::PublishSucceeded, &Actor::System, |a| {
                    a.external_id = Some(receipt.external_id.clone());
                    a.external_url = Some(receipt.url.clone());
                    a.published_at = Some(Utc::now());
                })
                .await
            }
            Err(failure) => {
                obs::emit_dispatch_failed(artifact_id, "publish", &failure);
                METRICS.inc_dispatch_failures();
                let reason = failure.to_string();
                self.advance(&publishing, LifecycleAction::PublishFailed, &Actor::System, |a| {
                    a.last_error = Some(reason.clone());
                })
                .await?;
                Err(StrataError::PublishFailure {
                    artifact_id: artifact_id.to_string(),
                    reason,
                })
            }
        }
    }

    /// Validate `action`, apply `mutate`, and compare-and-set the row.
    async fn advance(
        &self,
        current: &ArtifactRecord,
        action: LifecycleAction,
        actor: &Actor,
        mutate: impl FnOnce(&mut ArtifactRecord),
    ) -> Result<ArtifactRecord> {
        let next = transition(&current.artifact_id, current.status, action, actor)?;
        let mut updated = current.clone();
        updated.status = next;
        updated.updated_at = Utc::now();
        mutate(&mut updated);

        let result = retry_transient(&self.retry, "update_artifact", || {
            self.store.update_artifact(updated.clone(), current.status)
        })
        .await;
        match result {
            Ok(saved) => {
                self.record_transition(current, &saved, actor);
                Ok(saved)
            }
            Err(StorageError::StaleWrite { .. }) => {
                Err(self.lost_race(&current.artifact_id, action).await)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Someone else moved the artifact first; report against its real state.
    async fn lost_race(&self, artifact_id: &str, action: LifecycleAction) -> StrataError {
        match self.get_artifact(artifact_id).await {
            Ok(latest) => StrataError::InvalidTransition {
                artifact_id: artifact_id.to_string(),
                current: latest.status,
                action,
                allowed: allowed_next(latest.status),
            },
            Err(e) => e,
        }
    }

    fn record_transition(&self, before: &ArtifactRecord, after: &ArtifactRecord, actor: &Actor) {
        METRICS.inc_artifact_transitions();
        obs::emit_artifact_transition(
            &after.artifact_id,
            before.status.as_str(),
            after.status.as_str(),
            actor.name(),
        );
    }

    async fn append_review(&self, review: ArtifactReviewRecord) -> Result<()> {
        Ok(retry_transient(&self.retry, "append_review", || {
            self.store.append_review(review.clone())
        })
        .await?)
    }

    async fn latest_revision_feedback(&self, artifact_id: &str) -> Result<RevisionFeedback> {
        let reviews = self.get_reviews(artifact_id).await?;
        Ok(reviews
            .into_iter()
            .rev()
            .find(|r| r.action == ReviewAction::RequestRevision)
            .map(|r| RevisionFeedback {
                feedback: r.feedback.unwrap_or_default(),
                inline_comments: r.inline_comments,
            })
            .unwrap_or_default())
    }

    /// Run a collaborator call under the dispatch timeout, cancellable via
    /// [`cancel_dispatch`](Self::cancel_dispatch).
    async fn bounded<T>(
        &self,
        artifact_id: &str,
        call: impl Future<Output = std::result::Result<T, CollaboratorError>>,
    ) -> std::result::Result<T, DispatchFailure> {
        let cancel = Arc::new(Notify::new());
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(artifact_id.to_string(), cancel.clone());

        let outcome = tokio::select! {
            res = tokio::time::timeout(self.dispatch_timeout, call) => match res {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(DispatchFailure::Failed(e)),
                Err(_) => Err(DispatchFailure::TimedOut(self.dispatch_timeout)),
            },
            _ = cancel.notified() => Err(DispatchFailure::Cancelled),
        };

        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(artifact_id);
        outcome
    }
}
