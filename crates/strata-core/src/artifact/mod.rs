//! Versioned artifacts with an approval-gated publish lifecycle.

pub mod lifecycle;
pub mod manager;

pub use lifecycle::{allowed_actions, allowed_next, next_status, transition, Actor, LifecycleAction};
pub use manager::{
    ArtifactManager, CollaboratorError, ContentReviser, PublishReceipt, Publisher,
    ReviewSubmission, Revision, RevisionFeedback, Unconfigured,
};
