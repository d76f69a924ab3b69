//! Strata Core Library
//!
//! Tiered context memory for long-running orchestration agents:
//!
//! - a per-session ledger of structural events (see `strata-state`)
//! - a compressed working context rebuilt from snapshot plus ledger tail
//! - promotion of durable facts to a long-term memory service
//! - versioned artifacts behind a human-gated publish lifecycle
//!
//! [`SessionCoordinator`] ties the pieces together.

pub mod artifact;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod obs;
pub mod promotion;
pub mod retry;
pub mod snapshot;
pub mod telemetry;
pub mod working_context;

pub use artifact::{
    Actor, ArtifactManager, CollaboratorError, ContentReviser, LifecycleAction, PublishReceipt,
    Publisher, ReviewSubmission, Revision, RevisionFeedback, Unconfigured,
};
pub use config::{GatewayConfig, PromotionPolicy, StrataConfig};
pub use coordinator::{
    SessionCoordinator, SessionEnded, SessionOutcome, Stores, StructuralEvent, TurnOutcome,
};
pub use error::{Result, StrataError};
pub use gateway::{
    GatewayError, HttpMemoryGateway, InMemoryGateway, MemoryGateway, MemoryRecord, Namespace,
    ScoredRecord, StoreOutcome,
};
pub use promotion::{PromotionEngine, PromotionFailure, PromotionReport};
pub use retry::RetryPolicy;
pub use snapshot::{Restored, SnapshotManager};
pub use telemetry::init_tracing;
pub use working_context::{
    ArtifactRef, ContextItem, InjectionDetail, OpenQuestion, PlanStep, PlanUpdateDetail,
    StepStatus, WorkingContext,
};

pub use strata_state::{
    ArtifactRecord, ArtifactReviewRecord, ArtifactStatus, ArtifactVersionRecord, EntryType,
    InlineComment, LedgerEntry, LedgerFilter, NewLedgerEntry, PublishTarget, ReviewAction,
    SessionId, SessionStatus, SurrealHandle,
};
