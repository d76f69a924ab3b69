//! Strata-State: SurrealDB Backend for Strata
//!
//! This crate provides the persistence layer for Strata's tiered context
//! memory. It handles all I/O with SurrealDB and exposes backend-agnostic
//! storage traits with in-memory fakes for tests.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Append-only ordering, compare-and-set status updates, and
//! write-once history rows.
//!
//! ## Key Components
//!
//! - `SurrealHandle`: Resolves and initializes the database connection
//! - `LedgerStore`: Gap-free, append-only session ledger
//! - `SnapshotStore`: Latest working-context snapshot per session
//! - `ArtifactStore`: Artifacts, immutable versions, and reviews

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_artifacts;
pub mod surreal_ledger;

pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, ConnectTarget, Credentials, SurrealHandle};
pub use storage_traits::{
    AppendReceipt, ArtifactRecord, ArtifactReviewRecord, ArtifactStatus, ArtifactStore,
    ArtifactVersionRecord, ContentDigest, DecisionOptions, EntryRefs, EntryType, InlineComment,
    LedgerEntry, LedgerFilter, LedgerStore, NewLedgerEntry, PublishTarget, ReviewAction,
    SessionId, SessionRecord, SessionStatus, SessionStore, SnapshotRecord, SnapshotStore,
    StorageResult,
};
pub use surreal_artifacts::SurrealArtifactStore;
pub use surreal_ledger::SurrealLedgerStore;

/// Result type for strata-state connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
