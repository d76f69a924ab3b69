//! Long-term memory gateway.
//!
//! A narrow `store` / `retrieve` boundary to a cross-session memory service.
//! Records are partitioned into namespaces per owner and per concern.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpMemoryGateway;
pub use memory::InMemoryGateway;

/// Namespace partition inside the memory service, e.g. `project_facts/alice`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(concern: &str, owner_id: &str) -> Self {
        Self(format!("{concern}/{owner_id}"))
    }

    /// Durable facts promoted from session ledgers.
    pub fn project_facts(owner_id: &str) -> Self {
        Self::new("project_facts", owner_id)
    }

    /// Owner preferences written by other systems.
    pub fn preferences(owner_id: &str) -> Self {
        Self::new("preferences", owner_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One record submitted to long-term memory. `key` is the idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub key: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl MemoryRecord {
    pub fn new(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Per-record result of a `store` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StoreOutcome {
    Stored {
        key: String,
        external_id: String,
    },
    Failed {
        key: String,
        code: String,
        message: String,
    },
}

impl StoreOutcome {
    pub fn key(&self) -> &str {
        match self {
            StoreOutcome::Stored { key, .. } | StoreOutcome::Failed { key, .. } => key,
        }
    }
}

/// A retrieved record with its relevance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    pub external_id: String,
    pub relevance_score: f64,
}

/// Whole-call gateway failures. Per-record failures are [`StoreOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("memory service unavailable: {0}")]
    Unavailable(String),

    #[error("memory service call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("memory service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("could not decode memory service response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Short machine-readable code recorded against failed promotions.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unavailable(_) => "unavailable",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Http { .. } => "http_error",
            GatewayError::Decode(_) => "decode_error",
        }
    }
}

/// Client boundary to the long-term memory service.
#[async_trait]
pub trait MemoryGateway: Send + Sync {
    /// Store records; returns one outcome per submitted record.
    async fn store(
        &self,
        namespace: &Namespace,
        records: &[MemoryRecord],
    ) -> Result<Vec<StoreOutcome>, GatewayError>;

    /// Return up to `top_k` records ranked by relevance, best first.
    async fn retrieve(
        &self,
        namespace: &Namespace,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_partition_by_owner_and_concern() {
        assert_eq!(Namespace::project_facts("alice").as_str(), "project_facts/alice");
        assert_eq!(Namespace::preferences("alice").to_string(), "preferences/alice");
        assert_ne!(Namespace::project_facts("alice"), Namespace::project_facts("bob"));
    }

    #[test]
    fn store_outcome_serializes_tagged() {
        let ok = StoreOutcome::Stored {
            key: "k1".into(),
            external_id: "ext-1".into(),
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["outcome"], "stored");
        assert_eq!(json["external_id"], "ext-1");

        let failed: StoreOutcome = serde_json::from_value(serde_json::json!({
            "outcome": "failed",
            "key": "k2",
            "code": "rejected",
            "message": "too long",
        }))
        .unwrap();
        assert_eq!(failed.key(), "k2");
    }
}
