//! In-process memory gateway for tests and offline runs.
//!
//! Ranking is keyword overlap: the fraction of query words that appear in the
//! record key or content, case-insensitive. Records are upserted by key.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{GatewayError, MemoryGateway, MemoryRecord, Namespace, ScoredRecord, StoreOutcome};

#[derive(Debug, Clone)]
struct StoredRecord {
    record: MemoryRecord,
    external_id: String,
}

#[derive(Debug, Default)]
struct GatewayState {
    // Ordered by key so equal scores rank deterministically.
    namespaces: HashMap<Namespace, BTreeMap<String, StoredRecord>>,
    rejected_keys: HashMap<String, String>,
    failing_calls: u32,
    store_calls: u32,
    next_id: u64,
}

/// Memory gateway holding records in process.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<GatewayState>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Reject every future record with this key with `code`.
    pub fn reject_key(&self, key: impl Into<String>, code: impl Into<String>) {
        self.lock().rejected_keys.insert(key.into(), code.into());
    }

    /// Stop rejecting `key`.
    pub fn accept_key(&self, key: &str) {
        self.lock().rejected_keys.remove(key);
    }

    /// Fail the next `n` calls (store or retrieve) as unavailable.
    pub fn fail_next_calls(&self, n: u32) {
        self.lock().failing_calls = n;
    }

    /// Seed a record directly, bypassing failure scripting.
    pub fn seed(&self, namespace: &Namespace, record: MemoryRecord) -> String {
        let mut state = self.lock();
        upsert(&mut state, namespace, record)
    }

    /// Number of `store` calls that reached the gateway.
    pub fn store_calls(&self) -> u32 {
        self.lock().store_calls
    }

    /// Records held in a namespace, ordered by key.
    pub fn records(&self, namespace: &Namespace) -> Vec<MemoryRecord> {
        self.lock()
            .namespaces
            .get(namespace)
            .map(|records| records.values().map(|r| r.record.clone()).collect())
            .unwrap_or_default()
    }
}

fn upsert(state: &mut GatewayState, namespace: &Namespace, record: MemoryRecord) -> String {
    let existing = state
        .namespaces
        .get(namespace)
        .and_then(|records| records.get(&record.key))
        .map(|r| r.external_id.clone());
    let external_id = match existing {
        Some(id) => id,
        None => {
            state.next_id += 1;
            format!("mem-{}", state.next_id)
        }
    };
    state
        .namespaces
        .entry(namespace.clone())
        .or_default()
        .insert(
            record.key.clone(),
            StoredRecord {
                record,
                external_id: external_id.clone(),
            },
        );
    external_id
}

fn take_failure(state: &mut GatewayState) -> Result<(), GatewayError> {
    if state.failing_calls > 0 {
        state.failing_calls -= 1;
        return Err(GatewayError::Unavailable("scripted outage".to_string()));
    }
    Ok(())
}

fn keyword_score(query: &str, key: &str, content: &str) -> f64 {
    let words: HashSet<String> = query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let haystack = format!("{key} {content}").to_lowercase();
    let matched = words.iter().filter(|w| haystack.contains(w.as_str())).count();
    matched as f64 / words.len() as f64
}

#[async_trait]
impl MemoryGateway for InMemoryGateway {
    async fn store(
        &self,
        namespace: &Namespace,
        records: &[MemoryRecord],
    ) -> Result<Vec<StoreOutcome>, GatewayError> {
        let mut state = self.lock();
        state.store_calls += 1;
        take_failure(&mut state)?;

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            if let Some(code) = state.rejected_keys.get(&record.key).cloned() {
                outcomes.push(StoreOutcome::Failed {
                    key: record.key.clone(),
                    message: format!("record {} rejected", record.key),
                    code,
                });
                continue;
            }
            let external_id = upsert(&mut state, namespace, record.clone());
            outcomes.push(StoreOutcome::Stored {
                key: record.key.clone(),
                external_id,
            });
        }
        Ok(outcomes)
    }

    async fn retrieve(
        &self,
        namespace: &Namespace,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, GatewayError> {
        let mut state = self.lock();
        take_failure(&mut state)?;

        let Some(records) = state.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<ScoredRecord> = records
            .values()
            .filter_map(|stored| {
                let score = keyword_score(query, &stored.record.key, &stored.record.content);
                (score > 0.0).then(|| ScoredRecord {
                    record: stored.record.clone(),
                    external_id: stored.external_id.clone(),
                    relevance_score: score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}
