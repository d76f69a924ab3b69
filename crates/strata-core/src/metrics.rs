//! Global atomic counters for Strata observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a session ends).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    entries_appended: AtomicU64,
    turns_processed: AtomicU64,
    checkpoints_written: AtomicU64,
    entries_promoted: AtomicU64,
    promotion_failures: AtomicU64,
    artifact_transitions: AtomicU64,
    dispatch_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            entries_appended: AtomicU64::new(0),
            turns_processed: AtomicU64::new(0),
            checkpoints_written: AtomicU64::new(0),
            entries_promoted: AtomicU64::new(0),
            promotion_failures: AtomicU64::new(0),
            artifact_transitions: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_entries_appended(&self) {
        self.entries_appended.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "entries_appended", "counter incremented");
    }

    pub fn inc_turns(&self) {
        self.turns_processed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "turns_processed", "counter incremented");
    }

    pub fn inc_checkpoints(&self) {
        self.checkpoints_written.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "checkpoints_written", "counter incremented");
    }

    pub fn add_entries_promoted(&self, n: u64) {
        self.entries_promoted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_promotion_failures(&self, n: u64) {
        self.promotion_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_artifact_transitions(&self) {
        self.artifact_transitions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "artifact_transitions", "counter incremented");
    }

    /// Publish or revision dispatches that failed, timed out or were cancelled.
    pub fn inc_dispatch_failures(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "dispatch_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (session end, CLI exit)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            entries_appended = self.entries_appended(),
            turns_processed = self.turns_processed(),
            checkpoints_written = self.checkpoints_written(),
            entries_promoted = self.entries_promoted(),
            promotion_failures = self.promotion_failures(),
            artifact_transitions = self.artifact_transitions(),
            dispatch_failures = self.dispatch_failures(),
        );
    }

    pub fn entries_appended(&self) -> u64 {
        self.entries_appended.load(Ordering::Relaxed)
    }

    pub fn turns_processed(&self) -> u64 {
        self.turns_processed.load(Ordering::Relaxed)
    }

    pub fn checkpoints_written(&self) -> u64 {
        self.checkpoints_written.load(Ordering::Relaxed)
    }

    pub fn entries_promoted(&self) -> u64 {
        self.entries_promoted.load(Ordering::Relaxed)
    }

    pub fn promotion_failures(&self) -> u64 {
        self.promotion_failures.load(Ordering::Relaxed)
    }

    pub fn artifact_transitions(&self) -> u64 {
        self.artifact_transitions.load(Ordering::Relaxed)
    }

    pub fn dispatch_failures(&self) -> u64 {
        self.dispatch_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.entries_appended,
            &self.turns_processed,
            &self.checkpoints_written,
            &self.entries_promoted,
            &self.promotion_failures,
            &self.artifact_transitions,
            &self.dispatch_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
