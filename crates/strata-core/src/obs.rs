//! Structured observability hooks for Strata session lifecycle events.
//!
//! This module provides:
//! - Session-scoped tracing spans via `SessionSpan` RAII guard
//! - Emission functions for key events: session start/close, ledger append,
//!   checkpoint, promotion, artifact transitions
//!
//! Events are emitted at `info!` level unless noted. Use `--json` on the CLI
//! (or `init_tracing(true, ..)`) for machine-readable output.

use tracing::{info, warn};

/// RAII guard that enters a session-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = SessionSpan::enter("session-12345");
/// // Every tracing call on this thread now carries session_id = "session-12345"
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    /// Create and enter a span tagged with the session_id.
    pub fn enter(session_id: &str) -> Self {
        let span = tracing::info_span!("strata.session", session_id = %session_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: session started (or resumed when `resumed` is true).
pub fn emit_session_started(session_id: &str, owner_id: &str, resumed: bool) {
    info!(
        event = "session.started",
        session_id = %session_id,
        owner_id = %owner_id,
        resumed = resumed,
    );
}

/// Emit event: session paused, completed or abandoned.
pub fn emit_session_closed(session_id: &str, status: &str, turns: u64) {
    info!(event = "session.closed", session_id = %session_id, status = %status, turns = turns);
}

/// Emit event: a ledger entry was appended.
pub fn emit_entry_appended(session_id: &str, entry_type: &str, seq: u64) {
    info!(event = "ledger.appended", session_id = %session_id, kind = %entry_type, seq = seq);
}

/// Emit event: working context checkpointed.
pub fn emit_checkpointed(session_id: &str, seq: u64, size_bytes: u64) {
    info!(
        event = "context.checkpointed",
        session_id = %session_id,
        seq = seq,
        size_bytes = size_bytes,
    );
}

/// Emit event: promotion run finished.
pub fn emit_promotion_finished(session_id: &str, promoted: usize, failed: usize) {
    info!(
        event = "promotion.finished",
        session_id = %session_id,
        promoted = promoted,
        failed = failed,
    );
}

/// Emit event: artifact moved between lifecycle states.
pub fn emit_artifact_transition(artifact_id: &str, from: &str, to: &str, actor: &str) {
    info!(
        event = "artifact.transitioned",
        artifact_id = %artifact_id,
        from = %from,
        to = %to,
        actor = %actor,
    );
}

/// Emit event: publish or revision dispatch failed (warning level).
pub fn emit_dispatch_failed(artifact_id: &str, dispatch: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "artifact.dispatch_failed",
        artifact_id = %artifact_id,
        dispatch = %dispatch,
        error = %error,
    );
}

/// Emit event: long-term memory unreachable, continuing without it (warning level).
pub fn emit_gateway_degraded(operation: &str, error: &dyn std::fmt::Display) {
    warn!(event = "gateway.degraded", operation = %operation, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_span_create() {
        let _span = SessionSpan::enter("test-session-id");
        emit_entry_appended("test-session-id", "decision", 1);
    }
}
