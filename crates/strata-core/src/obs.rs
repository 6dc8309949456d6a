//! Structured observability hooks for strata lifecycle events.
//!
//! This module provides:
//! - Task-scoped tracing spans via the `TaskSpan` RAII guard
//! - Emission functions for conflicts, audit appends, rollbacks, integrity
//!   failures, pruning, retention transitions and persistence failures
//!
//! Events are emitted at `info!` level, failures at `warn!`.

use tracing::{info, warn};

/// RAII guard that enters a task-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = TaskSpan::enter("task-42", "step-3");
/// // every event below carries task_id and step_id
/// ```
pub struct TaskSpan {
    _span: tracing::span::EnteredSpan,
}

impl TaskSpan {
    pub fn enter(task_id: &str, step_id: &str) -> Self {
        let span = tracing::info_span!("strata.task", task_id = %task_id, step_id = %step_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// A write was rejected by version fencing.
pub fn emit_state_conflict(key: &str, expected_version: u64, actual_version: u64) {
    info!(
        event = "state.conflict",
        key = %key,
        expected_version = expected_version,
        actual_version = actual_version,
    );
}

pub fn emit_audit_appended(entry_id: &str, actor: &str, action: &str) {
    info!(event = "audit.appended", entry_id = %entry_id, actor = %actor, action = %action);
}

pub fn emit_rollback(snapshot_id: &str) {
    info!(event = "snapshot.rollback", snapshot_id = %snapshot_id);
}

pub fn emit_integrity_failure(id: &str, expected: &str, actual: &str) {
    warn!(event = "snapshot.integrity_failed", id = %id, expected = %expected, actual = %actual);
}

pub fn emit_memory_pruned(removed: usize, remaining: usize) {
    info!(event = "memory.pruned", removed = removed, remaining = remaining);
}

pub fn emit_memory_prune_failed(entry_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "memory.prune_failed", entry_id = %entry_id, error = %error);
}

pub fn emit_retention_transition(entry_id: &str, from: &str, to: &str) {
    info!(event = "retention.transition", entry_id = %entry_id, from = %from, to = %to);
}

/// A fire-and-forget persistence write failed; in-memory state is unaffected.
pub fn emit_persistence_failure(collection: &str, id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "persist.failed", collection = %collection, id = %id, error = %error);
}
