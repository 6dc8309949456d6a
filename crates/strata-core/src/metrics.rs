//! Global atomic counters for strata observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a task).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Process-wide atomic counters for core operations.
pub struct Metrics {
    writes_committed: AtomicU64,
    conflicts_detected: AtomicU64,
    audit_entries_appended: AtomicU64,
    rollbacks_performed: AtomicU64,
    integrity_failures: AtomicU64,
    entries_pruned: AtomicU64,
    persistence_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            writes_committed: AtomicU64::new(0),
            conflicts_detected: AtomicU64::new(0),
            audit_entries_appended: AtomicU64::new(0),
            rollbacks_performed: AtomicU64::new(0),
            integrity_failures: AtomicU64::new(0),
            entries_pruned: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_writes(&self) {
        self.writes_committed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "writes_committed", "counter incremented");
    }

    pub fn inc_conflicts(&self) {
        self.conflicts_detected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "conflicts_detected", "counter incremented");
    }

    pub fn inc_audit_entries(&self) {
        self.audit_entries_appended.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "audit_entries_appended", "counter incremented");
    }

    pub fn inc_rollbacks(&self) {
        self.rollbacks_performed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollbacks_performed", "counter incremented");
    }

    pub fn inc_integrity_failures(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "integrity_failures", "counter incremented");
    }

    pub fn add_entries_pruned(&self, n: u64) {
        self.entries_pruned.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "entries_pruned", n, "counter incremented");
    }

    pub fn inc_persistence_failures(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "persistence_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a task, checkpoint, etc.)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            writes_committed = self.writes_committed(),
            conflicts_detected = self.conflicts_detected(),
            audit_entries_appended = self.audit_entries_appended(),
            rollbacks_performed = self.rollbacks_performed(),
            integrity_failures = self.integrity_failures(),
            entries_pruned = self.entries_pruned(),
            persistence_failures = self.persistence_failures(),
        );
    }

    pub fn writes_committed(&self) -> u64 {
        self.writes_committed.load(Ordering::Relaxed)
    }

    pub fn conflicts_detected(&self) -> u64 {
        self.conflicts_detected.load(Ordering::Relaxed)
    }

    pub fn audit_entries_appended(&self) -> u64 {
        self.audit_entries_appended.load(Ordering::Relaxed)
    }

    pub fn rollbacks_performed(&self) -> u64 {
        self.rollbacks_performed.load(Ordering::Relaxed)
    }

    pub fn integrity_failures(&self) -> u64 {
        self.integrity_failures.load(Ordering::Relaxed)
    }

    pub fn entries_pruned(&self) -> u64 {
        self.entries_pruned.load(Ordering::Relaxed)
    }

    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.writes_committed.store(0, Ordering::Relaxed);
        self.conflicts_detected.store(0, Ordering::Relaxed);
        self.audit_entries_appended.store(0, Ordering::Relaxed);
        self.rollbacks_performed.store(0, Ordering::Relaxed);
        self.integrity_failures.store(0, Ordering::Relaxed);
        self.entries_pruned.store(0, Ordering::Relaxed);
        self.persistence_failures.store(0, Ordering::Relaxed);
    }
}
