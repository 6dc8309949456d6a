//! Strata core library
//!
//! Verifiable state and causal provenance for agent runtimes: a versioned
//! state store with optimistic concurrency, a causal graph of actions and
//! effects, and a hash-chained audit and snapshot layer with tiered
//! retention.

pub mod audit;
pub mod causal;
pub mod config;
pub mod error;
pub mod hashing;
pub mod memory;
pub mod metrics;
pub mod obs;
pub mod persist;
pub mod state;
pub mod telemetry;

/// Free-form key/value metadata carried by entries and nodes.
pub type Metadata = std::collections::BTreeMap<String, serde_json::Value>;

pub use audit::{
    AuditDiff, AuditError, AuditEvent, AuditLog, AuditLogEntry, CombinedSnapshot,
    CombinedSnapshotStore, CompactionHook, CompactionOutcome, RestoredSnapshot, RetentionAction,
    RetentionConfig, RetentionDecision, RetentionMetadata, RetentionPassReport, RetentionPolicy,
    RetentionStats, RetentionTier, RollbackResult, Snapshot, SnapshotManager, TierPolicy,
    VerificationReport,
};

pub use causal::{
    ActionNode, CausalGraph, EdgeKind, EffectNode, EffectStateDiff, GraphEdge, GraphError,
    GraphLogEntry, GraphMutation, GraphNode, WhatIfResult, WhyResult,
};

pub use config::{ConfigError, LoggingConfig, MemoryConfig, PersistenceConfig, StrataConfig};
pub use error::{Result, StrataError};

pub use hashing::{canonical_json, compute_digest, digest_of, merkle_root, HashError, EMPTY_HASH};

pub use memory::{
    MemoryEntry, MemoryError, MemoryPointer, MemoryStore, MemoryWrite, Provenance,
    ValidationError,
};

pub use state::{
    diff_snapshots, retry_on_conflict, DiffOperation, RetryPolicy, StateChange, StateChangeHook,
    StateConflict, StateDiff, StateEntry, StateError, StateSnapshot, VersionedStateStore,
};

pub use persist::WriteBehind;
pub use strata_store::{Collection, FsRecordStore, PersistedRecord, RecordQuery, RecordStore};

pub use metrics::METRICS;
pub use obs::TaskSpan;
pub use telemetry::init_tracing;

/// Strata version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
