//! Point-in-time world-state snapshots with verified rollback.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_store::{Collection, RecordStore};
use tracing::debug;
use uuid::Uuid;

use super::log::AuditLog;
use super::{AuditError, AuditResult};
use crate::hashing::compute_digest;
use crate::metrics::METRICS;
use crate::obs::{emit_integrity_failure, emit_rollback};
use crate::persist::WriteBehind;
use crate::Metadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub state: Value,
    /// Digest of the canonical JSON of `state`.
    pub content_hash: String,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    pub snapshot_id: String,
    pub previous_state: Value,
    pub restored_state: Value,
    pub timestamp: DateTime<Utc>,
}

struct ManagerInner {
    snapshots: Vec<Snapshot>,
    current_state: Value,
    /// Sequence each snapshot was first persisted under.
    sequences: HashMap<String, u64>,
}

/// Holds the current world state and the snapshots it can return to.
///
/// Every rollback is itself recorded in the shared [`AuditLog`].
pub struct SnapshotManager {
    inner: RwLock<ManagerInner>,
    audit: Arc<AuditLog>,
    persistence: Option<WriteBehind>,
    last_sequence: u64,
}

impl SnapshotManager {
    pub fn new(audit: Arc<AuditLog>, initial_state: Value) -> Self {
        Self {
            inner: RwLock::new(ManagerInner {
                snapshots: Vec::new(),
                current_state: initial_state,
                sequences: HashMap::new(),
            }),
            audit,
            persistence: None,
            last_sequence: 0,
        }
    }

    pub fn with_persistence(mut self, writer: WriteBehind) -> Self {
        writer.resume_after(self.last_sequence);
        self.persistence = Some(writer);
        self
    }

    /// Reload persisted snapshots in the order they were first created.
    /// Hashes are checked on rollback, not here.
    pub async fn hydrate(
        audit: Arc<AuditLog>,
        initial_state: Value,
        store: &dyn RecordStore,
    ) -> AuditResult<Self> {
        let records = store.load_all(Collection::Snapshot).await?;
        let mut manager = Self::new(audit, initial_state);
        {
            let inner = manager.inner.get_mut();
            for record in records {
                manager.last_sequence = manager.last_sequence.max(record.sequence);
                let snapshot: Snapshot = serde_json::from_value(record.body)?;
                inner.sequences.insert(snapshot.id.clone(), record.sequence);
                inner.snapshots.push(snapshot);
            }
        }
        debug!(
            snapshots = manager.inner.read().snapshots.len(),
            "snapshots hydrated"
        );
        Ok(manager)
    }

    pub fn current_state(&self) -> Value {
        self.inner.read().current_state.clone()
    }

    pub fn set_current_state(&self, state: Value) {
        self.inner.write().current_state = state;
    }

    pub fn create_snapshot(&self, state: Value, verified: bool) -> AuditResult<Snapshot> {
        let snapshot = Snapshot {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            content_hash: compute_digest(&state)?,
            state,
            verified,
        };
        let mut inner = self.inner.write();
        inner.snapshots.push(snapshot.clone());
        self.persist(&mut inner, &snapshot);
        Ok(snapshot)
    }

    /// Admit a snapshot read back from storage. Its hash is checked when it
    /// is rolled back to, not here.
    pub fn load_snapshot(&self, snapshot: Snapshot) {
        self.inner.write().snapshots.push(snapshot);
    }

    pub fn mark_verified(&self, id: &str) -> AuditResult<Snapshot> {
        let mut inner = self.inner.write();
        let snapshot = inner
            .snapshots
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AuditError::NotFound { id: id.to_string() })?;
        snapshot.verified = true;
        let snapshot = snapshot.clone();
        self.persist(&mut inner, &snapshot);
        Ok(snapshot)
    }

    pub fn get_snapshot(&self, id: &str) -> Option<Snapshot> {
        self.inner.read().snapshots.iter().find(|s| s.id == id).cloned()
    }

    /// Snapshots in creation order.
    pub fn list_snapshots(&self) -> Vec<Snapshot> {
        self.inner.read().snapshots.clone()
    }

    /// The most recently created snapshot marked verified.
    pub fn last_verified(&self) -> Option<Snapshot> {
        self.inner
            .read()
            .snapshots
            .iter()
            .rev()
            .find(|s| s.verified)
            .cloned()
    }

    /// Restore the current state from snapshot `id` after checking its hash.
    ///
    /// On an integrity failure the current state is left untouched and no
    /// audit entry is written.
    pub fn rollback_to_snapshot(&self, id: &str) -> AuditResult<RollbackResult> {
        let mut inner = self.inner.write();
        let snapshot = inner
            .snapshots
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AuditError::NotFound { id: id.to_string() })?;

        let actual = compute_digest(&snapshot.state)?;
        if actual != snapshot.content_hash {
            METRICS.inc_integrity_failures();
            emit_integrity_failure(id, &snapshot.content_hash, &actual);
            return Err(AuditError::IntegrityCheckFailed {
                id: id.to_string(),
                expected: snapshot.content_hash.clone(),
                actual,
            });
        }

        let restored_state = snapshot.state.clone();
        let previous_state =
            std::mem::replace(&mut inner.current_state, restored_state.clone());

        let mut metadata = Metadata::new();
        metadata.insert("snapshot_id".to_string(), Value::String(id.to_string()));
        let logged = self.audit.log_action(
            "system",
            "rollback",
            previous_state.clone(),
            restored_state.clone(),
            Some(metadata),
        );
        if let Err(err) = logged {
            inner.current_state = previous_state;
            return Err(err);
        }
        drop(inner);

        METRICS.inc_rollbacks();
        emit_rollback(id);
        Ok(RollbackResult {
            success: true,
            snapshot_id: id.to_string(),
            previous_state,
            restored_state,
            timestamp: Utc::now(),
        })
    }

    pub fn rollback_to_last_verified(&self) -> AuditResult<RollbackResult> {
        let id = self
            .last_verified()
            .map(|s| s.id)
            .ok_or(AuditError::NoVerifiedSnapshot)?;
        self.rollback_to_snapshot(&id)
    }

    /// Save `snapshot`, reusing its first sequence when it was saved before.
    fn persist(&self, inner: &mut ManagerInner, snapshot: &Snapshot) {
        let Some(writer) = &self.persistence else {
            return;
        };
        let collection = Collection::Snapshot;
        match inner.sequences.get(&snapshot.id) {
            Some(&sequence) => writer.reenqueue(
                collection,
                &snapshot.id,
                sequence,
                None,
                snapshot.timestamp,
                snapshot,
            ),
            None => {
                if let Some(sequence) =
                    writer.enqueue(collection, &snapshot.id, None, snapshot.timestamp, snapshot)
                {
                    inner.sequences.insert(snapshot.id.clone(), sequence);
                }
            }
        }
    }

    #[cfg(test)]
    fn tamper(&self, id: &str, state: Value) {
        let mut inner = self.inner.write();
        if let Some(s) = inner.snapshots.iter_mut().find(|s| s.id == id) {
            s.state = state;
        }
    }
}
