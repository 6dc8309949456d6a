//! Snapshots that bind world state to a set of memory entries via a
//! Merkle root.
//!
//! Leaves are the digest of the world state followed by each memory
//! pointer's content hash, in the order the entries were given. The root
//! is the snapshot's `content_hash`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_store::{Collection, RecordStore};
use tracing::debug;
use uuid::Uuid;

use super::{AuditError, AuditResult};
use crate::hashing::{compute_digest, merkle_root, HashResult};
use crate::memory::provenance::require;
use crate::memory::{MemoryEntry, MemoryPointer};
use crate::metrics::METRICS;
use crate::obs::emit_integrity_failure;
use crate::persist::WriteBehind;
use crate::Metadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedSnapshot {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub step_id: String,
    pub world_state: Value,
    pub memory_pointers: Vec<MemoryPointer>,
    pub merkle_root: String,
    pub content_hash: String,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl CombinedSnapshot {
    /// Root recomputed from the stored world state and pointers.
    pub fn compute_root(&self) -> HashResult<String> {
        combined_root(&self.world_state, &self.memory_pointers)
    }
}

/// What a successful restore hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoredSnapshot {
    pub snapshot_id: String,
    pub world_state: Value,
    pub memory_pointers: Vec<MemoryPointer>,
}

fn combined_root(world_state: &Value, pointers: &[MemoryPointer]) -> HashResult<String> {
    let mut leaves = Vec::with_capacity(pointers.len() + 1);
    leaves.push(compute_digest(world_state)?);
    leaves.extend(pointers.iter().map(|p| p.content_hash.clone()));
    Ok(merkle_root(&leaves))
}

#[derive(Debug, Default)]
struct CombinedInner {
    order: Vec<String>,
    by_id: HashMap<String, CombinedSnapshot>,
    /// Sequence each snapshot was first persisted under.
    sequences: HashMap<String, u64>,
}

impl CombinedInner {
    fn insert(&mut self, snapshot: CombinedSnapshot) {
        if !self.by_id.contains_key(&snapshot.id) {
            self.order.push(snapshot.id.clone());
        }
        self.by_id.insert(snapshot.id.clone(), snapshot);
    }

    fn in_order(&self) -> impl DoubleEndedIterator<Item = &CombinedSnapshot> + '_ {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }
}

pub struct CombinedSnapshotStore {
    inner: RwLock<CombinedInner>,
    persistence: Option<WriteBehind>,
    last_sequence: u64,
}

impl Default for CombinedSnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CombinedSnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CombinedInner::default()),
            persistence: None,
            last_sequence: 0,
        }
    }

    pub fn with_persistence(mut self, writer: WriteBehind) -> Self {
        writer.resume_after(self.last_sequence);
        self.persistence = Some(writer);
        self
    }

    /// Reload persisted snapshots without recomputing their roots.
    pub async fn hydrate(store: &dyn RecordStore) -> AuditResult<Self> {
        let records = store.load_all(Collection::CombinedSnapshot).await?;
        let mut snapshots = Self::new();
        {
            let inner = snapshots.inner.get_mut();
            for record in records {
                snapshots.last_sequence = snapshots.last_sequence.max(record.sequence);
                let snapshot: CombinedSnapshot = serde_json::from_value(record.body)?;
                inner.sequences.insert(snapshot.id.clone(), record.sequence);
                inner.insert(snapshot);
            }
        }
        debug!(snapshots = snapshots.len(), "combined snapshots hydrated");
        Ok(snapshots)
    }

    pub fn create_combined_snapshot(
        &self,
        task_id: &str,
        step_id: &str,
        world_state: &Value,
        memory_entries: &[MemoryEntry],
        verified: bool,
        metadata: Option<Metadata>,
    ) -> AuditResult<CombinedSnapshot> {
        require("task_id", task_id)?;
        require("step_id", step_id)?;
        let memory_pointers = memory_entries
            .iter()
            .map(MemoryEntry::pointer)
            .collect::<HashResult<Vec<_>>>()?;
        let root = combined_root(world_state, &memory_pointers)?;

        let snapshot = CombinedSnapshot {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            task_id: task_id.to_string(),
            step_id: step_id.to_string(),
            world_state: world_state.clone(),
            memory_pointers,
            content_hash: root.clone(),
            merkle_root: root,
            verified,
            metadata,
        };

        let mut inner = self.inner.write();
        inner.insert(snapshot.clone());
        self.persist(&mut inner, &snapshot);
        Ok(snapshot)
    }

    /// Recompute the root and compare it with both stored hashes.
    pub fn verify_snapshot(&self, id: &str) -> AuditResult<bool> {
        let snapshot = self.require(id)?;
        let actual = snapshot.compute_root()?;
        Ok(actual == snapshot.merkle_root && actual == snapshot.content_hash)
    }

    /// Return the snapshot's world state and pointers once it verifies.
    pub fn restore_snapshot(&self, id: &str) -> AuditResult<RestoredSnapshot> {
        let snapshot = self.require(id)?;
        let actual = snapshot.compute_root()?;
        if actual != snapshot.merkle_root || actual != snapshot.content_hash {
            METRICS.inc_integrity_failures();
            emit_integrity_failure(id, &snapshot.merkle_root, &actual);
            return Err(AuditError::IntegrityCheckFailed {
                id: id.to_string(),
                expected: snapshot.merkle_root,
                actual,
            });
        }
        Ok(RestoredSnapshot {
            snapshot_id: snapshot.id,
            world_state: snapshot.world_state,
            memory_pointers: snapshot.memory_pointers,
        })
    }

    pub fn mark_verified(&self, id: &str) -> AuditResult<CombinedSnapshot> {
        let mut inner = self.inner.write();
        let snapshot = inner
            .by_id
            .get_mut(id)
            .ok_or_else(|| AuditError::NotFound { id: id.to_string() })?;
        snapshot.verified = true;
        let snapshot = snapshot.clone();
        self.persist(&mut inner, &snapshot);
        Ok(snapshot)
    }

    pub fn get(&self, id: &str) -> Option<CombinedSnapshot> {
        self.inner.read().by_id.get(id).cloned()
    }

    /// Snapshots in creation order.
    pub fn list(&self) -> Vec<CombinedSnapshot> {
        self.inner.read().in_order().cloned().collect()
    }

    pub fn for_task(&self, task_id: &str) -> Vec<CombinedSnapshot> {
        self.inner
            .read()
            .in_order()
            .filter(|s| s.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Most recently created verified snapshot for `task_id`.
    pub fn latest_verified(&self, task_id: &str) -> Option<CombinedSnapshot> {
        self.inner
            .read()
            .in_order()
            .rev()
            .find(|s| s.verified && s.task_id == task_id)
            .cloned()
    }

    pub fn find_by_content_hash(&self, content_hash: &str) -> Option<CombinedSnapshot> {
        self.inner
            .read()
            .in_order()
            .find(|s| s.content_hash == content_hash)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Save `snapshot`, reusing its first sequence when it was saved before.
    fn persist(&self, inner: &mut CombinedInner, snapshot: &CombinedSnapshot) {
        let Some(writer) = &self.persistence else {
            return;
        };
        let collection = Collection::CombinedSnapshot;
        let task_id = Some(snapshot.task_id.as_str());
        match inner.sequences.get(&snapshot.id) {
            Some(&sequence) => writer.reenqueue(
                collection,
                &snapshot.id,
                sequence,
                task_id,
                snapshot.timestamp,
                snapshot,
            ),
            None => {
                if let Some(sequence) =
                    writer.enqueue(collection, &snapshot.id, task_id, snapshot.timestamp, snapshot)
                {
                    inner.sequences.insert(snapshot.id.clone(), sequence);
                }
            }
        }
    }

    fn require(&self, id: &str) -> AuditResult<CombinedSnapshot> {
        self.get(id)
            .ok_or_else(|| AuditError::NotFound { id: id.to_string() })
    }
}
