use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use strata_store::Collection;
use tracing::debug;

use super::entry::{
    diff_snapshots, DiffOperation, StateConflict, StateDiff, StateEntry, StateSnapshot,
};
use super::hooks::{StateChange, StateChangeHook};
use super::{StateError, StateResult};
use crate::metrics::METRICS;
use crate::obs::emit_state_conflict;
use crate::persist::WriteBehind;
use crate::Metadata;

#[derive(Serialize)]
struct TemporalIndexRecord<'a, V> {
    operation: DiffOperation,
    entry: &'a StateEntry<V>,
}

/// Optimistic-concurrency key/value store with full per-key history.
///
/// Keys live in a sharded concurrent map; the version check and the append
/// happen under the key's shard entry, so of several writers presenting the
/// same `expected_version` exactly one succeeds. No lock is held while hooks
/// run or while snapshots are taken.
pub struct VersionedStateStore<V> {
    histories: DashMap<String, Vec<StateEntry<V>>>,
    conflicts: DashMap<String, Vec<StateConflict<V>>>,
    hooks: RwLock<Vec<Arc<dyn StateChangeHook<V>>>>,
    has_hooks: AtomicBool,
    persistence: Option<WriteBehind>,
}

impl<V> Default for VersionedStateStore<V>
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> VersionedStateStore<V>
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            histories: DashMap::new(),
            conflicts: DashMap::new(),
            hooks: RwLock::new(Vec::new()),
            has_hooks: AtomicBool::new(false),
            persistence: None,
        }
    }

    /// Mirror every committed write into the temporal index collection.
    pub fn with_persistence(mut self, writer: WriteBehind) -> Self {
        self.persistence = Some(writer);
        self
    }

    pub fn register_hook(&self, hook: Arc<dyn StateChangeHook<V>>) {
        self.hooks.write().push(hook);
        self.has_hooks.store(true, Ordering::SeqCst);
    }

    /// Create `key` at version 1. Fails if the key already has a history.
    pub fn create(
        &self,
        key: &str,
        value: V,
        metadata: Option<Metadata>,
    ) -> StateResult<StateEntry<V>> {
        let entry = match self.histories.entry(key.to_string()) {
            Entry::Occupied(_) => {
                return Err(StateError::AlreadyExists {
                    key: key.to_string(),
                })
            }
            Entry::Vacant(vacant) => {
                let entry = StateEntry {
                    key: key.to_string(),
                    value,
                    version: 1,
                    timestamp: Utc::now(),
                    metadata: metadata.unwrap_or_default(),
                };
                vacant.insert(vec![entry.clone()]);
                entry
            }
        };

        METRICS.inc_writes();
        debug!(key = %key, version = 1, "state entry created");
        self.index_write(&entry, DiffOperation::Create);
        Ok(entry)
    }

    /// Latest version of `key`.
    pub fn read(&self, key: &str) -> Option<StateEntry<V>> {
        self.histories
            .get(key)
            .and_then(|history| history.last().cloned())
    }

    /// A specific historical version of `key`.
    pub fn read_version(&self, key: &str, version: u64) -> Option<StateEntry<V>> {
        let history = self.histories.get(key)?;
        // Versions are dense from 1, so the index is version - 1.
        let idx = usize::try_from(version.checked_sub(1)?).ok()?;
        history.get(idx).cloned()
    }

    /// Every version of `key`, oldest first.
    pub fn history(&self, key: &str) -> Vec<StateEntry<V>> {
        self.histories
            .get(key)
            .map(|history| history.value().clone())
            .unwrap_or_default()
    }

    /// Append version `expected_version + 1`, if `expected_version` is current.
    pub fn update(
        &self,
        key: &str,
        value: V,
        expected_version: u64,
        metadata: Option<Metadata>,
    ) -> StateResult<StateEntry<V>> {
        self.update_inner(key, value, expected_version, metadata)
            .map_err(|(err, _)| err)
    }

    /// Like [`update`](Self::update), but a version conflict is also recorded
    /// in `task_id`'s conflict ledger together with the rejected value.
    pub fn update_for_task(
        &self,
        task_id: &str,
        key: &str,
        value: V,
        expected_version: u64,
        metadata: Option<Metadata>,
    ) -> StateResult<StateEntry<V>> {
        self.update_inner(key, value, expected_version, metadata)
            .map_err(|(err, attempted)| {
                if let StateError::Conflict {
                    expected_version,
                    actual_version,
                    ..
                } = &err
                {
                    self.record_conflict(
                        task_id,
                        StateConflict::update(key, *expected_version, *actual_version, attempted),
                    );
                }
                err
            })
    }

    fn update_inner(
        &self,
        key: &str,
        value: V,
        expected_version: u64,
        metadata: Option<Metadata>,
    ) -> Result<StateEntry<V>, (StateError, V)> {
        let before = self.hooks_enabled().then(|| self.snapshot());

        let entry = {
            let Some(mut history) = self.histories.get_mut(key) else {
                return Err((
                    StateError::NotFound {
                        key: key.to_string(),
                    },
                    value,
                ));
            };
            let actual_version = history.last().map(|e| e.version).unwrap_or(0);
            if actual_version != expected_version {
                drop(history);
                return Err((self.conflict(key, expected_version, actual_version), value));
            }
            let entry = StateEntry {
                key: key.to_string(),
                value,
                version: expected_version + 1,
                timestamp: Utc::now(),
                metadata: metadata.unwrap_or_default(),
            };
            history.push(entry.clone());
            entry
        };

        METRICS.inc_writes();
        debug!(key = %key, version = entry.version, "state entry updated");
        self.index_write(&entry, DiffOperation::Update);

        if let Some(before) = before {
            self.notify_hooks(key, &entry, before);
        }
        Ok(entry)
    }

    /// Remove `key` and its whole history, if `expected_version` is current.
    pub fn delete(&self, key: &str, expected_version: u64) -> StateResult<()> {
        let removed = match self.histories.entry(key.to_string()) {
            Entry::Vacant(_) => {
                return Err(StateError::NotFound {
                    key: key.to_string(),
                })
            }
            Entry::Occupied(occupied) => {
                let actual_version = occupied.get().last().map(|e| e.version).unwrap_or(0);
                if actual_version != expected_version {
                    drop(occupied);
                    return Err(self.conflict(key, expected_version, actual_version));
                }
                let (_, history) = occupied.remove_entry();
                history
            }
        };

        METRICS.inc_writes();
        debug!(key = %key, version = expected_version, "state entry deleted");
        if let Some(last) = removed.last() {
            self.index_write(last, DiffOperation::Delete);
        }
        Ok(())
    }

    /// Like [`delete`](Self::delete), but a version conflict is also recorded
    /// in `task_id`'s conflict ledger.
    pub fn delete_for_task(
        &self,
        task_id: &str,
        key: &str,
        expected_version: u64,
    ) -> StateResult<()> {
        self.delete(key, expected_version).map_err(|err| {
            if let StateError::Conflict {
                expected_version,
                actual_version,
                ..
            } = &err
            {
                self.record_conflict(
                    task_id,
                    StateConflict::delete(key, *expected_version, *actual_version),
                );
            }
            err
        })
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.histories.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// Latest entry of every key.
    pub fn snapshot(&self) -> StateSnapshot<V> {
        let entries = self
            .histories
            .iter()
            .filter_map(|history| {
                history
                    .value()
                    .last()
                    .map(|last| (history.key().clone(), last.clone()))
            })
            .collect();
        StateSnapshot::new(entries)
    }

    pub fn diff(
        &self,
        before: &StateSnapshot<V>,
        after: &StateSnapshot<V>,
    ) -> Vec<StateDiff<V>> {
        diff_snapshots(before, after)
    }

    pub fn record_conflict(&self, task_id: &str, conflict: StateConflict<V>) {
        self.conflicts
            .entry(task_id.to_string())
            .or_default()
            .push(conflict);
    }

    pub fn get_conflicts(&self, task_id: &str) -> Vec<StateConflict<V>> {
        self.conflicts
            .get(task_id)
            .map(|c| c.value().clone())
            .unwrap_or_default()
    }

    pub fn clear_conflicts(&self, task_id: &str) {
        self.conflicts.remove(task_id);
    }

    fn conflict(&self, key: &str, expected_version: u64, actual_version: u64) -> StateError {
        METRICS.inc_conflicts();
        emit_state_conflict(key, expected_version, actual_version);
        StateError::Conflict {
            key: key.to_string(),
            expected_version,
            actual_version,
        }
    }

    fn hooks_enabled(&self) -> bool {
        self.has_hooks.load(Ordering::SeqCst)
    }

    fn notify_hooks(&self, key: &str, entry: &StateEntry<V>, before: StateSnapshot<V>) {
        let after = self.snapshot();
        let change = StateChange {
            key: key.to_string(),
            entry: entry.clone(),
            diffs: diff_snapshots(&before, &after),
            before,
            after,
        };
        let hooks: Vec<Arc<dyn StateChangeHook<V>>> = self.hooks.read().clone();
        for hook in hooks {
            hook.on_state_change(&change);
        }
    }

    fn index_write(&self, entry: &StateEntry<V>, operation: DiffOperation) {
        if let Some(writer) = &self.persistence {
            writer.enqueue(
                Collection::TemporalIndex,
                &format!("{}@{}:{}", entry.key, entry.version, operation),
                None,
                Utc::now(),
                &TemporalIndexRecord { operation, entry },
            );
        }
    }
}
