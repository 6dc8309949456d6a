use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::entry::MemoryEntry;
use super::provenance::ValidationError;
use crate::audit::{AuditEvent, AuditLog, RetentionPolicy, RetentionTier};
use crate::config::MemoryConfig;
use crate::metrics::METRICS;
use crate::obs::{emit_memory_prune_failed, emit_memory_pruned};
use crate::Metadata;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("memory entry already exists: {id}")]
    EntryExists { id: String },
}

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

/// Outcome of [`MemoryStore::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWrite {
    pub entry_id: String,
    /// Ids evicted by the prune this write triggered, oldest first.
    pub pruned: Vec<String>,
}

/// Bounded set of provenance-checked memory entries.
///
/// Every admitted entry is tracked by the shared [`RetentionPolicy`].
/// Exceeding `max_entries` evicts the oldest entries by provenance
/// timestamp until `prune_target` remain.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    audit: Arc<AuditLog>,
    retention: Arc<RetentionPolicy>,
    config: MemoryConfig,
}

impl MemoryStore {
    pub fn new(
        audit: Arc<AuditLog>,
        retention: Arc<RetentionPolicy>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            audit,
            retention,
            config,
        }
    }

    /// Admit `entry`, pruning the oldest entries if the store overflows.
    ///
    /// Once the entry is admitted the write succeeds. An entry whose prune
    /// cannot be audited is kept and logged, and pruning moves on to the
    /// next oldest.
    pub fn write(&self, entry: MemoryEntry) -> MemoryResult<MemoryWrite> {
        super::provenance::require("id", &entry.id)?;
        entry.provenance.validate()?;

        let mut entries = self.entries.write();
        if entries.contains_key(&entry.id) {
            return Err(MemoryError::EntryExists { id: entry.id });
        }
        let entry_id = entry.id.clone();
        entries.insert(entry_id.clone(), entry);
        self.retention.track_entry(&entry_id, RetentionTier::Hot);

        let mut pruned = Vec::new();
        if entries.len() > self.config.max_entries {
            pruned = self.prune(&mut entries);
        }
        Ok(MemoryWrite { entry_id, pruned })
    }

    fn prune(&self, entries: &mut HashMap<String, MemoryEntry>) -> Vec<String> {
        let target = self.config.prune_target();
        let mut by_age: Vec<(chrono::DateTime<chrono::Utc>, String)> = entries
            .values()
            .map(|e| (e.timestamp(), e.id.clone()))
            .collect();
        by_age.sort();

        let mut removed = Vec::new();
        for (_, id) in by_age {
            if entries.len() <= target {
                break;
            }
            let Some(entry) = entries.get(&id) else {
                continue;
            };
            // The audit entry comes first; an unaudited entry is never removed.
            if let Err(err) = self.audit.log_event(prune_event(entry)) {
                emit_memory_prune_failed(&id, &err);
                continue;
            }
            entries.remove(&id);
            self.retention.untrack(&id);
            removed.push(id);
        }

        METRICS.add_entries_pruned(removed.len() as u64);
        emit_memory_pruned(removed.len(), entries.len());
        removed
    }

    /// Fetch an entry, counting the read as an access for retention.
    pub fn get(&self, id: &str) -> Option<MemoryEntry> {
        let entry = self.entries.read().get(id).cloned()?;
        self.retention.record_access(id);
        Some(entry)
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<MemoryEntry> {
        let mut all: Vec<MemoryEntry> = self.entries.read().values().cloned().collect();
        all.sort_by(|a, b| a.timestamp().cmp(&b.timestamp()).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn entries_for_task(&self, task_id: &str) -> Vec<MemoryEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.provenance.task_id == task_id)
            .collect()
    }

    pub fn retention(&self) -> &Arc<RetentionPolicy> {
        &self.retention
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prune_event(entry: &MemoryEntry) -> AuditEvent {
    let mut metadata = Metadata::new();
    metadata.insert("entry_id".to_string(), Value::String(entry.id.clone()));
    metadata.insert("reason".to_string(), Value::String("capacity".to_string()));
    let mut before = Map::new();
    before.insert("id".to_string(), Value::String(entry.id.clone()));
    before.insert("type".to_string(), Value::String(entry.kind.clone()));
    before.insert(
        "timestamp".to_string(),
        Value::String(entry.provenance.timestamp.to_rfc3339()),
    );
    let event = AuditEvent::new("system", "memory_prune", Value::Object(before), Value::Null)
        .with_metadata(metadata)
        .with_provenance(entry.provenance.clone());
    match entry.provenance.source_event_id.clone() {
        Some(source) => event.with_source_events([source]),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Provenance;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn store(max_entries: usize) -> (Arc<AuditLog>, MemoryStore) {
        let audit = Arc::new(AuditLog::new());
        let store = MemoryStore::new(
            audit.clone(),
            Arc::new(RetentionPolicy::default()),
            MemoryConfig {
                max_entries,
                prune_ratio: 0.8,
            },
        );
        (audit, store)
    }

    fn entry(id: &str, age_secs: i64) -> MemoryEntry {
        let provenance = Provenance::new("task", "step")
            .with_timestamp(Utc::now() - Duration::seconds(age_secs));
        MemoryEntry::new(id, "note", json!({ "id": id }), provenance)
    }

    #[test]
    fn write_without_provenance_changes_nothing() {
        let (audit, store) = store(10);
        let mut bad = entry("m", 0);
        bad.provenance.task_id.clear();
        let err = store.write(bad).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::Validation(ValidationError::MissingField { field: "task_id" })
        ));
        assert!(store.is_empty());
        assert!(!store.retention().is_tracked("m"));
        assert!(audit.is_empty());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let (_, store) = store(10);
        store.write(entry("m", 0)).unwrap();
        assert!(matches!(
            store.write(entry("m", 0)),
            Err(MemoryError::EntryExists { .. })
        ));
    }

    #[test]
    fn overflow_prunes_oldest_to_target() {
        let (audit, store) = store(10);
        // Ages run from 100s down to 91s, so "m0" is the oldest.
        for i in 0..10 {
            let result = store.write(entry(&format!("m{i}"), 100 - i)).unwrap();
            assert!(result.pruned.is_empty());
        }
        let result = store.write(entry("m10", 0)).unwrap();

        assert_eq!(result.pruned, vec!["m0", "m1", "m2"]);
        assert_eq!(store.len(), 8);
        assert!(store.get("m0").is_none());
        assert!(!store.retention().is_tracked("m0"));

        let prunes = audit.entries_by_action("memory_prune");
        assert_eq!(prunes.len(), 3);
        assert!(prunes.iter().all(|e| e.actor == "system"));
        assert_eq!(prunes[0].state_before["id"], json!("m0"));
        assert!(audit.verify_all().valid);
    }

    #[test]
    fn unauditable_prune_keeps_entry_and_write_succeeds() {
        let (audit, store) = store(4);
        // Bypasses `write`, so the blank task id is only caught when the
        // prune tries to audit it.
        let mut broken = entry("broken", 500);
        broken.provenance.task_id.clear();
        store.entries.write().insert("broken".to_string(), broken);
        for i in 0..4 {
            store.write(entry(&format!("m{i}"), 100 - i)).unwrap();
        }

        // Five entries exceed four; the target is three.
        let mut kept: Vec<String> = store.entries().into_iter().map(|e| e.id).collect();
        kept.sort();
        assert_eq!(kept, vec!["broken", "m2", "m3"]);
        let prunes = audit.entries_by_action("memory_prune");
        let audited: Vec<&str> = prunes
            .iter()
            .map(|e| e.state_before["id"].as_str().unwrap())
            .collect();
        assert_eq!(audited, vec!["m0", "m1"]);
        assert!(audit.verify_all().valid);
    }

    #[test]
    fn get_counts_as_access() {
        let (_, store) = store(10);
        store.write(entry("m", 0)).unwrap();
        store.get("m").unwrap();
        store.get("m").unwrap();
        assert_eq!(store.retention().metadata("m").unwrap().access_count, 2);
    }
}
