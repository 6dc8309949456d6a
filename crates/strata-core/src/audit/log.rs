//! Append-only, hash-chained audit log.
//!
//! Each entry's `content_hash` is the SHA-256 of the canonical JSON of the
//! entry with `content_hash` itself removed. The hash covers
//! `previous_hash`, so rewriting any entry breaks the chain after it as
//! well as its own hash. Absent optional fields are omitted from the
//! hashed form rather than written as `null`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_store::{Collection, RecordStore};
use tracing::debug;
use uuid::Uuid;

use super::AuditResult;
use crate::hashing::{canonical_json, compute_digest, HashResult};
use crate::memory::provenance::{require, Provenance};
use crate::metrics::METRICS;
use crate::obs::emit_audit_appended;
use crate::persist::WriteBehind;
use crate::Metadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDiff {
    pub before: Value,
    pub after: Value,
    /// Whether `before` and `after` differ in canonical form.
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub state_before: Value,
    pub state_after: Value,
    pub diff: AuditDiff,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    /// `content_hash` of the entry appended just before this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    pub content_hash: String,
}

/// An audit record before it is stamped and hashed.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor: String,
    pub action: String,
    pub state_before: Value,
    pub state_after: Value,
    pub metadata: Option<Metadata>,
    pub source_event_ids: Option<Vec<String>>,
    pub provenance: Option<Provenance>,
}

impl AuditEvent {
    pub fn new(actor: &str, action: &str, state_before: Value, state_after: Value) -> Self {
        Self {
            actor: actor.to_string(),
            action: action.to_string(),
            state_before,
            state_after,
            metadata: None,
            source_event_ids: None,
            provenance: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_source_events<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_event_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub valid: bool,
    /// Entries whose hash does not match or whose chain link is broken.
    pub invalid_entries: Vec<String>,
}

/// Hash of `entry` with its `content_hash` field excluded.
pub fn compute_entry_hash(entry: &AuditLogEntry) -> HashResult<String> {
    let mut value = serde_json::to_value(entry)?;
    if let Value::Object(map) = &mut value {
        map.remove("content_hash");
    }
    compute_digest(&value)
}

/// Whether the stored `content_hash` matches the entry's content.
pub fn verify_entry_record(entry: &AuditLogEntry) -> bool {
    matches!(compute_entry_hash(entry), Ok(hash) if hash == entry.content_hash)
}

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<AuditLogEntry>,
    index: HashMap<String, usize>,
}

impl LogInner {
    fn push(&mut self, entry: AuditLogEntry) {
        let position = self.entries.len();
        self.index.insert(entry.id.clone(), position);
        self.entries.push(entry);
    }
}

pub struct AuditLog {
    inner: RwLock<LogInner>,
    persistence: Option<WriteBehind>,
    last_sequence: u64,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LogInner::default()),
            persistence: None,
            last_sequence: 0,
        }
    }

    pub fn with_persistence(mut self, writer: WriteBehind) -> Self {
        writer.resume_after(self.last_sequence);
        self.persistence = Some(writer);
        self
    }

    /// Rebuild a log from persisted entries, in their original append order.
    ///
    /// Stored hashes are kept as loaded; run [`AuditLog::verify_all`] to
    /// detect tampering at rest.
    pub async fn hydrate(store: &dyn RecordStore) -> AuditResult<Self> {
        let records = store.load_all(Collection::AuditEntry).await?;
        let mut log = Self::new();
        {
            let inner = log.inner.get_mut();
            for record in records {
                log.last_sequence = log.last_sequence.max(record.sequence);
                inner.push(serde_json::from_value(record.body)?);
            }
        }
        debug!(entries = log.len(), "audit log hydrated");
        Ok(log)
    }

    pub fn log_action(
        &self,
        actor: &str,
        action: &str,
        state_before: Value,
        state_after: Value,
        metadata: Option<Metadata>,
    ) -> AuditResult<AuditLogEntry> {
        let mut event = AuditEvent::new(actor, action, state_before, state_after);
        event.metadata = metadata;
        self.log_event(event)
    }

    /// Stamp, hash and append `event`. Nothing is appended on error.
    pub fn log_event(&self, event: AuditEvent) -> AuditResult<AuditLogEntry> {
        require("actor", &event.actor)?;
        require("action", &event.action)?;
        if let Some(provenance) = &event.provenance {
            provenance.validate()?;
        }
        let changed = canonical_json(&event.state_before)? != canonical_json(&event.state_after)?;

        let mut inner = self.inner.write();
        let mut entry = AuditLogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            actor: event.actor,
            action: event.action,
            diff: AuditDiff {
                before: event.state_before.clone(),
                after: event.state_after.clone(),
                changed,
            },
            state_before: event.state_before,
            state_after: event.state_after,
            metadata: event.metadata,
            source_event_ids: event.source_event_ids,
            provenance: event.provenance,
            previous_hash: inner.entries.last().map(|e| e.content_hash.clone()),
            content_hash: String::new(),
        };
        entry.content_hash = compute_entry_hash(&entry)?;
        inner.push(entry.clone());

        if let Some(writer) = &self.persistence {
            let task_id = entry.provenance.as_ref().map(|p| p.task_id.as_str());
            writer.enqueue(
                Collection::AuditEntry,
                &entry.id,
                task_id,
                entry.timestamp,
                &entry,
            );
        }
        drop(inner);

        METRICS.inc_audit_entries();
        emit_audit_appended(&entry.id, &entry.actor, &entry.action);
        Ok(entry)
    }

    /// `false` for unknown ids.
    pub fn verify_entry(&self, id: &str) -> bool {
        let inner = self.inner.read();
        inner
            .index
            .get(id)
            .map(|&i| verify_entry_record(&inner.entries[i]))
            .unwrap_or(false)
    }

    /// Check every hash and every chain link.
    pub fn verify_all(&self) -> VerificationReport {
        let inner = self.inner.read();
        let mut invalid_entries = Vec::new();
        let mut previous: Option<&str> = None;
        for entry in &inner.entries {
            let linked = entry.previous_hash.as_deref() == previous;
            if !linked || !verify_entry_record(entry) {
                invalid_entries.push(entry.id.clone());
            }
            previous = Some(entry.content_hash.as_str());
        }
        VerificationReport {
            valid: invalid_entries.is_empty(),
            invalid_entries,
        }
    }

    pub fn get(&self, id: &str) -> Option<AuditLogEntry> {
        let inner = self.inner.read();
        inner.index.get(id).map(|&i| inner.entries[i].clone())
    }

    /// All entries in append order.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.inner.read().entries.clone()
    }

    pub fn entries_for_task(&self, task_id: &str) -> Vec<AuditLogEntry> {
        self.filtered(|e| e.provenance.as_ref().is_some_and(|p| p.task_id == task_id))
    }

    /// Entries that name `event_id` among their source events.
    pub fn entries_for_event(&self, event_id: &str) -> Vec<AuditLogEntry> {
        self.filtered(|e| {
            e.source_event_ids
                .as_ref()
                .is_some_and(|ids| ids.iter().any(|id| id == event_id))
        })
    }

    pub fn entries_by_action(&self, action: &str) -> Vec<AuditLogEntry> {
        self.filtered(|e| e.action == action)
    }

    fn filtered(&self, keep: impl Fn(&AuditLogEntry) -> bool) -> Vec<AuditLogEntry> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| keep(e))
            .cloned()
            .collect()
    }

    pub fn last_hash(&self) -> Option<String> {
        self.inner.read().entries.last().map(|e| e.content_hash.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn tamper(&self, id: &str, edit: impl FnOnce(&mut AuditLogEntry)) {
        let mut inner = self.inner.write();
        if let Some(&i) = inner.index.get(id) {
            edit(&mut inner.entries[i]);
        }
    }
}
