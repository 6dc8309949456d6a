//! Tiered retention: decides when memory entries move HOT → WARM → COLD →
//! ARCHIVED.
//!
//! The policy only decides. Summarizing and archiving content is delegated
//! to a [`CompactionHook`] supplied by the caller.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AuditError, AuditResult};
use crate::memory::MemoryEntry;
use crate::obs::emit_retention_transition;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetentionTier {
    #[default]
    Hot,
    Warm,
    Cold,
    Archived,
}

impl RetentionTier {
    /// The tier one step colder; `ARCHIVED` stays put.
    pub fn next(self) -> Self {
        match self {
            Self::Hot => Self::Warm,
            Self::Warm => Self::Cold,
            Self::Cold | Self::Archived => Self::Archived,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "HOT",
            Self::Warm => "WARM",
            Self::Cold => "COLD",
            Self::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for RetentionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub max_age_secs: u64,
    /// Entries accessed at least this often stay in the tier regardless of age.
    pub access_threshold: u64,
}

impl TierPolicy {
    pub const fn new(max_age_secs: u64, access_threshold: u64) -> Self {
        Self {
            max_age_secs,
            access_threshold,
        }
    }
}

/// Tier thresholds. When deserialized, a missing tier or field keeps that
/// tier's default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PartialRetentionConfig")]
pub struct RetentionConfig {
    pub hot: TierPolicy,
    pub warm: TierPolicy,
    pub cold: TierPolicy,
    pub archived: TierPolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialTierPolicy {
    max_age_secs: Option<u64>,
    access_threshold: Option<u64>,
}

impl PartialTierPolicy {
    fn over(self, base: TierPolicy) -> TierPolicy {
        TierPolicy {
            max_age_secs: self.max_age_secs.unwrap_or(base.max_age_secs),
            access_threshold: self.access_threshold.unwrap_or(base.access_threshold),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialRetentionConfig {
    hot: PartialTierPolicy,
    warm: PartialTierPolicy,
    cold: PartialTierPolicy,
    archived: PartialTierPolicy,
}

impl From<PartialRetentionConfig> for RetentionConfig {
    fn from(partial: PartialRetentionConfig) -> Self {
        let base = Self::default();
        Self {
            hot: partial.hot.over(base.hot),
            warm: partial.warm.over(base.warm),
            cold: partial.cold.over(base.cold),
            archived: partial.archived.over(base.archived),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            hot: TierPolicy::new(3_600, 10),
            warm: TierPolicy::new(86_400, 5),
            cold: TierPolicy::new(604_800, 2),
            archived: TierPolicy::new(2_592_000, 0),
        }
    }
}

impl RetentionConfig {
    pub fn policy_for(&self, tier: RetentionTier) -> &TierPolicy {
        match tier {
            RetentionTier::Hot => &self.hot,
            RetentionTier::Warm => &self.warm,
            RetentionTier::Cold => &self.cold,
            RetentionTier::Archived => &self.archived,
        }
    }
}

/// Per-entry retention bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionMetadata {
    pub tier: RetentionTier,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitioned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarized: Option<bool>,
}

impl RetentionMetadata {
    fn new(tier: RetentionTier, now: DateTime<Utc>) -> Self {
        Self {
            tier,
            last_accessed: now,
            access_count: 0,
            transitioned_at: None,
            original_size: None,
            compressed_size: None,
            summarized: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionAction {
    Keep,
    /// Tier change that needs no compaction work.
    Transition,
    Summarize,
    Archive,
}

impl RetentionAction {
    fn between(current: RetentionTier, target: RetentionTier) -> Self {
        match target {
            _ if target == current => Self::Keep,
            RetentionTier::Warm | RetentionTier::Cold => Self::Summarize,
            RetentionTier::Archived => Self::Archive,
            RetentionTier::Hot => Self::Transition,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionDecision {
    pub entry_id: String,
    pub current_tier: RetentionTier,
    pub target_tier: RetentionTier,
    pub reason: String,
    pub action: RetentionAction,
}

/// Sizes reported back by a compaction hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionOutcome {
    pub original_size: u64,
    pub compressed_size: u64,
}

/// Caller-supplied summarizer/archiver run by [`RetentionPolicy::run_pass`].
///
/// Return `None` to leave the content as is; the tier still changes.
pub trait CompactionHook: Send + Sync {
    fn summarize(&self, entry: &MemoryEntry, target: RetentionTier) -> Option<CompactionOutcome>;

    fn archive(&self, entry: &MemoryEntry) -> Option<CompactionOutcome>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPassReport {
    /// One decision per tracked entry examined.
    pub decisions: Vec<RetentionDecision>,
    pub transitioned: usize,
    pub compacted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionStats {
    pub tracked: usize,
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
    pub archived: usize,
    pub summarized: usize,
    pub total_accesses: u64,
}

pub struct RetentionPolicy {
    config: RetentionConfig,
    tracked: RwLock<HashMap<String, RetentionMetadata>>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(RetentionConfig::default())
    }
}

impl RetentionPolicy {
    pub fn new(config: RetentionConfig) -> Self {
        Self {
            config,
            tracked: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Start tracking `id`. Already-tracked entries keep their metadata.
    pub fn track_entry(&self, id: &str, initial_tier: RetentionTier) {
        self.tracked
            .write()
            .entry(id.to_string())
            .or_insert_with(|| RetentionMetadata::new(initial_tier, Utc::now()));
    }

    /// Returns `false` if `id` is not tracked.
    pub fn record_access(&self, id: &str) -> bool {
        match self.tracked.write().get_mut(id) {
            Some(meta) => {
                meta.access_count += 1;
                meta.last_accessed = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn untrack(&self, id: &str) -> Option<RetentionMetadata> {
        self.tracked.write().remove(id)
    }

    pub fn metadata(&self, id: &str) -> Option<RetentionMetadata> {
        self.tracked.read().get(id).cloned()
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.tracked.read().contains_key(id)
    }

    pub fn evaluate_entry(&self, id: &str, entry: &MemoryEntry) -> AuditResult<RetentionDecision> {
        self.evaluate_entry_at(id, entry, Utc::now())
    }

    /// Decide where `id` belongs at `now`. Age is measured from the entry's
    /// provenance timestamp. At most one tier is advanced per evaluation.
    pub fn evaluate_entry_at(
        &self,
        id: &str,
        entry: &MemoryEntry,
        now: DateTime<Utc>,
    ) -> AuditResult<RetentionDecision> {
        let meta = self
            .metadata(id)
            .ok_or_else(|| AuditError::NotFound { id: id.to_string() })?;
        let current = meta.tier;
        let policy = self.config.policy_for(current);
        let age_secs = u64::try_from((now - entry.timestamp()).num_seconds()).unwrap_or(0);

        let (target, reason) = if meta.access_count >= policy.access_threshold {
            (
                current,
                format!(
                    "access count {} meets threshold {}",
                    meta.access_count, policy.access_threshold
                ),
            )
        } else if age_secs > policy.max_age_secs {
            let target = current.next();
            if target == current {
                (current, "already in terminal tier".to_string())
            } else {
                (
                    target,
                    format!("age {age_secs}s exceeds {}s for {current}", policy.max_age_secs),
                )
            }
        } else {
            (
                current,
                format!("age {age_secs}s within {}s for {current}", policy.max_age_secs),
            )
        };

        Ok(RetentionDecision {
            entry_id: id.to_string(),
            current_tier: current,
            target_tier: target,
            action: RetentionAction::between(current, target),
            reason,
        })
    }

    /// Move the entry to `decision.target_tier`.
    ///
    /// Only single forward steps are accepted; a decision targeting the
    /// current tier is a no-op.
    pub fn apply_decision(&self, decision: &RetentionDecision) -> AuditResult<RetentionMetadata> {
        self.apply_at(decision, Utc::now())
    }

    fn apply_at(
        &self,
        decision: &RetentionDecision,
        now: DateTime<Utc>,
    ) -> AuditResult<RetentionMetadata> {
        let mut tracked = self.tracked.write();
        let meta = tracked
            .get_mut(&decision.entry_id)
            .ok_or_else(|| AuditError::NotFound {
                id: decision.entry_id.clone(),
            })?;
        let from = meta.tier;
        let to = decision.target_tier;
        if to == from {
            return Ok(meta.clone());
        }
        if to != from.next() {
            return Err(AuditError::InvalidTransition {
                id: decision.entry_id.clone(),
                from,
                to,
            });
        }
        meta.tier = to;
        meta.transitioned_at = Some(now);
        let updated = meta.clone();
        drop(tracked);

        emit_retention_transition(&decision.entry_id, from.as_str(), to.as_str());
        Ok(updated)
    }

    /// Evaluate and apply every tracked entry in `entries`, running `hook`
    /// for entries that move into a compacting tier.
    pub fn run_pass(
        &self,
        entries: &[MemoryEntry],
        now: DateTime<Utc>,
        hook: Option<&dyn CompactionHook>,
    ) -> AuditResult<RetentionPassReport> {
        let mut report = RetentionPassReport::default();
        for entry in entries.iter().filter(|e| self.is_tracked(&e.id)) {
            let decision = self.evaluate_entry_at(&entry.id, entry, now)?;
            if decision.target_tier != decision.current_tier {
                self.apply_at(&decision, now)?;
                report.transitioned += 1;

                let outcome = hook.and_then(|hook| match decision.action {
                    RetentionAction::Summarize => hook.summarize(entry, decision.target_tier),
                    RetentionAction::Archive => hook.archive(entry),
                    RetentionAction::Keep | RetentionAction::Transition => None,
                });
                if let Some(outcome) = outcome {
                    self.record_compaction(&entry.id, decision.action, outcome);
                    report.compacted += 1;
                }
            }
            report.decisions.push(decision);
        }
        debug!(
            examined = report.decisions.len(),
            transitioned = report.transitioned,
            compacted = report.compacted,
            "retention pass complete"
        );
        Ok(report)
    }

    fn record_compaction(&self, id: &str, action: RetentionAction, outcome: CompactionOutcome) {
        if let Some(meta) = self.tracked.write().get_mut(id) {
            // The first measurement is the uncompacted size.
            meta.original_size.get_or_insert(outcome.original_size);
            meta.compressed_size = Some(outcome.compressed_size);
            if action == RetentionAction::Summarize {
                meta.summarized = Some(true);
            }
        }
    }

    pub fn stats(&self) -> RetentionStats {
        let tracked = self.tracked.read();
        let mut stats = RetentionStats {
            tracked: tracked.len(),
            ..RetentionStats::default()
        };
        for meta in tracked.values() {
            match meta.tier {
                RetentionTier::Hot => stats.hot += 1,
                RetentionTier::Warm => stats.warm += 1,
                RetentionTier::Cold => stats.cold += 1,
                RetentionTier::Archived => stats.archived += 1,
            }
            if meta.summarized == Some(true) {
                stats.summarized += 1;
            }
            stats.total_accesses += meta.access_count;
        }
        stats
    }
}
