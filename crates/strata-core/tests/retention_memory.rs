//! Bounded memory, provenance enforcement and tiered retention.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use strata_core::audit::{
    AuditLog, CompactionHook, CompactionOutcome, RetentionAction, RetentionConfig,
    RetentionPolicy, RetentionTier, TierPolicy,
};
use strata_core::{MemoryConfig, MemoryEntry, MemoryError, MemoryStore, Provenance, StrataConfig};

fn entry_at(id: &str, at: DateTime<Utc>) -> MemoryEntry {
    MemoryEntry::new(
        id,
        "observation",
        json!({ "text": format!("observation {id}") }),
        Provenance::new("task", "step").with_timestamp(at),
    )
}

#[test]
fn tiers_advance_one_step_per_evaluation() {
    let policy = RetentionPolicy::default();
    let now = Utc::now();
    let old = entry_at("old", now - Duration::days(60));
    policy.track_entry("old", RetentionTier::Hot);

    let mut seen = Vec::new();
    for _ in 0..5 {
        let decision = policy.evaluate_entry_at("old", &old, now).unwrap();
        seen.push((decision.target_tier, decision.action));
        policy.apply_decision(&decision).unwrap();
    }
    assert_eq!(
        seen,
        vec![
            (RetentionTier::Warm, RetentionAction::Summarize),
            (RetentionTier::Cold, RetentionAction::Summarize),
            (RetentionTier::Archived, RetentionAction::Archive),
            (RetentionTier::Archived, RetentionAction::Keep),
            (RetentionTier::Archived, RetentionAction::Keep),
        ]
    );
    assert!(policy.metadata("old").unwrap().transitioned_at.is_some());
}

#[test]
fn young_or_popular_entries_stay_put() {
    let policy = RetentionPolicy::default();
    let now = Utc::now();
    let young = entry_at("young", now - Duration::minutes(5));
    let popular = entry_at("popular", now - Duration::hours(3));
    policy.track_entry("young", RetentionTier::Hot);
    policy.track_entry("popular", RetentionTier::Hot);
    for _ in 0..10 {
        policy.record_access("popular");
    }

    for (id, e) in [("young", &young), ("popular", &popular)] {
        let d = policy.evaluate_entry_at(id, e, now).unwrap();
        assert_eq!(d.current_tier, RetentionTier::Hot);
        assert_eq!(d.target_tier, RetentionTier::Hot);
        assert_eq!(d.action, RetentionAction::Keep);
    }
}

#[test]
fn custom_config_changes_thresholds() {
    let config = StrataConfig::from_toml_str(
        r#"
        [retention.warm]
        max_age_secs = 10
        access_threshold = 100
        "#,
    )
    .unwrap();
    assert_eq!(config.retention.hot, RetentionConfig::default().hot);
    assert_eq!(config.retention.warm, TierPolicy::new(10, 100));

    let policy = RetentionPolicy::new(config.retention);
    let now = Utc::now();
    let e = entry_at("e", now - Duration::seconds(30));
    policy.track_entry("e", RetentionTier::Warm);
    let d = policy.evaluate_entry_at("e", &e, now).unwrap();
    assert_eq!(d.target_tier, RetentionTier::Cold);
}

#[derive(Default)]
struct CountingHook {
    summaries: AtomicUsize,
    archives: AtomicUsize,
}

impl CompactionHook for CountingHook {
    fn summarize(&self, entry: &MemoryEntry, _target: RetentionTier) -> Option<CompactionOutcome> {
        self.summaries.fetch_add(1, Ordering::SeqCst);
        let size = entry.content_size().ok()?;
        Some(CompactionOutcome {
            original_size: size,
            compressed_size: size / 4,
        })
    }

    fn archive(&self, entry: &MemoryEntry) -> Option<CompactionOutcome> {
        self.archives.fetch_add(1, Ordering::SeqCst);
        let size = entry.content_size().ok()?;
        Some(CompactionOutcome {
            original_size: size,
            compressed_size: 0,
        })
    }
}

#[test]
fn retention_passes_drive_compaction_hook() {
    let audit = Arc::new(AuditLog::new());
    let retention = Arc::new(RetentionPolicy::default());
    let memory = MemoryStore::new(audit, retention.clone(), MemoryConfig::default());
    let now = Utc::now();
    memory
        .write(entry_at("ancient", now - Duration::days(400)))
        .unwrap();
    memory.write(entry_at("recent", now)).unwrap();

    let hook = CountingHook::default();
    for _ in 0..3 {
        retention
            .run_pass(&memory.entries(), now, Some(&hook))
            .unwrap();
    }

    assert_eq!(hook.summaries.load(Ordering::SeqCst), 2);
    assert_eq!(hook.archives.load(Ordering::SeqCst), 1);

    let meta = retention.metadata("ancient").unwrap();
    assert_eq!(meta.tier, RetentionTier::Archived);
    assert_eq!(meta.summarized, Some(true));
    assert_eq!(meta.compressed_size, Some(0));
    let original = memory.entries()[0].content_size().unwrap();
    assert_eq!(meta.original_size, Some(original));

    let stats = retention.stats();
    assert_eq!(stats.tracked, 2);
    assert_eq!(stats.hot, 1);
    assert_eq!(stats.archived, 1);
}

#[test]
fn memory_store_prunes_to_eighty_percent() {
    let audit = Arc::new(AuditLog::new());
    let retention = Arc::new(RetentionPolicy::default());
    let memory = MemoryStore::new(
        audit.clone(),
        retention.clone(),
        MemoryConfig {
            max_entries: 20,
            prune_ratio: 0.8,
        },
    );
    let base = Utc::now() - Duration::hours(1);

    // Written newest first so pruning has to sort by provenance time.
    for i in (0..21).rev() {
        memory
            .write(entry_at(&format!("m{i:02}"), base + Duration::seconds(i)))
            .unwrap();
    }

    assert_eq!(memory.len(), 16);
    for i in 0..5 {
        let id = format!("m{i:02}");
        assert!(memory.get(&id).is_none(), "{id} should be pruned");
        assert!(!retention.is_tracked(&id));
    }
    assert!(memory.get("m05").is_some());

    let prunes = audit.entries_by_action("memory_prune");
    assert_eq!(prunes.len(), 5);
    assert!(prunes.iter().all(|e| e.actor == "system"));
    assert!(audit.verify_all().valid);
    assert_eq!(retention.stats().tracked, 16);
}

#[test]
fn writes_without_provenance_are_rejected() {
    let audit = Arc::new(AuditLog::new());
    let memory = MemoryStore::new(
        audit.clone(),
        Arc::new(RetentionPolicy::default()),
        MemoryConfig::default(),
    );
    let mut entry = entry_at("m", Utc::now());
    entry.provenance.step_id = String::new();

    assert!(matches!(memory.write(entry), Err(MemoryError::Validation(_))));
    assert!(memory.is_empty());
    assert!(audit.is_empty());
}
