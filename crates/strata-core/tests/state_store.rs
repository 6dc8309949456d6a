//! End-to-end behaviour of the versioned state store.

use std::sync::Arc;

use serde_json::{json, Value};

use strata_core::state::{retry_on_conflict, DiffOperation, RetryPolicy};
use strata_core::{StateError, VersionedStateStore};

#[test]
fn create_update_then_stale_update_conflicts() {
    let store: VersionedStateStore<Value> = VersionedStateStore::new();

    let created = store.create("user:1", json!({"name": "A"}), None).unwrap();
    assert_eq!(created.version, 1);

    let updated = store.update("user:1", json!({"name": "B"}), 1, None).unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.value, json!({"name": "B"}));

    let err = store
        .update("user:1", json!({"name": "C"}), 1, None)
        .unwrap_err();
    assert_eq!(
        err,
        StateError::Conflict {
            key: "user:1".to_string(),
            expected_version: 1,
            actual_version: 2,
        }
    );
    assert_eq!(store.read("user:1").unwrap().value, json!({"name": "B"}));
}

#[test]
fn diff_of_unchanged_snapshots_is_empty() {
    let store: VersionedStateStore<Value> = VersionedStateStore::new();
    store.create("a", json!(1), None).unwrap();
    store.create("b", json!(2), None).unwrap();

    let first = store.snapshot();
    let second = store.snapshot();
    assert!(store.diff(&first, &second).is_empty());
}

#[test]
fn diff_after_one_update_names_only_that_key() {
    let store: VersionedStateStore<Value> = VersionedStateStore::new();
    store.create("a", json!(1), None).unwrap();
    store.create("b", json!(2), None).unwrap();
    let before = store.snapshot();

    store.update("b", json!(3), 1, None).unwrap();
    let after = store.snapshot();

    let diffs = store.diff(&before, &after);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].key, "b");
    assert_eq!(diffs[0].operation, DiffOperation::Update);
    assert_eq!(diffs[0].before.as_ref().unwrap().value, json!(2));
    assert_eq!(diffs[0].after.as_ref().unwrap().value, json!(3));
}

#[test]
fn diff_reports_creates_and_deletes() {
    let store: VersionedStateStore<Value> = VersionedStateStore::new();
    store.create("gone", json!(true), None).unwrap();
    let before = store.snapshot();

    store.delete("gone", 1).unwrap();
    store.create("new", json!(false), None).unwrap();
    let after = store.snapshot();

    let mut ops: Vec<(String, DiffOperation)> = store
        .diff(&before, &after)
        .into_iter()
        .map(|d| (d.key, d.operation))
        .collect();
    ops.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        ops,
        vec![
            ("gone".to_string(), DiffOperation::Delete),
            ("new".to_string(), DiffOperation::Create),
        ]
    );
}

#[test]
fn stale_delete_conflicts_and_keeps_key() {
    let store: VersionedStateStore<Value> = VersionedStateStore::new();
    store.create("k", json!(1), None).unwrap();
    store.update("k", json!(2), 1, None).unwrap();

    let err = store.delete("k", 1).unwrap_err();
    assert!(matches!(
        err,
        StateError::Conflict {
            expected_version: 1,
            actual_version: 2,
            ..
        }
    ));
    assert_eq!(store.read("k").unwrap().version, 2);
}

#[test]
fn delete_then_create_restarts_history() {
    let store: VersionedStateStore<Value> = VersionedStateStore::new();
    store.create("k", json!(1), None).unwrap();
    store.update("k", json!(2), 1, None).unwrap();
    store.delete("k", 2).unwrap();

    let recreated = store.create("k", json!("fresh"), None).unwrap();
    assert_eq!(recreated.version, 1);
    assert_eq!(store.history("k").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn contended_increments_all_land_with_retry() {
    let store: Arc<VersionedStateStore<Value>> = Arc::new(VersionedStateStore::new());
    store.create("counter", json!(0), None).unwrap();

    let policy = RetryPolicy {
        max_attempts: 50,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
    };

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let policy = policy.clone();
        tasks.push(tokio::spawn(async move {
            retry_on_conflict(&policy, |_| {
                let current = store.read("counter").ok_or(StateError::NotFound {
                    key: "counter".to_string(),
                })?;
                let next = current.value.as_i64().unwrap_or(0) + 1;
                store.update("counter", json!(next), current.version, None)
            })
            .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let last = store.read("counter").unwrap();
    assert_eq!(last.value, json!(8));
    assert_eq!(last.version, 9);
    let versions: Vec<u64> = store.history("counter").iter().map(|e| e.version).collect();
    assert_eq!(versions, (1..=9).collect::<Vec<_>>());
}
