//! Property tests for hashing and version sequencing.

use proptest::prelude::*;
use serde_json::{json, Value};

use strata_core::hashing::{canonical_json, compute_digest, hash_str, merkle_root, EMPTY_HASH};
use strata_core::VersionedStateStore;

fn hex_hash() -> impl Strategy<Value = String> {
    any::<u64>().prop_map(|n| hash_str(&n.to_string()))
}

proptest! {
    #[test]
    fn versions_are_dense_from_one(values in proptest::collection::vec(any::<i64>(), 1..40)) {
        let store: VersionedStateStore<Value> = VersionedStateStore::new();
        let mut version = store.create("k", json!(values[0]), None).unwrap().version;
        for v in &values[1..] {
            version = store.update("k", json!(v), version, None).unwrap().version;
        }
        let history: Vec<u64> = store.history("k").iter().map(|e| e.version).collect();
        let expected: Vec<u64> = (1..=values.len() as u64).collect();
        prop_assert_eq!(history, expected);
    }

    #[test]
    fn merkle_root_is_deterministic(hashes in proptest::collection::vec(hex_hash(), 0..20)) {
        let borrowed: Vec<&str> = hashes.iter().map(String::as_str).collect();
        prop_assert_eq!(merkle_root(&hashes), merkle_root(&borrowed));
    }

    #[test]
    fn merkle_root_is_order_sensitive(a in hex_hash(), b in hex_hash()) {
        prop_assume!(a != b);
        prop_assert_ne!(merkle_root(&[a.clone(), b.clone()]), merkle_root(&[b, a]));
    }

    #[test]
    fn single_leaf_is_its_own_root(a in hex_hash()) {
        prop_assert_eq!(merkle_root(&[a.clone()]), a);
    }

    #[test]
    fn canonical_form_ignores_key_order(
        pairs in proptest::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..10)
    ) {
        let forward: serde_json::Map<String, Value> =
            pairs.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        let reverse: serde_json::Map<String, Value> =
            pairs.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
        let forward = Value::Object(forward);
        let reverse = Value::Object(reverse);
        prop_assert_eq!(canonical_json(&forward).unwrap(), canonical_json(&reverse).unwrap());
        prop_assert_eq!(compute_digest(&forward).unwrap(), compute_digest(&reverse).unwrap());
    }
}

#[test]
fn empty_merkle_root_is_hash_of_empty_string() {
    let none: Vec<String> = Vec::new();
    assert_eq!(merkle_root(&none), EMPTY_HASH);
    assert_eq!(hash_str(""), EMPTY_HASH);
}
