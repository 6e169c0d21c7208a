//! Tests for snapshot capture determinism and append-only semantics.

use serde_json::json;

use super::*;
use crate::authority::AuthorityStore;
use crate::config::KernelConfig;
use crate::context::ContextDraft;

fn frozen(path: &str) -> (Context, Intent) {
    let draft = ContextDraft::new("file.read", "alice")
        .with_confidence(0.9)
        .with_field("path", path);
    let context = Context::freeze(draft, 10, &KernelConfig::default()).expect("freeze");
    let intent = Intent::of(&context);
    (context, intent)
}

fn grant() -> Grant {
    let store = AuthorityStore::new();
    store
        .issue("alice", "file.read", json!({"prefix": "/tmp/"}), 0, 60_000, Some(1), true)
        .expect("issue")
}

fn capture(path: &str) -> Snapshot {
    let (context, intent) = frozen(path);
    Snapshot::capture(&context, &intent, &grant(), "scope-hash".to_string(), 1, 10, Some(0))
        .expect("capture")
}

#[test]
fn capture_hashes_are_deterministic() {
    let a = capture("/tmp/x");
    let b = capture("/tmp/x");
    assert_eq!(a.context_hash, b.context_hash);
    assert_eq!(a.intent_hash, b.intent_hash);
    assert_ne!(a.snapshot_id, b.snapshot_id);
}

#[test]
fn capture_hashes_differ_for_different_inputs() {
    let a = capture("/tmp/x");
    let b = capture("/tmp/y");
    assert_ne!(a.context_hash, b.context_hash);
    assert_ne!(a.intent_hash, b.intent_hash);
}

#[test]
fn insert_refuses_duplicate_ids() {
    let store = SnapshotStore::new();
    let snapshot = capture("/tmp/x");
    let id = snapshot.snapshot_id.clone();
    store.insert(snapshot.clone()).expect("first insert");
    assert_eq!(
        store.insert(snapshot),
        Err(SnapshotError::ReuseAttempt { snapshot_id: id })
    );
}

#[test]
fn each_snapshot_validates_exactly_once() {
    let store = SnapshotStore::new();
    let snapshot = capture("/tmp/x");
    let id = snapshot.snapshot_id.clone();
    store.insert(snapshot).expect("insert");

    store.mark_validated(&id).expect("first validation");
    assert_eq!(
        store.mark_validated(&id),
        Err(SnapshotError::ReuseAttempt { snapshot_id: id })
    );
}

#[test]
fn validating_unknown_snapshot_is_not_found() {
    let store = SnapshotStore::new();
    assert_eq!(
        store.mark_validated("SNP-missing"),
        Err(SnapshotError::NotFound {
            snapshot_id: "SNP-missing".to_string()
        })
    );
}

#[test]
fn list_filters_and_orders_by_recency() {
    let store = SnapshotStore::new();
    let first = capture("/tmp/a");
    let second = capture("/tmp/b");
    let first_id = first.snapshot_id.clone();
    let second_id = second.snapshot_id.clone();
    store.insert(first).expect("insert");
    store.insert(second).expect("insert");

    let listed = store.list(Some("alice"), Some("file.read"), 10);
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].snapshot_id, second_id);
    assert_eq!(listed[1].snapshot_id, first_id);

    assert!(store.list(Some("bob"), None, 10).is_empty());
    assert_eq!(store.list(None, None, 1).len(), 1);
}

#[test]
fn statistics_count_by_capability() {
    let store = SnapshotStore::new();
    store.insert(capture("/tmp/a")).expect("insert");
    store.insert(capture("/tmp/b")).expect("insert");
    let stats = store.statistics();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_capability.get("file.read"), Some(&2));
}
