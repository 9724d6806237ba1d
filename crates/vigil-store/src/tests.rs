use crate::store::{AlertStore, StoreOptions};
use crate::table::AlertTable;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use vigil_common::types::{Alert, AlertFields, AlertLevel, KEY_ATTRIBUTE, KEY_BACK_TO_NORMAL, KEY_LEVEL, KEY_PATTERN};

fn setup() -> (TempDir, AlertStore) {
    let dir = TempDir::new().unwrap();
    let store = AlertStore::open(dir.path(), StoreOptions::default()).unwrap();
    (dir, store)
}

fn event(level: &str, attribute: &str, pattern: &str, back_to_normal: bool) -> HashMap<String, Value> {
    let mut bag = HashMap::new();
    bag.insert(KEY_LEVEL.to_string(), json!(level));
    bag.insert(KEY_ATTRIBUTE.to_string(), json!(attribute));
    bag.insert(KEY_PATTERN.to_string(), json!(pattern));
    bag.insert(KEY_BACK_TO_NORMAL.to_string(), json!(back_to_normal));
    bag
}

fn fields(level: AlertLevel, attribute: &str, pattern: &str, back_to_normal: bool) -> AlertFields {
    AlertFields {
        level,
        attribute: attribute.to_string(),
        pattern: pattern.to_string(),
        back_to_normal,
        properties: HashMap::new(),
    }
}

fn open_alerts(alerts: &[Alert]) -> Vec<&Alert> {
    alerts.iter().filter(|a| !a.back_to_normal).collect()
}

#[test]
fn repeated_firings_keep_one_open_alert() {
    let (_dir, store) = setup();

    let first = store
        .store(&event("error", "systemload.average", "matches:.*[5-9][0-9]", false))
        .unwrap()
        .unwrap();
    for _ in 0..4 {
        let uuid = store
            .store(&event("error", "systemload.average", "matches:.*[5-9][0-9]", false))
            .unwrap()
            .unwrap();
        assert_eq!(uuid, first);
    }

    let alerts = store.list();
    assert_eq!(alerts.len(), 1);
    assert_eq!(open_alerts(&alerts).len(), 1);
    assert_eq!(alerts[0].uuid, first);
}

#[test]
fn different_dedup_keys_coexist() {
    let (_dir, store) = setup();

    store.store(&event("error", "heap.used", "range:[90,100]", false)).unwrap();
    store.store(&event("warn", "heap.used", "range:[90,100]", false)).unwrap();
    store.store(&event("error", "heap.used", "range:[95,100]", false)).unwrap();
    store.store(&event("error", "thread.count", "range:[90,100]", false)).unwrap();

    assert_eq!(store.list().len(), 4);
}

#[test]
fn recovery_closes_the_matching_open_alert() {
    let (_dir, store) = setup();

    let uuid = store
        .store(&event("error", "heap.used", "range:[90,100]", false))
        .unwrap()
        .unwrap();
    let closed_uuid = store
        .store(&event("error", "heap.used", "range:[90,100]", true))
        .unwrap()
        .unwrap();
    assert_eq!(closed_uuid, uuid);

    let alerts = store.list();
    assert_eq!(alerts.len(), 1);
    assert!(open_alerts(&alerts).is_empty());
    assert!(alerts[0].back_to_normal);
    assert_eq!(alerts[0].uuid, uuid);
}

#[test]
fn redundant_recovery_is_a_no_op() {
    let (_dir, store) = setup();

    store.store(&event("error", "heap.used", "range:[90,100]", false)).unwrap();
    let result = store
        .store(&event("error", "thread.count", "range:[90,100]", true))
        .unwrap();
    assert!(result.is_none());
    assert_eq!(store.list().len(), 1);

    // Repeated recoveries for an already-closed condition stay no-ops.
    store.store(&event("error", "heap.used", "range:[90,100]", true)).unwrap();
    for _ in 0..3 {
        let result = store
            .store(&event("error", "heap.used", "range:[90,100]", true))
            .unwrap();
        assert!(result.is_none());
    }
    assert_eq!(store.list().len(), 1);
}

#[test]
fn refire_after_recovery_creates_a_new_alert() {
    let (_dir, store) = setup();

    let first = store
        .store(&event("error", "heap.used", "range:[90,100]", false))
        .unwrap()
        .unwrap();
    store.store(&event("error", "heap.used", "range:[90,100]", true)).unwrap();
    let second = store
        .store(&event("error", "heap.used", "range:[90,100]", false))
        .unwrap()
        .unwrap();

    assert_ne!(first, second);
    let alerts = store.list();
    assert_eq!(alerts.len(), 2);
    assert_eq!(open_alerts(&alerts).len(), 1);
}

#[test]
fn invalid_events_are_rejected_and_not_stored() {
    let (_dir, store) = setup();

    let mut bag = event("error", "heap.used", "range:[90,100]", false);
    bag.remove(KEY_ATTRIBUTE);
    assert!(store.store(&bag).is_err());

    let mut bag = event("error", "heap.used", "range:[90,100]", false);
    bag.insert(KEY_LEVEL.to_string(), json!("fatal"));
    assert!(store.store(&bag).is_err());

    assert!(store.list().is_empty());
}

#[test]
fn query_by_uuid_is_exact() {
    let (_dir, store) = setup();

    let uuid = store
        .store(&event("error", "heap.used", "range:[90,100]", false))
        .unwrap()
        .unwrap();
    store.store(&event("warn", "thread.count", "range:[400,]", false)).unwrap();

    let matched = store.query(&format!("alertUUID:{uuid}"));
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].uuid, uuid);

    // Prefix of a real uuid matches nothing.
    let matched = store.query(&format!("alertUUID:{}", &uuid[..8]));
    assert!(matched.is_empty());
}

#[test]
fn query_by_collector_property() {
    let (_dir, store) = setup();

    let mut bag = event("error", "heap.used", "range:[90,100]", false);
    bag.insert("hostName".to_string(), json!("web-01"));
    store.store(&bag).unwrap();
    let mut bag = event("error", "thread.count", "range:[400,]", false);
    bag.insert("hostName".to_string(), json!("db-01"));
    store.store(&bag).unwrap();

    let matched = store.query("hostName:web-01");
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].attribute, "heap.used");

    assert_eq!(store.query("").len(), 2);
    assert!(store.query("malformed token").is_empty());
}

#[test]
fn flag_tags_matching_alerts() {
    let (_dir, store) = setup();

    store.store(&event("error", "heap.used", "range:[90,100]", false)).unwrap();
    store.store(&event("warn", "thread.count", "range:[400,]", false)).unwrap();

    let count = store.flag("alertLevel:error", "high-heap");
    assert_eq!(count, 1);
    let flagged = store.query("alertRule:high-heap");
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].rule_name.as_deref(), Some("high-heap"));

    // Zero matches is not an error.
    assert_eq!(store.flag("alertLevel:error alertAttribute:nope", "x"), 0);
}

#[test]
fn delete_by_uuid_removes_one_alert() {
    let (_dir, store) = setup();

    let uuid = store
        .store(&event("error", "heap.used", "range:[90,100]", false))
        .unwrap()
        .unwrap();
    store.store(&event("warn", "thread.count", "range:[400,]", false)).unwrap();

    assert_eq!(store.delete(&format!("uuid:{uuid}")), 1);
    assert_eq!(store.list().len(), 1);
    assert!(store.query(&format!("uuid:{uuid}")).is_empty());
}

#[test]
fn delete_then_refire_opens_a_fresh_alert() {
    let (_dir, store) = setup();

    let first = store
        .store(&event("error", "heap.used", "range:[90,100]", false))
        .unwrap()
        .unwrap();
    store.delete(&format!("uuid:{first}"));

    let second = store
        .store(&event("error", "heap.used", "range:[90,100]", false))
        .unwrap()
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(store.list().len(), 1);
}

#[test]
fn cleanup_removes_only_closed_alerts() {
    let (_dir, store) = setup();

    store.store(&event("error", "heap.used", "range:[90,100]", false)).unwrap();
    store.store(&event("warn", "thread.count", "range:[400,]", false)).unwrap();
    store.store(&event("warn", "thread.count", "range:[400,]", true)).unwrap();

    assert_eq!(store.cleanup(), 1);
    let alerts = store.list();
    assert_eq!(alerts.len(), 1);
    assert!(!alerts[0].back_to_normal);

    // Nothing closed left: cleanup is idempotent.
    assert_eq!(store.cleanup(), 0);
}

#[test]
fn eviction_boundary_is_strict() {
    let now = Utc::now();
    let cutoff = now - Duration::days(7);
    let mut table = AlertTable::new();

    // Closed, exactly at the cutoff: retained.
    let at = table
        .upsert(fields(AlertLevel::Warn, "heap.used", "a", false), cutoff)
        .uuid()
        .unwrap()
        .to_string();
    table.upsert(fields(AlertLevel::Warn, "heap.used", "a", true), cutoff);

    // Closed, one microsecond older: evicted.
    let older = cutoff - Duration::microseconds(1);
    table.upsert(fields(AlertLevel::Warn, "heap.used", "b", false), older);
    table.upsert(fields(AlertLevel::Warn, "heap.used", "b", true), older);

    // Open and ancient: never evicted.
    let open = table
        .upsert(fields(AlertLevel::Error, "heap.used", "c", false), cutoff - Duration::days(365))
        .uuid()
        .unwrap()
        .to_string();

    let removed = table.evict_older_than(cutoff);
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].pattern, "b");

    let remaining: Vec<String> = table.get_all().into_iter().map(|a| a.uuid).collect();
    assert!(remaining.contains(&at));
    assert!(remaining.contains(&open));
}

#[test]
fn store_eviction_respects_retention_option() {
    let dir = TempDir::new().unwrap();
    let store = AlertStore::open(
        dir.path(),
        StoreOptions {
            retention: Duration::days(365),
        },
    )
    .unwrap();

    store.store(&event("warn", "heap.used", "range:[80,100]", false)).unwrap();
    store.store(&event("warn", "heap.used", "range:[80,100]", true)).unwrap();

    // Closed moments ago, retention a year: nothing to evict.
    assert_eq!(store.evict(), 0);
    assert_eq!(store.list().len(), 1);
}

#[test]
fn persistence_round_trip_preserves_open_closed_sets() {
    let dir = TempDir::new().unwrap();
    let store = AlertStore::open(dir.path(), StoreOptions::default()).unwrap();

    let open_uuid = store
        .store(&event("error", "heap.used", "range:[90,100]", false))
        .unwrap()
        .unwrap();
    store.store(&event("warn", "thread.count", "range:[400,]", false)).unwrap();
    store.store(&event("warn", "thread.count", "range:[400,]", true)).unwrap();
    store.flush().unwrap();
    drop(store);

    let reloaded = AlertStore::open(dir.path(), StoreOptions::default()).unwrap();
    let alerts = reloaded.list();
    assert_eq!(alerts.len(), 2);

    let open: Vec<&Alert> = open_alerts(&alerts);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].uuid, open_uuid, "uuids survive a reload");
    assert_eq!(open[0].attribute, "heap.used");

    let closed = alerts.iter().find(|a| a.back_to_normal).unwrap();
    assert_eq!(closed.attribute, "thread.count");

    // The reloaded dedup index still refuses duplicates.
    let refired = reloaded
        .store(&event("error", "heap.used", "range:[90,100]", false))
        .unwrap()
        .unwrap();
    assert_eq!(refired, open_uuid);
}

#[test]
fn deactivate_reactivate_scenario() {
    let dir = TempDir::new().unwrap();
    let store = AlertStore::open(dir.path(), StoreOptions::default()).unwrap();

    store
        .store(&event("error", "log service unavailable", "", false))
        .unwrap();
    store
        .store(&event("warn", "file service stopped", "", false))
        .unwrap();
    store.flush().unwrap();

    let content = std::fs::read_to_string(dir.path().join("alerter.db")).unwrap();
    assert_eq!(content.lines().count(), 2);
    drop(store);

    let reloaded = AlertStore::open(dir.path(), StoreOptions::default()).unwrap();
    assert!(reloaded.known("log service unavailable", AlertLevel::Error));
    assert!(reloaded.known("file service stopped", AlertLevel::Warn));
    assert!(!reloaded.known("log service unavailable", AlertLevel::Warn));
    assert!(!reloaded.known("other service", AlertLevel::Error));
}

#[test]
fn legacy_file_populates_known() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("alerter.db"),
        "error:log service unavailable\nwarn:file service stopped\n",
    )
    .unwrap();

    let store = AlertStore::open(dir.path(), StoreOptions::default()).unwrap();
    assert_eq!(store.list().len(), 2);
    assert!(store.known("log service unavailable", AlertLevel::Error));
    assert!(store.known("file service stopped", AlertLevel::Warn));
}

#[test]
fn known_uuids_lists_every_alert() {
    let (_dir, store) = setup();

    assert!(store.known_uuids().is_empty());
    let a = store.store(&event("error", "heap.used", "x", false)).unwrap().unwrap();
    let b = store.store(&event("warn", "thread.count", "y", false)).unwrap().unwrap();

    let uuids = store.known_uuids();
    assert_eq!(uuids.len(), 2);
    assert!(uuids.contains(&a));
    assert!(uuids.contains(&b));
}

#[test]
fn concurrent_stores_never_duplicate_open_alerts() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(AlertStore::open(dir.path(), StoreOptions::default()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    store
                        .store(&event("error", "heap.used", "range:[90,100]", false))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let alerts = store.list();
    assert_eq!(alerts.len(), 1);
    assert!(!alerts[0].back_to_normal);
}
