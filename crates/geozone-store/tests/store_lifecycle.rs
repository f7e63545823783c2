use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use geozone_core::{Coordinate, ShapeRecord, ZoneColor};
use geozone_store::LocalStore;
use serde_json::Value;

fn seoul() -> Coordinate {
    Coordinate::new(37.5665, 126.9780).unwrap()
}

fn raw_entries(path: &std::path::Path) -> Vec<Value> {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn create_delete_reload_keeps_tombstone_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shapes.json");
    let store = LocalStore::open(&path).await;

    let a = ShapeRecord::circle("Test", seoul(), 100.0)
        .unwrap()
        .with_flight_window(Some(Utc::now()), Some(Utc::now() + Duration::days(7)));
    tokio_test::assert_ok!(store.add(a.clone()).await);

    let active = store.active_records();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].title, "Test");
    assert_eq!(active[0].id, a.id);

    assert!(store.soft_delete(a.id).await);
    assert!(store.active_records().is_empty());
    assert!(store.record(a.id).is_none());

    let reloaded = LocalStore::open(&path).await;
    assert!(reloaded.active_records().is_empty());

    let raw = raw_entries(&path);
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0]["id"], Value::String(a.id.to_string()));
    assert!(!raw[0]["deleted_at"].is_null());

    let all = reloaded.all_records().await;
    assert_eq!(all.len(), 1);
    assert!(all[0].deleted_at.is_some());
}

#[tokio::test]
async fn load_replaces_memory_with_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shapes.json");
    let first = LocalStore::open(&path).await;
    let second = LocalStore::open(&path).await;

    first.add(ShapeRecord::circle("from first", seoul(), 50.0).unwrap()).await.unwrap();
    assert!(second.active_records().is_empty());

    second.load().await;
    assert_eq!(second.active_records().len(), 1);
}

#[tokio::test]
async fn recolor_is_never_observed_half_applied() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path().join("shapes.json")).await;
    for i in 0..200 {
        let r = ShapeRecord::circle(format!("zone {i}"), seoul(), 10.0 + i as f64).unwrap();
        store.add(r).await.unwrap();
    }

    let red = ZoneColor::Red.to_hex();
    let green = ZoneColor::Green.to_hex();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let store = store.clone();
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut observed = 0usize;
            while !done.load(Ordering::Acquire) {
                let snapshot = store.snapshot();
                let reds = snapshot.iter().filter(|r| r.color == red).count();
                assert!(
                    reds == 0 || reds == snapshot.len(),
                    "mixed colours: {reds} of {}",
                    snapshot.len()
                );
                observed += 1;
                tokio::task::yield_now().await;
            }
            observed
        })
    };

    assert_eq!(store.bulk_recolor(green).await, 200);
    done.store(true, Ordering::Release);
    assert!(reader.await.unwrap() > 0);

    assert!(store.active_records().iter().all(|r| r.color == green));
}

#[tokio::test]
async fn recolor_reaches_tombstones_that_are_later_restored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shapes.json");
    let store = LocalStore::open(&path).await;
    let r = ShapeRecord::circle("hidden", seoul(), 10.0).unwrap();
    store.add(r.clone()).await.unwrap();
    store.soft_delete(r.id).await;

    store.bulk_recolor(ZoneColor::Purple.to_hex()).await;
    assert!(store.restore(r.id).await);

    assert_eq!(store.record(r.id).unwrap().color, ZoneColor::Purple.to_hex());
    let reopened = LocalStore::open(&path).await;
    assert_eq!(reopened.record(r.id).unwrap().color, ZoneColor::Purple.to_hex());
}

#[tokio::test]
async fn corrupt_file_starts_empty_and_keeps_a_copy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shapes.json");
    std::fs::write(&path, b"[{\"id\": ").unwrap();

    let store = LocalStore::open(&path).await;
    assert!(store.active_records().is_empty());
    assert!(store.is_dirty());
    assert_eq!(
        std::fs::read(dir.path().join("shapes.json.corrupt")).unwrap(),
        b"[{\"id\": "
    );

    store.add(ShapeRecord::circle("fresh", seoul(), 10.0).unwrap()).await.unwrap();
    assert!(!store.is_dirty());
    assert_eq!(raw_entries(&path).len(), 1);
}

#[tokio::test]
async fn undecodable_entries_survive_rewrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shapes.json");
    let good = ShapeRecord::circle("good", seoul(), 10.0).unwrap();
    let stray = serde_json::json!({ "title": "no id or coordinate" });
    let file = serde_json::json!([serde_json::to_value(&good).unwrap(), stray.clone()]);
    std::fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

    let store = LocalStore::open(&path).await;
    assert_eq!(store.active_records().len(), 1);

    store.add(ShapeRecord::circle("new", seoul(), 20.0).unwrap()).await.unwrap();
    let raw = raw_entries(&path);
    assert_eq!(raw.len(), 3);
    assert!(raw.contains(&stray));
}

#[tokio::test]
async fn legacy_file_loads_with_migrated_dates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shapes.json");
    let id = geozone_core::ShapeId::new();
    let legacy = serde_json::json!([{
        "id": id.to_string(),
        "title": "old zone",
        "base_coordinate": { "latitude": 37.5, "longitude": 127.0 },
        "radius": 300.0,
        "color": "#FF3B30",
        "started_at": 700_000_000.0,
        "expire_date": "2030-01-01T00:00:00Z"
    }]);
    std::fs::write(&path, serde_json::to_vec(&legacy).unwrap()).unwrap();

    let store = LocalStore::open(&path).await;
    let r = store.record(id).unwrap();
    assert_eq!(r.created_at, r.flight_start.unwrap());
    assert_eq!(r.flight_end.unwrap().to_rfc3339(), "2030-01-01T00:00:00+00:00");

    // Rewrites use only the modern field names
    store.bulk_recolor(ZoneColor::Gray.to_hex()).await;
    let raw = raw_entries(&path);
    assert!(raw[0].get("started_at").is_none());
    assert!(raw[0].get("expire_date").is_none());
    assert!(raw[0].get("flight_end").is_some());
}
