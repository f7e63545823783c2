use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geozone_core::{Coordinate, ShapeRecord, SyncError};
use geozone_store::LocalStore;
use geozone_sync::{MemoryRemote, RemoteStore, SyncConfig, SyncEngine, SyncReport};
use tokio::sync::Notify;

fn zone(title: &str) -> ShapeRecord {
    ShapeRecord::circle(title, Coordinate::new(37.5, 127.0).unwrap(), 100.0).unwrap()
}

async fn device(dir: &tempfile::TempDir, name: &str, remote: Arc<dyn RemoteStore>) -> (LocalStore, SyncEngine) {
    let store = LocalStore::open(dir.path().join(format!("{name}.json"))).await;
    let engine = SyncEngine::new(store.clone(), remote, SyncConfig::default());
    (store, engine)
}

#[tokio::test]
async fn edits_and_deletes_travel_between_devices() {
    let dir = tempfile::tempdir().unwrap();
    let remote: Arc<dyn RemoteStore> = Arc::new(MemoryRemote::new());
    let (phone, phone_sync) = device(&dir, "phone", Arc::clone(&remote)).await;
    let (tablet, tablet_sync) = device(&dir, "tablet", Arc::clone(&remote)).await;

    let a = zone("harbour");
    phone.add(a.clone()).await.unwrap();
    let report = tokio_test::assert_ok!(phone_sync.sync_once().await);
    assert_eq!(report.pushed, 1);

    let report = tablet_sync.sync_once().await.unwrap();
    assert_eq!(report.adopted, 1);
    assert_eq!(tablet.record(a.id).unwrap().title, "harbour");

    // Delete on the tablet, propagate to the phone
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(tablet.soft_delete(a.id).await);
    tablet_sync.sync_once().await.unwrap();
    let report = phone_sync.sync_once().await.unwrap();
    assert_eq!(report.overwritten_locally, 1);
    assert!(phone.record(a.id).is_none());
    assert!(phone.all_records().await[0].is_deleted());

    // Nothing left to do on a second pass
    assert_eq!(
        phone_sync.sync_once().await.unwrap(),
        SyncReport {
            unchanged: 1,
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn deleted_record_is_not_resurrected_by_stale_remote_copy() {
    let dir = tempfile::tempdir().unwrap();
    let a = zone("stale");
    let memory = Arc::new(MemoryRemote::with_records(vec![a.clone()]));
    let remote: Arc<dyn RemoteStore> = memory.clone();
    let (store, engine) = device(&dir, "local", remote).await;

    store.add(a.clone()).await.unwrap();
    store.soft_delete(a.id).await;
    engine.sync_once().await.unwrap();

    assert!(store.record(a.id).is_none());
    assert!(memory.records().await[0].is_deleted());
}

#[tokio::test]
async fn later_remote_edit_revives_local_tombstone() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path().join("local.json")).await;
    let a = zone("contested");
    store.add(a.clone()).await.unwrap();
    store.soft_delete(a.id).await;

    let mut edited = store.all_records().await[0].clone();
    edited.deleted_at = None;
    edited.title = "edited elsewhere".into();
    edited.touch(edited.updated_at + chrono::Duration::seconds(60));
    let remote: Arc<dyn RemoteStore> = Arc::new(MemoryRemote::with_records(vec![edited]));
    let engine = SyncEngine::new(store.clone(), remote, SyncConfig::default());

    engine.sync_once().await.unwrap();
    assert_eq!(store.record(a.id).unwrap().title, "edited elsewhere");
}

#[tokio::test]
async fn push_failure_is_reported_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(MemoryRemote::new());
    let remote: Arc<dyn RemoteStore> = memory.clone();
    let (store, engine) = device(&dir, "local", remote).await;
    store.add(zone("pending")).await.unwrap();

    memory.set_offline(true);
    let err = tokio_test::assert_err!(engine.sync_once().await);
    assert!(matches!(err, SyncError::Remote(_)));
    assert_eq!(store.active_records().len(), 1);
    assert!(!engine.is_syncing());

    memory.set_offline(false);
    assert_eq!(engine.sync_once().await.unwrap().pushed, 1);
    assert_eq!(memory.records().await.len(), 1);
}

/// Remote whose fetch parks until released
struct GatedRemote {
    gate: Notify,
}

#[async_trait]
impl RemoteStore for GatedRemote {
    async fn fetch_all(&self) -> Result<Vec<ShapeRecord>, SyncError> {
        self.gate.notified().await;
        Ok(Vec::new())
    }

    async fn push(&self, _records: Vec<ShapeRecord>) -> Result<(), SyncError> {
        Ok(())
    }
}

#[tokio::test]
async fn overlapping_sync_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let gated = Arc::new(GatedRemote { gate: Notify::new() });
    let remote: Arc<dyn RemoteStore> = gated.clone();
    let (_store, engine) = device(&dir, "local", remote).await;
    let engine = Arc::new(engine);

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.sync_once().await })
    };
    while !engine.is_syncing() {
        tokio::task::yield_now().await;
    }

    assert!(matches!(engine.sync_once().await, Err(SyncError::AlreadyRunning)));
    gated.gate.notify_one();
    assert!(first.await.unwrap().is_ok());
    assert!(!engine.is_syncing());
}

#[tokio::test]
async fn hung_remote_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let remote: Arc<dyn RemoteStore> = Arc::new(GatedRemote { gate: Notify::new() });
    let store = LocalStore::open(dir.path().join("local.json")).await;
    let engine = SyncEngine::new(
        store,
        remote,
        SyncConfig {
            timeout: Duration::from_millis(20),
        },
    );

    assert!(matches!(
        engine.sync_once().await,
        Err(SyncError::Timeout { operation: "fetch", .. })
    ));
    assert!(!engine.is_syncing());
}

#[tokio::test]
async fn local_edit_during_fetch_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let gated = Arc::new(GatedRemote { gate: Notify::new() });
    let remote: Arc<dyn RemoteStore> = gated.clone();
    let (store, engine) = device(&dir, "local", remote).await;
    let engine = Arc::new(engine);

    let cycle = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.sync_once().await })
    };
    while !engine.is_syncing() {
        tokio::task::yield_now().await;
    }

    let late = zone("added mid-sync");
    store.add(late.clone()).await.unwrap();
    gated.gate.notify_one();

    let report = cycle.await.unwrap().unwrap();
    assert_eq!(report.pushed, 1);
    assert!(store.record(late.id).is_some());
}

#[tokio::test]
async fn purged_zone_stays_gone_after_sync() {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(MemoryRemote::new());
    let remote: Arc<dyn RemoteStore> = memory.clone();
    let (store, engine) = device(&dir, "local", remote).await;

    let now = chrono::Utc::now();
    let lapsed = zone("lapsed").with_flight_window(
        Some(now - chrono::Duration::hours(2)),
        Some(now - chrono::Duration::hours(1)),
    );
    store.add(lapsed.clone()).await.unwrap();
    assert_eq!(engine.sync_once().await.unwrap().pushed, 1);

    assert_eq!(store.purge_expired().await, 1);
    let report = engine.sync_once().await.unwrap();
    assert_eq!(report.skipped_expired, 1);
    assert_eq!(report.adopted, 0);
    assert!(store.record(lapsed.id).is_none());
    assert!(store.all_records().await.is_empty());
}
