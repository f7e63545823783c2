use std::path::Path;

use chrono::{Duration, Utc};
use geozone::{ChangeReason, Config, Coordinate, RenderGate, ZoneColor, ZoneDraft, ZoneService};
use tokio::sync::broadcast;

fn config(dir: &Path, device: &str) -> Config {
    Config {
        data_path: dir.join(format!("{device}.json")),
        remote_path: Some(dir.join("shared.json")),
        overlay_debounce_ms: 0,
        list_debounce_ms: 0,
        ..Config::default()
    }
}

#[tokio::test]
async fn create_delete_reload() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), "phone");
    let service = ZoneService::from_config(&cfg).await;

    let center = Coordinate::parse("37° 38′ 55″ N 126° 41′ 12″ E").unwrap();
    let draft = ZoneDraft::circle("Test", center, 100.0)
        .flight_window(Some(Utc::now()), Some(Utc::now() + Duration::days(7)));
    let a = tokio_test::assert_ok!(service.create_zone(draft).await);

    let active = service.active_records();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].title, "Test");

    assert!(service.delete_zone(a.id).await);
    assert!(service.active_records().is_empty());

    let reopened = ZoneService::from_config(&cfg).await;
    assert!(reopened.active_records().is_empty());
    let raw = std::fs::read_to_string(&cfg.data_path).unwrap();
    assert!(raw.contains(&a.id.to_string()));
    assert!(raw.contains("deleted_at"));
}

#[tokio::test]
async fn two_devices_converge_through_shared_file() {
    let dir = tempfile::tempdir().unwrap();
    let phone = ZoneService::from_config(&config(dir.path(), "phone")).await;
    let tablet = ZoneService::from_config(&config(dir.path(), "tablet")).await;
    assert!(phone.sync_enabled());

    let home = phone
        .create_zone(ZoneDraft::circle("home", Coordinate::new(37.5, 127.0).unwrap(), 150.0))
        .await
        .unwrap();
    let office = phone
        .create_zone(ZoneDraft::circle("office", Coordinate::new(37.4, 127.1).unwrap(), 80.0))
        .await
        .unwrap();
    phone.sync_now().await.unwrap();
    assert_eq!(tablet.sync_now().await.unwrap().adopted, 2);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    tablet.delete_zone(office.id).await;
    tablet.recolor_all(ZoneColor::Orange.to_hex()).await;
    tablet.sync_now().await.unwrap();
    phone.sync_now().await.unwrap();

    let titles: Vec<String> = phone.active_records().into_iter().map(|r| r.title).collect();
    assert_eq!(titles, vec!["home".to_string()]);
    assert_eq!(phone.record(home.id).unwrap().color, ZoneColor::Orange.to_hex());
    assert_eq!(phone.active_records(), tablet.active_records());
}

fn render_pending(events: &mut broadcast::Receiver<ChangeReason>, gate: &mut RenderGate, service: &ZoneService) -> usize {
    let mut renders = 0;
    while events.try_recv().is_ok() {
        if gate.should_render(&service.store().snapshot()) {
            renders += 1;
        }
    }
    renders
}

#[tokio::test]
async fn observers_skip_renders_that_change_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let service = ZoneService::from_config(&config(dir.path(), "phone")).await;
    let mut events = service.overlay().subscribe();
    let mut gate = RenderGate::new();

    let z = service
        .create_zone(ZoneDraft::circle("z", Coordinate::new(1.0, 1.0).unwrap(), 10.0))
        .await
        .unwrap();
    assert_eq!(render_pending(&mut events, &mut gate, &service), 1);

    // Pushing to the remote leaves local state alone
    assert_eq!(service.sync_now().await.unwrap().pushed, 1);
    assert_eq!(render_pending(&mut events, &mut gate, &service), 0);

    service.overlay().notify(ChangeReason::Reloaded);
    assert_eq!(render_pending(&mut events, &mut gate, &service), 0);

    service.delete_zone(z.id).await;
    assert_eq!(render_pending(&mut events, &mut gate, &service), 1);
}
