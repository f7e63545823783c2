//! Composition layer between the UI shell and the core.
//!
//! The store never notifies anyone itself; every successful mutation made
//! through [`ZoneService`] fans out to the overlay and list notifiers here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use geozone_core::{Coordinate, Geometry, ShapeId, ShapeRecord, SyncError, ValidationError};
use geozone_store::{ChangeNotifier, ChangeReason, LocalStore, SnapshotFingerprint, StoreOptions};
use geozone_sync::{JsonFileRemote, RemoteStore, SyncConfig, SyncEngine, SyncReport};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::geocode::{Geocoder, NoGeocoder};

/// What the user filled in before a zone exists
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneDraft {
    pub title: String,
    pub base_coordinate: Coordinate,
    pub geometry: Geometry,
    /// Looked up from the coordinate when left empty
    pub address: Option<String>,
    pub memo: Option<String>,
    /// Falls back to the configured default colour
    pub color: Option<String>,
    pub flight_start: Option<DateTime<Utc>>,
    pub flight_end: Option<DateTime<Utc>>,
}

impl ZoneDraft {
    pub fn circle(title: impl Into<String>, center: Coordinate, radius: f64) -> Self {
        Self {
            title: title.into(),
            base_coordinate: center,
            geometry: Geometry::Circle { radius },
            address: None,
            memo: None,
            color: None,
            flight_start: None,
            flight_end: None,
        }
    }

    pub fn flight_window(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.flight_start = start;
        self.flight_end = end;
        self
    }

    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Result of [`ZoneService::locate`]
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub coordinate: Coordinate,
    pub address: Option<String>,
}

/// Store handle plus the collaborators wired around it
pub struct ZoneService {
    store: LocalStore,
    overlay: ChangeNotifier,
    list: ChangeNotifier,
    geocoder: Arc<dyn Geocoder>,
    sync: Option<SyncEngine>,
    default_color: String,
}

impl ZoneService {
    /// Wire a service around an open store, with no geocoder and no remote
    pub fn new(store: LocalStore, overlay: ChangeNotifier, list: ChangeNotifier) -> Self {
        Self {
            store,
            overlay,
            list,
            geocoder: Arc::new(NoGeocoder),
            sync: None,
            default_color: geozone_core::ZoneColor::default().to_hex().to_string(),
        }
    }

    /// Open the store and remote named by `config`
    pub async fn from_config(config: &Config) -> Self {
        let options = StoreOptions {
            io_timeout: config.io_timeout(),
        };
        let store = LocalStore::open_with(&config.data_path, options).await;
        let mut service = Self::new(
            store,
            ChangeNotifier::new("overlay", config.overlay_debounce()),
            ChangeNotifier::new("list", config.list_debounce()),
        );
        service.default_color = config.default_color.clone();

        if let Some(remote_path) = &config.remote_path {
            info!(remote = %remote_path.display(), "sync enabled");
            service = service.with_remote(
                Arc::new(JsonFileRemote::new(remote_path)),
                SyncConfig {
                    timeout: config.sync_timeout(),
                },
            );
        }
        service
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        self.sync = Some(SyncEngine::new(self.store.clone(), remote, config));
        self
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn overlay(&self) -> &ChangeNotifier {
        &self.overlay
    }

    pub fn list(&self) -> &ChangeNotifier {
        &self.list
    }

    pub fn active_records(&self) -> Vec<ShapeRecord> {
        self.store.active_records()
    }

    pub fn record(&self, id: ShapeId) -> Option<ShapeRecord> {
        self.store.record(id)
    }

    // --- Mutations ---

    pub async fn create_zone(&self, draft: ZoneDraft) -> Result<ShapeRecord, ValidationError> {
        let mut record = ShapeRecord::new(draft.title, draft.base_coordinate, draft.geometry)?
            .with_flight_window(draft.flight_start, draft.flight_end)
            .with_color(draft.color.unwrap_or_else(|| self.default_color.clone()));
        record.memo = draft.memo;
        record.validate()?;

        record.address = match draft.address {
            Some(address) => Some(address),
            None => self.geocoder.reverse_geocode(record.base_coordinate).await,
        };

        self.store.add(record.clone()).await?;
        info!(id = %record.id, title = %record.title, "zone created");
        self.changed(ChangeReason::Added);
        Ok(record)
    }

    /// Save an edited record; `Ok(false)` if it no longer exists
    pub async fn edit_zone(&self, record: ShapeRecord) -> Result<bool, ValidationError> {
        let updated = self.store.update(record).await?;
        if updated {
            self.changed(ChangeReason::Updated);
        }
        Ok(updated)
    }

    pub async fn delete_zone(&self, id: ShapeId) -> bool {
        let deleted = self.store.soft_delete(id).await;
        if deleted {
            info!(%id, "zone deleted");
            self.changed(ChangeReason::Deleted);
        }
        deleted
    }

    pub async fn restore_zone(&self, id: ShapeId) -> bool {
        let restored = self.store.restore(id).await;
        if restored {
            self.changed(ChangeReason::Restored);
        }
        restored
    }

    pub async fn recolor_all(&self, color: &str) -> usize {
        let count = self.store.bulk_recolor(color).await;
        if count > 0 {
            self.changed(ChangeReason::Recolored);
        }
        count
    }

    pub async fn purge_expired(&self) -> usize {
        let removed = self.store.purge_expired().await;
        if removed > 0 {
            self.changed(ChangeReason::Purged);
        }
        removed
    }

    // --- Lookup ---

    /// Resolve user input to a point: coordinate notations first, then the geocoder
    pub async fn locate(&self, text: &str) -> Option<Located> {
        if let Some(coordinate) = Coordinate::parse(text) {
            debug!(%coordinate, "input parsed as a coordinate");
            let address = self.geocoder.reverse_geocode(coordinate).await;
            return Some(Located { coordinate, address });
        }

        let (coordinate, address) = self.geocoder.forward_geocode(text).await?;
        Some(Located {
            coordinate,
            address: Some(address),
        })
    }

    // --- Sync ---

    pub fn sync_enabled(&self) -> bool {
        self.sync.is_some()
    }

    /// Run one sync cycle, notifying observers once if local state moved
    pub async fn sync_now(&self) -> Result<SyncReport, SyncError> {
        let engine = self.sync.as_ref().ok_or(SyncError::NotConfigured)?;

        let before = SnapshotFingerprint::of(&self.store.snapshot());
        let result = engine.sync_once().await;
        let moved = match &result {
            Ok(report) => report.local_changed(),
            // A failed push leaves the merge applied
            Err(_) => SnapshotFingerprint::of(&self.store.snapshot()) != before,
        };

        if moved {
            self.changed(ChangeReason::Synced);
        }
        if let Err(e) = &result {
            warn!(error = %e, "sync failed");
        }
        result
    }

    fn changed(&self, reason: ChangeReason) {
        self.overlay.notify(reason);
        self.list.notify(reason);
    }
}
