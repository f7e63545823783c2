//! geozone: radius-based map zones with a tombstoned local store and
//! last-write-wins cloud reconciliation.
//!
//! The member crates carry the core; this crate wires them together for a
//! UI shell.

pub mod config;
pub mod geocode;
pub mod service;

pub use config::Config;
pub use geocode::{Gazetteer, Geocoder, NoGeocoder};
pub use service::{Located, ZoneDraft, ZoneService};

pub use geozone_core::{Coordinate, Geometry, ShapeId, ShapeKind, ShapeRecord, ZoneColor};
pub use geozone_store::{ChangeNotifier, ChangeReason, LocalStore, RenderGate};
pub use geozone_sync::{MemoryRemote, RemoteStore, SyncReport};
