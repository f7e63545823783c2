//! Core types for geozone.
//!
//! - [`ShapeRecord`]: a user-drawn zone with validity window and tombstone
//! - [`wire`]: the tolerant JSON codec every persisted layout decodes through
//! - [`error`]: the validation / persistence / sync error taxonomy

pub mod color;
pub mod error;
pub mod record;
pub mod wire;

pub use color::ZoneColor;
pub use error::{PersistenceError, SyncError, ValidationError};
pub use geozone_geometry::Coordinate;
pub use record::{Geometry, ShapeId, ShapeKind, ShapeRecord};
pub use wire::decode_date;
