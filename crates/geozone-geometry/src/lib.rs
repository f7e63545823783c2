//! Geographic primitives for geozone.
//!
//! Holds the [`Coordinate`] leaf type: range-checked construction, tolerant
//! parsing of the notations people paste into a search box, DMS formatting
//! and great-circle distance.

pub mod coordinate;

pub use coordinate::{Coordinate, CoordinateError, UnrecognizedFormat, EARTH_RADIUS_M};
