//! Error taxonomy shared by every geozone crate.
//!
//! Legacy-field degradation is deliberately absent here: it is not an error,
//! it is a `tracing::warn!` emitted while decoding (see [`crate::wire`]).

use std::path::PathBuf;
use std::time::Duration;

use geozone_geometry::CoordinateError;

use crate::record::{ShapeId, ShapeKind};

/// A mutation was rejected before it touched the store
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid coordinate: {0}")]
    Coordinate(#[from] CoordinateError),
    #[error("{kind} shape is missing {field}")]
    MissingGeometry { kind: ShapeKind, field: &'static str },
    #[error("radius must be a positive number of metres, got {0}")]
    InvalidRadius(f64),
    #[error("{kind} shape needs at least {min} points, got {got}")]
    TooFewPoints {
        kind: ShapeKind,
        min: usize,
        got: usize,
    },
    #[error("validity window ends before it starts")]
    InvertedWindow,
    #[error("shape {0} already exists")]
    DuplicateId(ShapeId),
}

/// Reading or writing the durable file failed
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not encode shapes: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("could not decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("i/o on {path} did not finish within {after:?}")]
    Timeout { path: PathBuf, after: Duration },
    #[error("background i/o task failed: {0}")]
    Task(String),
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A sync cycle was aborted; local state is left for the next cycle
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a sync is already in progress")]
    AlreadyRunning,
    #[error("no remote store is configured")]
    NotConfigured,
    #[error("remote store error: {0}")]
    Remote(String),
    #[error("could not decode remote payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("remote {operation} did not finish within {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
