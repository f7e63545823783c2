//! Cloud reconciliation for geozone.
//!
//! - [`reconcile`]: pure last-write-wins merge of two snapshots
//! - [`RemoteStore`]: the remote collaborator, with in-memory and JSON-file backends
//! - [`SyncEngine`]: runs fetch / merge / push cycles against a [`geozone_store::LocalStore`]

pub mod engine;
pub mod reconcile;
pub mod remote;

pub use engine::{SyncConfig, SyncEngine, DEFAULT_SYNC_TIMEOUT};
pub use reconcile::{reconcile, Reconciliation, SyncReport};
pub use remote::{JsonFileRemote, MemoryRemote, RemoteStore};
