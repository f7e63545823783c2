//! Local storage for geozone shapes.
//!
//! - [`LocalStore`]: the authoritative in-memory collection and its durable file
//! - [`persist`]: the on-disk JSON array format and atomic writes
//! - [`ChangeNotifier`] / [`RenderGate`]: debounced change fan-out to observers

pub mod notifier;
pub mod persist;
pub mod store;

pub use notifier::{
    ChangeNotifier, ChangeReason, RenderGate, SnapshotFingerprint, SubscriptionId,
    DEFAULT_LIST_DEBOUNCE, DEFAULT_OVERLAY_DEBOUNCE,
};
pub use persist::DurableSet;
pub use store::{LocalStore, StoreOptions, DEFAULT_IO_TIMEOUT};
