//! Debounced change notification.
//!
//! [`ChangeNotifier`] is a leading-edge, drop-excess debounce: the first
//! `notify` after a quiet interval fires immediately, anything inside the
//! interval is discarded. Observers keep a [`RenderGate`] so a notification
//! that carries no visible change costs them a fingerprint compare and
//! nothing more.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use geozone_core::ShapeRecord;
use tokio::sync::broadcast;
use tracing::trace;

/// Overlay regeneration is the expensive consumer
pub const DEFAULT_OVERLAY_DEBOUNCE: Duration = Duration::from_millis(300);
/// List views are cheap to rebuild
pub const DEFAULT_LIST_DEBOUNCE: Duration = Duration::from_millis(150);

/// What kind of mutation triggered a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    Reloaded,
    Added,
    Updated,
    Deleted,
    Restored,
    Recolored,
    Purged,
    Synced,
}

/// Handle returned by [`ChangeNotifier::on_change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(ChangeReason) + Send + Sync>;

/// Debounced publish/subscribe scoped to one store instance
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("name", &self.inner.name)
            .field("interval", &self.inner.interval)
            .finish()
    }
}

struct Inner {
    name: &'static str,
    interval: Duration,
    /// The only shared mutable state `notify` races on
    last_fired: Mutex<Option<Instant>>,
    callbacks: RwLock<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
    events: broadcast::Sender<ChangeReason>,
}

impl ChangeNotifier {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                name,
                interval,
                last_fired: Mutex::new(None),
                callbacks: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Notifier for map overlay regeneration
    pub fn overlay() -> Self {
        Self::new("overlay", DEFAULT_OVERLAY_DEBOUNCE)
    }

    /// Notifier for list view reloads
    pub fn list() -> Self {
        Self::new("list", DEFAULT_LIST_DEBOUNCE)
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Register a callback, run synchronously on the notifying task
    pub fn on_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ChangeReason) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; `false` if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.inner.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(sub, _)| *sub != id);
        callbacks.len() != before
    }

    /// Channel flavour of [`on_change`](Self::on_change) for async observers
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeReason> {
        self.inner.events.subscribe()
    }

    /// Fire unless a notification already went out within the interval.
    /// Returns whether observers were called.
    pub fn notify(&self, reason: ChangeReason) -> bool {
        self.notify_at(reason, Instant::now())
    }

    /// [`notify`](Self::notify) against an explicit clock reading
    pub fn notify_at(&self, reason: ChangeReason, now: Instant) -> bool {
        {
            let mut last = self.inner.last_fired.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(prev) = *last {
                if now.saturating_duration_since(prev) < self.inner.interval {
                    trace!(notifier = self.inner.name, ?reason, "change notification debounced");
                    return false;
                }
            }
            *last = Some(now);
        }

        // Snapshot the list so callbacks may (un)subscribe without deadlocking
        let callbacks: Vec<Callback> = self
            .inner
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(reason);
        }
        // No receivers is fine
        let _ = self.inner.events.send(reason);
        true
    }
}

/// Cheap summary of a snapshot: count, id set, record contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotFingerprint {
    pub count: usize,
    pub id_hash: u64,
    pub content_hash: u64,
}

impl SnapshotFingerprint {
    pub fn of(records: &[ShapeRecord]) -> Self {
        let mut sorted: Vec<&ShapeRecord> = records.iter().collect();
        sorted.sort_unstable_by_key(|r| r.id);

        let mut ids = DefaultHasher::new();
        let mut contents = DefaultHasher::new();
        for record in sorted {
            record.id.hash(&mut ids);
            record.id.hash(&mut contents);
            record.updated_at.hash(&mut contents);
            // Catches edits that did not move `updated_at`
            serde_json::to_string(record).unwrap_or_default().hash(&mut contents);
        }

        Self {
            count: records.len(),
            id_hash: ids.finish(),
            content_hash: contents.finish(),
        }
    }
}

/// Per-observer memory of what was last rendered
#[derive(Debug, Default)]
pub struct RenderGate {
    last: Option<SnapshotFingerprint>,
}

impl RenderGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when the snapshot differs from the last one rendered
    pub fn should_render(&mut self, snapshot: &[ShapeRecord]) -> bool {
        let fingerprint = SnapshotFingerprint::of(snapshot);
        if self.last == Some(fingerprint) {
            return false;
        }
        self.last = Some(fingerprint);
        true
    }

    /// Forget the last render, forcing the next check to pass
    pub fn reset(&mut self) {
        self.last = None;
    }
}
