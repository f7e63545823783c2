//! The local shape store - THE source of truth for shape data on this device.
//!
//! Two views are kept:
//! - the durable set (active records + tombstones + quarantined entries),
//!   guarded by an async mutex that serialises every mutation including its
//!   file write
//! - the active snapshot, an `Arc<Vec<_>>` swapped in one step after each
//!   mutation, so readers see either the old state or the new one and never
//!   a half-applied bulk edit
//!
//! Write failures are logged and the in-memory state stays authoritative;
//! callers only ever see [`ValidationError`]s.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use geozone_core::{PersistenceError, ShapeId, ShapeRecord, ValidationError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::persist::{self, DurableSet};

/// Default upper bound on a single file read or write
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a store instance
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub io_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

/// Shared handle to the local store. Clones refer to the same store.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.inner.path)
            .field("active", &self.snapshot().len())
            .finish()
    }
}

struct Inner {
    path: PathBuf,
    options: StoreOptions,
    /// Full durable set; holding this lock is what makes a mutation exclusive
    durable: Mutex<DurableSet>,
    /// Published view of non-tombstoned records
    active: RwLock<Arc<Vec<ShapeRecord>>>,
    /// Set when the last write failed and disk lags memory
    dirty: AtomicBool,
    /// Generation handed to the next file write
    next_write: AtomicU64,
    /// Newest generation on disk. Writes hold this while renaming, so a
    /// write that outlived its timeout cannot land over a newer one.
    written: Arc<StdMutex<u64>>,
}

impl LocalStore {
    /// Open the store at `path`, loading the file if it exists and
    /// creating an empty one if it does not. Never fails.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_with(path, StoreOptions::default()).await
    }

    pub async fn open_with(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        let store = Self {
            inner: Arc::new(Inner {
                path: path.into(),
                options,
                durable: Mutex::new(DurableSet::default()),
                active: RwLock::new(Arc::new(Vec::new())),
                dirty: AtomicBool::new(false),
                next_write: AtomicU64::new(0),
                written: Arc::new(StdMutex::new(0)),
            }),
        };
        store.load().await;
        store
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Whether the last write failed and the file is behind memory
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    /// Re-read the durable file, replacing in-memory state.
    ///
    /// A missing file starts an empty store and writes it out; an
    /// undecodable file is copied aside and the store starts empty.
    pub async fn load(&self) {
        let mut durable = self.inner.durable.lock().await;
        let path = self.inner.path.clone();

        let loaded = self.blocking(persist::read, path).await;
        match loaded {
            Ok(Some(set)) => {
                info!(
                    path = %self.inner.path.display(),
                    records = set.records.len(),
                    quarantined = set.unreadable.len(),
                    "loaded shape store"
                );
                *durable = set;
                self.inner.dirty.store(false, Ordering::Release);
            }
            Ok(None) => {
                info!(path = %self.inner.path.display(), "no shape file yet, starting empty");
                *durable = DurableSet::default();
                self.persist(&durable).await;
            }
            Err(e @ PersistenceError::Decode { .. }) => {
                warn!(error = %e, "shape file unreadable, starting empty");
                let path = self.inner.path.clone();
                match self.blocking(persist::quarantine_file, path).await {
                    Ok(backup) => warn!(backup = %backup.display(), "kept a copy of the unreadable shape file"),
                    Err(e) => error!(error = %e, "could not back up unreadable shape file"),
                }
                *durable = DurableSet::default();
                // Disk no longer matches memory until the next write
                self.inner.dirty.store(true, Ordering::Release);
            }
            Err(e) => {
                error!(error = %e, "could not read shape file, starting empty");
                *durable = DurableSet::default();
                self.inner.dirty.store(true, Ordering::Release);
            }
        }
        self.publish(&durable);
    }

    // --- Reads ---

    /// Cheap shared snapshot of the active records
    pub fn snapshot(&self) -> Arc<Vec<ShapeRecord>> {
        Arc::clone(&self.inner.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Active records, tombstones excluded
    pub fn active_records(&self) -> Vec<ShapeRecord> {
        self.snapshot().as_ref().clone()
    }

    /// Look up an active record
    pub fn record(&self, id: ShapeId) -> Option<ShapeRecord> {
        self.snapshot().iter().find(|r| r.id == id).cloned()
    }

    /// Active records whose validity window closed before `now`
    pub fn expired_records(&self, now: DateTime<Utc>) -> Vec<ShapeRecord> {
        self.snapshot().iter().filter(|r| r.is_expired(now)).cloned().collect()
    }

    /// Every decoded record, tombstones included
    pub async fn all_records(&self) -> Vec<ShapeRecord> {
        self.inner.durable.lock().await.records.clone()
    }

    // --- Mutations ---

    /// Insert a new record
    pub async fn add(&self, record: ShapeRecord) -> Result<(), ValidationError> {
        record.validate()?;
        let mut durable = self.inner.durable.lock().await;
        if durable.records.iter().any(|r| r.id == record.id) {
            return Err(ValidationError::DuplicateId(record.id));
        }

        debug!(id = %record.id, title = %record.title, "adding shape");
        durable.records.push(record);
        self.publish(&durable);
        self.persist(&durable).await;
        Ok(())
    }

    /// Replace an active record by id, bumping `updated_at`.
    ///
    /// Returns `Ok(false)` when no active record has that id. `created_at`
    /// and the tombstone state always come from the stored copy.
    pub async fn update(&self, mut record: ShapeRecord) -> Result<bool, ValidationError> {
        record.validate()?;
        let mut durable = self.inner.durable.lock().await;
        let Some(existing) = durable
            .records
            .iter_mut()
            .find(|r| r.id == record.id && r.is_active())
        else {
            debug!(id = %record.id, "update for unknown shape ignored");
            return Ok(false);
        };

        record.created_at = existing.created_at;
        record.deleted_at = None;
        record.updated_at = record.updated_at.max(existing.updated_at);
        record.touch(Utc::now());
        *existing = record;

        self.publish(&durable);
        self.persist(&durable).await;
        Ok(true)
    }

    /// Tombstone an active record.
    ///
    /// Readers stop seeing it as soon as this is called; the returned future
    /// completes once the tombstone has been written to the durable file.
    pub async fn soft_delete(&self, id: ShapeId) -> bool {
        let mut durable = self.inner.durable.lock().await;
        let Some(record) = durable.records.iter_mut().find(|r| r.id == id && r.is_active()) else {
            return false;
        };

        // Phase one: drop it from the active view before any I/O
        self.retract(id);

        // Phase two: durably record the tombstone
        record.mark_deleted(Utc::now());
        debug!(%id, "shape tombstoned");
        self.persist(&durable).await;
        self.publish(&durable);
        true
    }

    /// Clear a tombstone, returning the record to the active view
    pub async fn restore(&self, id: ShapeId) -> bool {
        let mut durable = self.inner.durable.lock().await;
        let Some(record) = durable.records.iter_mut().find(|r| r.id == id && r.is_deleted()) else {
            return false;
        };

        record.restore(Utc::now());
        debug!(%id, "shape restored");
        self.publish(&durable);
        self.persist(&durable).await;
        true
    }

    /// Set `color` on every record, tombstones included.
    ///
    /// The durable set is rewritten first and the active view swapped in a
    /// single step afterwards. Returns the number of records touched.
    pub async fn bulk_recolor(&self, color: &str) -> usize {
        let mut durable = self.inner.durable.lock().await;
        let now = Utc::now();
        for record in durable.records.iter_mut() {
            record.color = color.to_string();
            record.touch(now);
        }

        let count = durable.records.len();
        info!(count, color, "recolored all shapes");
        self.persist(&durable).await;
        self.publish(&durable);
        count
    }

    /// Drop every record whose validity window has closed. Returns how many went.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now()).await
    }

    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut durable = self.inner.durable.lock().await;
        let before = durable.records.len();
        durable.records.retain(|r| !r.is_expired(now));
        let removed = before - durable.records.len();
        if removed == 0 {
            return 0;
        }

        info!(removed, "purged expired shapes");
        self.publish(&durable);
        self.persist(&durable).await;
        removed
    }

    /// Run `f` over the full durable set as one exclusive mutation.
    ///
    /// Whatever `f` leaves in the vector becomes the new state; the file is
    /// only rewritten if something changed.
    pub async fn transact<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut Vec<ShapeRecord>) -> T,
    {
        let mut durable = self.inner.durable.lock().await;
        let before = durable.records.clone();
        let result = f(&mut durable.records);
        if durable.records != before {
            self.publish(&durable);
            self.persist(&durable).await;
        }
        result
    }

    // --- Internals ---

    /// Swap in a fresh active snapshot
    fn publish(&self, durable: &DurableSet) {
        let active = Arc::new(durable.active());
        *self.inner.active.write().unwrap_or_else(PoisonError::into_inner) = active;
    }

    /// Publish the current snapshot minus one id
    fn retract(&self, id: ShapeId) {
        let mut active = self.inner.active.write().unwrap_or_else(PoisonError::into_inner);
        let remaining: Vec<ShapeRecord> = active.iter().filter(|r| r.id != id).cloned().collect();
        *active = Arc::new(remaining);
    }

    /// Write the durable set, logging instead of failing
    async fn persist(&self, durable: &DurableSet) {
        let bytes = match persist::encode(durable) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "could not encode shapes, keeping in-memory state");
                self.inner.dirty.store(true, Ordering::Release);
                return;
            }
        };

        let generation = self.inner.next_write.fetch_add(1, Ordering::AcqRel) + 1;
        let written = Arc::clone(&self.inner.written);
        let write = move |p: &Path| -> Result<(), PersistenceError> {
            let mut on_disk = written.lock().unwrap_or_else(PoisonError::into_inner);
            if *on_disk > generation {
                debug!(generation, newer = *on_disk, "skipping stale shape write");
                return Ok(());
            }
            persist::write_atomic(p, &bytes)?;
            *on_disk = generation;
            Ok(())
        };

        let path = self.inner.path.clone();
        match self.blocking(write, path).await {
            Ok(()) => self.inner.dirty.store(false, Ordering::Release),
            Err(e) => {
                error!(error = %e, "could not persist shapes, keeping in-memory state");
                self.inner.dirty.store(true, Ordering::Release);
            }
        }
    }

    /// Run blocking file I/O off the async workers, bounded by the I/O timeout
    async fn blocking<T, F>(&self, f: F, path: PathBuf) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, PersistenceError> + Send + 'static,
    {
        let after = self.inner.options.io_timeout;
        let task_path = path.clone();
        let task = tokio::task::spawn_blocking(move || f(&task_path));
        match tokio::time::timeout(after, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(PersistenceError::Task(join.to_string())),
            Err(_) => Err(PersistenceError::Timeout { path, after }),
        }
    }
}
