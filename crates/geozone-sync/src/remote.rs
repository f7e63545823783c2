//! Remote store collaborators.
//!
//! The remote is assumed eventually consistent with no transaction across
//! records: `push` upserts each record by id and nothing else.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use geozone_core::{PersistenceError, ShapeId, ShapeRecord, SyncError};
use geozone_store::persist::{self, DurableSet};
use tokio::sync::Mutex;
use tracing::debug;

/// Cloud-side copy of the shape set
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every record the remote holds, tombstones included
    async fn fetch_all(&self) -> Result<Vec<ShapeRecord>, SyncError>;

    /// Upsert `records` by id
    async fn push(&self, records: Vec<ShapeRecord>) -> Result<(), SyncError>;
}

/// In-process remote, mostly for tests and offline demos
#[derive(Debug, Default)]
pub struct MemoryRemote {
    records: Mutex<Vec<ShapeRecord>>,
    offline: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ShapeRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            offline: AtomicBool::new(false),
        }
    }

    /// Make every call fail with [`SyncError::Remote`] until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    pub async fn records(&self) -> Vec<ShapeRecord> {
        self.records.lock().await.clone()
    }

    fn check_online(&self) -> Result<(), SyncError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(SyncError::Remote("remote is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_all(&self) -> Result<Vec<ShapeRecord>, SyncError> {
        self.check_online()?;
        Ok(self.records.lock().await.clone())
    }

    async fn push(&self, records: Vec<ShapeRecord>) -> Result<(), SyncError> {
        self.check_online()?;
        let mut held = self.records.lock().await;
        upsert(&mut held, records);
        Ok(())
    }
}

/// Remote backed by a JSON file in the durable-file format, e.g. a folder
/// shared between devices by a file sync service
#[derive(Debug, Clone)]
pub struct JsonFileRemote {
    path: PathBuf,
}

impl JsonFileRemote {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_set(path: &Path) -> Result<DurableSet, SyncError> {
        match persist::read(path) {
            Ok(set) => Ok(set.unwrap_or_default()),
            Err(PersistenceError::Decode { source, .. }) => Err(SyncError::Decode(source)),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RemoteStore for JsonFileRemote {
    async fn fetch_all(&self) -> Result<Vec<ShapeRecord>, SyncError> {
        let path = self.path.clone();
        let set = tokio::task::spawn_blocking(move || Self::read_set(&path))
            .await
            .map_err(|e| SyncError::Remote(e.to_string()))??;
        debug!(path = %self.path.display(), records = set.records.len(), "fetched remote shapes");
        Ok(set.records)
    }

    async fn push(&self, records: Vec<ShapeRecord>) -> Result<(), SyncError> {
        let path = self.path.clone();
        let count = records.len();
        tokio::task::spawn_blocking(move || -> Result<(), SyncError> {
            let mut set = Self::read_set(&path)?;
            upsert(&mut set.records, records);
            persist::write_atomic(&path, &persist::encode(&set)?)?;
            Ok(())
        })
        .await
        .map_err(|e| SyncError::Remote(e.to_string()))??;
        debug!(path = %self.path.display(), count, "pushed shapes to remote file");
        Ok(())
    }
}

/// Replace by id, appending records the set does not hold yet
fn upsert(held: &mut Vec<ShapeRecord>, incoming: Vec<ShapeRecord>) {
    let index: HashMap<ShapeId, usize> = held.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    for record in incoming {
        match index.get(&record.id) {
            Some(&i) => held[i] = record,
            None => held.push(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geozone_core::Coordinate;

    fn zone(title: &str) -> ShapeRecord {
        ShapeRecord::circle(title, Coordinate::new(35.0, 129.0).unwrap(), 250.0).unwrap()
    }

    #[tokio::test]
    async fn memory_remote_upserts() {
        let a = zone("a");
        let remote = MemoryRemote::with_records(vec![a.clone()]);

        let mut renamed = a.clone();
        renamed.title = "renamed".into();
        let b = zone("b");
        remote.push(vec![renamed.clone(), b.clone()]).await.unwrap();

        assert_eq!(remote.fetch_all().await.unwrap(), vec![renamed, b]);
    }

    #[tokio::test]
    async fn offline_memory_remote_fails() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        assert!(matches!(remote.fetch_all().await, Err(SyncError::Remote(_))));
        assert!(matches!(remote.push(vec![zone("a")]).await, Err(SyncError::Remote(_))));
        remote.set_offline(false);
        assert!(remote.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_remote_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let remote = JsonFileRemote::new(dir.path().join("remote.json"));
        assert!(remote.fetch_all().await.unwrap().is_empty());

        let a = zone("a");
        remote.push(vec![a.clone()]).await.unwrap();
        remote.push(vec![zone("b")]).await.unwrap();

        let fetched = remote.fetch_all().await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0], a);
    }

    #[tokio::test]
    async fn garbled_remote_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.json");
        std::fs::write(&path, b"not json").unwrap();
        let remote = JsonFileRemote::new(&path);
        assert!(matches!(remote.fetch_all().await, Err(SyncError::Decode(_))));
    }
}
