//! Durable file format: one UTF-8 JSON array holding active records and
//! tombstones together.
//!
//! Writes go to a temp file in the same directory and are renamed over the
//! target, so a crash mid-write leaves the previous file intact. Entries that
//! no longer decode are carried through untouched rather than dropped.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use geozone_core::{PersistenceError, ShapeRecord};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::warn;

/// Everything the durable file holds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DurableSet {
    /// Decoded records, active and tombstoned
    pub records: Vec<ShapeRecord>,
    /// Raw entries that failed to decode, written back verbatim
    pub unreadable: Vec<Value>,
}

impl DurableSet {
    pub fn active(&self) -> Vec<ShapeRecord> {
        self.records.iter().filter(|r| r.is_active()).cloned().collect()
    }
}

/// Read the durable file. `Ok(None)` means there is no file yet.
pub fn read(path: &Path) -> Result<Option<DurableSet>, PersistenceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };

    let entries: Vec<Value> = serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Some(decode_entries(entries)))
}

/// Decode raw entries one by one, quarantining the ones that do not decode
pub fn decode_entries(entries: Vec<Value>) -> DurableSet {
    let mut set = DurableSet::default();
    let mut index_by_id = HashMap::new();

    for entry in entries {
        match serde_json::from_value::<ShapeRecord>(entry.clone()) {
            Ok(record) => match index_by_id.get(&record.id) {
                // Same id written twice: keep whichever changed last
                Some(&idx) => {
                    let existing: &mut ShapeRecord = &mut set.records[idx];
                    warn!(id = %record.id, "duplicate shape id in durable file, keeping newest copy");
                    if record.last_modified() > existing.last_modified() {
                        *existing = record;
                    }
                }
                None => {
                    index_by_id.insert(record.id, set.records.len());
                    set.records.push(record);
                }
            },
            Err(e) => {
                warn!(error = %e, "quarantining undecodable shape entry");
                set.unreadable.push(entry);
            }
        }
    }

    set
}

/// Encode the set as the on-disk JSON array
pub fn encode(set: &DurableSet) -> Result<Vec<u8>, PersistenceError> {
    let mut entries = Vec::with_capacity(set.records.len() + set.unreadable.len());
    for record in &set.records {
        entries.push(serde_json::to_value(record).map_err(PersistenceError::Encode)?);
    }
    entries.extend(set.unreadable.iter().cloned());
    serde_json::to_vec_pretty(&entries).map_err(PersistenceError::Encode)
}

/// Atomically replace `path` with `bytes`
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| PersistenceError::io(&parent, e))?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| PersistenceError::io(&parent, e))?;
    tmp.write_all(bytes).map_err(|e| PersistenceError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| PersistenceError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| PersistenceError::io(path, e.error))?;
    Ok(())
}

/// Copy an undecodable file aside so starting empty does not destroy it
pub fn quarantine_file(path: &Path) -> Result<PathBuf, PersistenceError> {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".corrupt");
    let backup = path.with_file_name(name);
    fs::copy(path, &backup).map_err(|e| PersistenceError::io(&backup, e))?;
    Ok(backup)
}
