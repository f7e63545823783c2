//! Last-write-wins merge of a local and a remote snapshot.
//!
//! Records are compared per id by [`ShapeRecord::last_modified`]. A tombstone
//! is an ordinary write for ordering purposes: it beats an older remote edit
//! and loses to a newer one. Ties keep the local copy.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use geozone_core::{ShapeId, ShapeRecord};
use tracing::{trace, warn};

/// Counts describing what a merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote-only records taken into the local set
    pub adopted: usize,
    /// Local records replaced by a newer remote copy
    pub overwritten_locally: usize,
    /// Records queued for upload
    pub pushed: usize,
    /// Records identical on both sides
    pub unchanged: usize,
    /// Remote-only records left out because their window already closed
    pub skipped_expired: usize,
}

impl SyncReport {
    /// Whether the merge changed local state
    pub fn local_changed(&self) -> bool {
        self.adopted > 0 || self.overwritten_locally > 0
    }
}

/// Result of [`reconcile`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// New full local set, tombstones included
    pub merged: Vec<ShapeRecord>,
    /// Records whose local copy is authoritative and differs from the remote
    pub push: Vec<ShapeRecord>,
    pub report: SyncReport,
}

/// Which side a record is kept from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Winner {
    Local,
    Remote,
}

fn winner(local: &ShapeRecord, remote: &ShapeRecord) -> Winner {
    if remote.last_modified() > local.last_modified() {
        Winner::Remote
    } else {
        Winner::Local
    }
}

/// One copy per id, the most recently modified; first-seen order is kept
fn newest_per_id(remote: &[ShapeRecord]) -> Vec<&ShapeRecord> {
    let mut out: Vec<&ShapeRecord> = Vec::with_capacity(remote.len());
    let mut index_by_id: HashMap<ShapeId, usize> = HashMap::with_capacity(remote.len());

    for record in remote {
        match index_by_id.get(&record.id) {
            Some(&idx) => {
                warn!(id = %record.id, "remote returned a shape id twice, keeping newest copy");
                if record.last_modified() > out[idx].last_modified() {
                    out[idx] = record;
                }
            }
            None => {
                index_by_id.insert(record.id, out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Merge `remote` into `local`.
///
/// Local order is kept; remote-only records are appended in remote order.
/// Local-only tombstones stay local and are not pushed since the remote
/// never held them. Remote-only records already expired at `now` are not
/// adopted: a purged zone would otherwise come straight back.
///
/// A merged record's `updated_at` is never older than the local copy's.
pub fn reconcile(local: &[ShapeRecord], remote: &[ShapeRecord], now: DateTime<Utc>) -> Reconciliation {
    let remote = newest_per_id(remote);
    let remote_by_id: HashMap<ShapeId, &ShapeRecord> = remote.iter().map(|r| (r.id, *r)).collect();
    let mut out = Reconciliation::default();

    for mine in local {
        let Some(theirs) = remote_by_id.get(&mine.id) else {
            if mine.is_active() {
                trace!(id = %mine.id, "local-only shape queued for upload");
                out.push.push(mine.clone());
                out.report.pushed += 1;
            }
            out.merged.push(mine.clone());
            continue;
        };

        match winner(mine, theirs) {
            Winner::Remote => {
                trace!(id = %mine.id, "remote copy is newer");
                let mut adopted = (*theirs).clone();
                adopted.touch(mine.updated_at);
                out.merged.push(adopted);
                out.report.overwritten_locally += 1;
            }
            Winner::Local if mine == *theirs => {
                out.merged.push(mine.clone());
                out.report.unchanged += 1;
            }
            Winner::Local => {
                trace!(id = %mine.id, "local copy wins");
                out.merged.push(mine.clone());
                out.push.push(mine.clone());
                out.report.pushed += 1;
            }
        }
    }

    let local_ids: HashSet<ShapeId> = local.iter().map(|r| r.id).collect();
    for theirs in remote.into_iter().filter(|r| !local_ids.contains(&r.id)) {
        if theirs.is_expired(now) {
            trace!(id = %theirs.id, "remote-only shape already expired, not adopting");
            out.report.skipped_expired += 1;
            continue;
        }
        trace!(id = %theirs.id, "adopting remote-only shape");
        out.merged.push(theirs.clone());
        out.report.adopted += 1;
    }

    out
}
