//! One sync cycle: fetch, merge into the local store, push.
//!
//! At most one cycle runs at a time per engine. A cycle that fails leaves
//! whatever was merged so far in place; the next cycle recomputes from
//! scratch.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geozone_core::SyncError;
use geozone_store::LocalStore;
use tracing::{debug, info, warn};

use crate::reconcile::{reconcile, SyncReport};
use crate::remote::RemoteStore;

/// Default bound on each remote call
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for sync behavior
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on `fetch_all` and on `push`, each
    pub timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}

/// Reconciles a [`LocalStore`] against a [`RemoteStore`]
pub struct SyncEngine {
    store: LocalStore,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("in_flight", &self.is_syncing())
            .finish()
    }
}

/// Clears the in-flight flag however the cycle ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self {
            store,
            remote,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one cycle.
    ///
    /// Fails fast with [`SyncError::AlreadyRunning`] if another cycle is in
    /// progress. The merge runs inside a store transaction so local edits
    /// made while the fetch was outstanding are merged, not overwritten.
    pub async fn sync_once(&self) -> Result<SyncReport, SyncError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync requested while one is in flight");
            return Err(SyncError::AlreadyRunning);
        }
        let _guard = InFlight(&self.in_flight);

        let remote = self.bounded("fetch", self.remote.fetch_all()).await?;
        debug!(remote = remote.len(), "fetched remote snapshot");

        let (push, report) = self
            .store
            .transact(|records| {
                let merged = reconcile(records, &remote, Utc::now());
                *records = merged.merged;
                (merged.push, merged.report)
            })
            .await;

        if !push.is_empty() {
            let count = push.len();
            if let Err(e) = self.bounded("push", self.remote.push(push)).await {
                warn!(error = %e, count, "push failed, will retry next sync");
                return Err(e);
            }
        }

        info!(
            adopted = report.adopted,
            overwritten = report.overwritten_locally,
            pushed = report.pushed,
            unchanged = report.unchanged,
            skipped_expired = report.skipped_expired,
            "sync complete"
        );
        Ok(report)
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, SyncError>>,
    ) -> Result<T, SyncError> {
        let after = self.config.timeout;
        match tokio::time::timeout(after, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout { operation, after }),
        }
    }
}
