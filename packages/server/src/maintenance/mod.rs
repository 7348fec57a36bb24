//! Orphan sweeps over the record store and the blob store.
//!
//! Both sweeps take the shared sweep lock, so they never interleave with each
//! other. Ordinary product traffic never touches the lock; the sweeps guard
//! against concurrent writes with the upload grace period (files) and with
//! version-checked deletes (records).

mod orphan_files;
mod orphan_records;
mod report;
mod scheduler;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::config::MaintenanceConfig;
use common::storage::{BlobStore, StorageError};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::store::{RecordError, RecordStore};

pub use report::{OrphanFileReport, OrphanRecordReport, SweepError, SweepErrorKind};
pub use scheduler::run_maintenance_scheduler;

/// Failure to take the snapshot a sweep decides from.
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error("failed to list blob store: {0}")]
    BlobListing(#[source] StorageError),

    #[error("failed to list records: {0}")]
    RecordListing(#[source] RecordError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOptions {
    pub dry_run: bool,
}

pub struct MaintenanceService {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    config: MaintenanceConfig,
    sweep_lock: Mutex<()>,
}

impl MaintenanceService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            records,
            blobs,
            config,
            sweep_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    /// Options from configuration, optionally overriding `dry_run`.
    pub fn options(&self, dry_run: Option<bool>) -> SweepOptions {
        SweepOptions {
            dry_run: dry_run.unwrap_or(self.config.dry_run),
        }
    }

    /// Wait for the sweep lock; `None` if cancelled first.
    async fn acquire_sweep_lock(&self, cancel: &CancellationToken) -> Option<MutexGuard<'_, ()>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = self.sweep_lock.lock() => Some(guard),
        }
    }
}

/// Run `f` with a child of `parent` that is also cancelled once `timeout` elapses.
///
/// Sweeps observe the token between entries and return partial results.
pub async fn run_with_deadline<F, Fut, T>(parent: &CancellationToken, timeout: Duration, f: F) -> T
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
{
    let token = parent.child_token();
    let timer = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            token.cancel();
        })
    };

    let output = f(token).await;
    timer.abort();
    output
}
