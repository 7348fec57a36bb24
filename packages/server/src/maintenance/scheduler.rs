use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::inventory::InventoryService;

use super::{MaintenanceService, run_with_deadline};

/// Run pending-audit recovery and both sweeps every `interval` until `shutdown`.
pub async fn run_maintenance_scheduler(
    maintenance: Arc<MaintenanceService>,
    inventory: Arc<InventoryService>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(
        interval_secs = interval.as_secs(),
        grace_period_secs = maintenance.config().grace_period_secs,
        dry_run = maintenance.config().dry_run,
        "Starting maintenance scheduler"
    );

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; start one interval after boot.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        run_scheduled_pass(&maintenance, &inventory, &shutdown).await;
    }

    info!("Maintenance scheduler stopped");
}

async fn run_scheduled_pass(
    maintenance: &MaintenanceService,
    inventory: &InventoryService,
    shutdown: &CancellationToken,
) {
    if !inventory.writes_markers() {
        debug!("Record store is transactional, skipping pending audit recovery");
    } else if let Err(e) = inventory.recover_pending_audits().await {
        error!(error = %e, "Pending audit recovery failed");
    }

    let options = maintenance.options(None);
    let timeout = maintenance.config().sweep_timeout();

    let files = run_with_deadline(shutdown, timeout, |token| async move {
        maintenance.sweep_orphan_files(options, &token).await
    })
    .await;
    if let Err(e) = files {
        error!(error = %e, "Scheduled orphan file sweep failed");
    }

    if shutdown.is_cancelled() {
        return;
    }

    let records = run_with_deadline(shutdown, timeout, |token| async move {
        maintenance.sweep_orphan_records(options, &token).await
    })
    .await;
    if let Err(e) = records {
        error!(error = %e, "Scheduled orphan record sweep failed");
    }
}
