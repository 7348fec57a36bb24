use std::sync::Arc;

use common::storage::BlobStore;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::inventory::InventoryService;
use crate::maintenance::MaintenanceService;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub records: Arc<dyn RecordStore>,
    pub blob_store: Arc<dyn BlobStore>,
    pub inventory: Arc<InventoryService>,
    pub maintenance: Arc<MaintenanceService>,
    /// Cancelled on shutdown; in-flight sweeps stop at the next entry.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        records: Arc<dyn RecordStore>,
        blob_store: Arc<dyn BlobStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let inventory = Arc::new(InventoryService::new(records.clone(), &config.audit));
        let maintenance = Arc::new(MaintenanceService::new(
            records.clone(),
            blob_store.clone(),
            config.maintenance.clone(),
        ));

        Self {
            config: Arc::new(config),
            records,
            blob_store,
            inventory,
            maintenance,
            shutdown,
        }
    }
}
