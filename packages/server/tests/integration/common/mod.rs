use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use common::config::{AuditConfig, DisplayConfig, MaintenanceConfig, StorageConfig};
use common::inventory::{InventoryLogEntry, NewInventoryLogEntry, PendingAudit, StockChange};
use common::product::{ProductId, RawProduct};
use common::storage::filesystem::FilesystemBlobStore;
use common::storage::{BlobEntry, BlobKey, BlobStore, StorageError};
use common::DisplayMode;
use reqwest::Client;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use server::config::{AppConfig, CorsConfig, DatabaseConfig, ServerConfig};
use server::inventory::InventoryService;
use server::maintenance::MaintenanceService;
use server::state::AppState;
use server::store::{
    AppendOutcome, AuditContext, DeleteOutcome, ProductPatch, RecordError, RecordStore,
    TransactionalRecordStore,
};

pub mod postgres;

type Products = BTreeMap<ProductId, RawProduct>;
type Hook = Box<dyn FnOnce(&mut Products) + Send>;

/// In-memory record store with fault injection.
#[derive(Default)]
pub struct MemoryRecordStore {
    products: Mutex<Products>,
    logs: Mutex<Vec<(String, InventoryLogEntry)>>,
    next_log_id: AtomicI32,
    /// The next N appends fail.
    failing_appends: AtomicU32,
    append_calls: AtomicU32,
    /// Runs once, inside the next `find_all`, before the read.
    on_find_all: Mutex<Option<Hook>>,
    /// Runs once, inside the next `find_by_id`, before the read.
    on_find_by_id: Mutex<Option<Hook>>,
    /// Runs once, inside the next `delete_many_unchanged`, before the version check.
    on_bulk_delete: Mutex<Option<Hook>>,
    supports_transactions: bool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactional() -> Self {
        Self {
            supports_transactions: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, raw: RawProduct) -> ProductId {
        let id = raw.id;
        self.products.lock().unwrap().insert(id, raw);
        id
    }

    pub fn get(&self, id: ProductId) -> Option<RawProduct> {
        self.products.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.products.lock().unwrap().len()
    }

    pub fn logs(&self) -> Vec<InventoryLogEntry> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn fail_next_appends(&self, n: u32) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    pub fn append_calls(&self) -> u32 {
        self.append_calls.load(Ordering::SeqCst)
    }

    pub fn on_next_find_all(&self, hook: impl FnOnce(&mut Products) + Send + 'static) {
        *self.on_find_all.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn on_next_find_by_id(&self, hook: impl FnOnce(&mut Products) + Send + 'static) {
        *self.on_find_by_id.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn on_next_bulk_delete(&self, hook: impl FnOnce(&mut Products) + Send + 'static) {
        *self.on_bulk_delete.lock().unwrap() = Some(Box::new(hook));
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn push_log(
        &self,
        logs: &mut Vec<(String, InventoryLogEntry)>,
        entry: &NewInventoryLogEntry,
    ) -> AppendOutcome {
        if logs.iter().any(|(key, _)| *key == entry.dedup_key) {
            return AppendOutcome::Duplicate;
        }
        let id = self.next_log_id.fetch_add(1, Ordering::SeqCst) + 1;
        logs.push((
            entry.dedup_key.clone(),
            InventoryLogEntry {
                id,
                product_id: entry.product_id,
                actor_id: entry.actor_id.clone(),
                change: entry.change,
                reason: entry.reason,
                new_stock: entry.new_stock,
                created_at: entry.created_at,
            },
        ));
        AppendOutcome::Appended
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_all(&self) -> Result<Vec<RawProduct>, RecordError> {
        let hook = self.on_find_all.lock().unwrap().take();
        let mut products = self.products.lock().unwrap();
        if let Some(hook) = hook {
            hook(&mut products);
        }
        Ok(products.values().cloned().collect())
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<RawProduct>, RecordError> {
        let hook = self.on_find_by_id.lock().unwrap().take();
        let mut products = self.products.lock().unwrap();
        if let Some(hook) = hook {
            hook(&mut products);
        }
        Ok(products.get(&id).cloned())
    }

    async fn update_fields(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        expected_version: Option<i64>,
    ) -> Result<RawProduct, RecordError> {
        let mut products = self.products.lock().unwrap();
        let raw = products.get_mut(&id).ok_or(RecordError::NotFound(id))?;
        if let Some(expected) = expected_version
            && raw.version != expected
        {
            return Err(RecordError::Conflict { id, expected });
        }
        patch.apply_to(raw);
        Ok(raw.clone())
    }

    async fn delete_by_id(&self, id: ProductId) -> Result<bool, RecordError> {
        Ok(self.products.lock().unwrap().remove(&id).is_some())
    }

    async fn delete_many_unchanged(
        &self,
        expected: &[(ProductId, i64)],
    ) -> Result<Vec<(ProductId, DeleteOutcome)>, RecordError> {
        let hook = self.on_bulk_delete.lock().unwrap().take();
        let mut products = self.products.lock().unwrap();
        if let Some(hook) = hook {
            hook(&mut products);
        }

        let outcomes = expected
            .iter()
            .map(|&(id, version)| {
                let outcome = match products.get(&id) {
                    None => DeleteOutcome::NotFound,
                    Some(raw) if raw.version == version => {
                        products.remove(&id);
                        DeleteOutcome::Deleted
                    }
                    Some(_) => DeleteOutcome::Conflict,
                };
                (id, outcome)
            })
            .collect();
        Ok(outcomes)
    }

    async fn append_log_entry(
        &self,
        entry: &NewInventoryLogEntry,
    ) -> Result<AppendOutcome, RecordError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_injected_failure() {
            return Err(RecordError::LogAppend("injected append failure".into()));
        }
        let mut logs = self.logs.lock().unwrap();
        Ok(self.push_log(&mut logs, entry))
    }

    async fn list_log_entries(
        &self,
        product_id: Option<ProductId>,
    ) -> Result<Vec<InventoryLogEntry>, RecordError> {
        let mut entries: Vec<_> = self
            .logs()
            .into_iter()
            .filter(|e| product_id.is_none_or(|id| e.product_id == id))
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    fn transactional(&self) -> Option<&dyn TransactionalRecordStore> {
        if self.supports_transactions {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl TransactionalRecordStore for MemoryRecordStore {
    async fn update_with_audit(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        audit: &AuditContext,
    ) -> Result<RawProduct, RecordError> {
        let mut products = self.products.lock().unwrap();
        let mut logs = self.logs.lock().unwrap();

        let current = products.get(&id).ok_or(RecordError::NotFound(id))?;
        let entry = patch
            .stock
            .and_then(|stock| StockChange::between(current.stock, stock))
            .map(|change| {
                PendingAudit::new(
                    id,
                    current.version + 1,
                    audit.actor_id.as_str(),
                    audit.reason,
                    change,
                )
                .to_entry(id)
            });

        if entry.is_some() {
            self.append_calls.fetch_add(1, Ordering::SeqCst);
            if self.take_injected_failure() {
                return Err(RecordError::LogAppend("injected append failure".into()));
            }
        }

        let mut updated = current.clone();
        patch.apply_to(&mut updated);
        if let Some(entry) = &entry
            && self.push_log(&mut logs, entry) == AppendOutcome::Duplicate
        {
            return Err(RecordError::LogAppend(format!(
                "dedup key {} already recorded",
                entry.dedup_key
            )));
        }
        products.insert(id, updated.clone());
        Ok(updated)
    }
}

pub fn product(images: &[&str]) -> RawProduct {
    let now = Utc::now();
    RawProduct {
        id: Uuid::now_v7(),
        title: "Desk lamp".to_string(),
        price_cents: 2499,
        category: "lighting".to_string(),
        images: Some(images.iter().map(|s| s.to_string()).collect()),
        image: None,
        stock: 10,
        version: 1,
        pending_audit: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn legacy_product(image: &str) -> RawProduct {
    RawProduct {
        images: None,
        image: Some(image.to_string()),
        ..product(&[])
    }
}

pub fn audit(actor: &str) -> AuditContext {
    AuditContext {
        actor_id: actor.to_string(),
        reason: common::InventoryReason::Edit,
    }
}

/// Retry policy that never sleeps.
pub fn instant_audit(max_retries: u8) -> AuditConfig {
    AuditConfig {
        max_retries,
        base_delay_ms: 0,
        max_delay_ms: 0,
    }
}

/// A record store plus a blob store over a temporary directory.
pub struct Fixture {
    pub records: Arc<MemoryRecordStore>,
    pub blobs: Arc<FilesystemBlobStore>,
    pub dir: TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_records(MemoryRecordStore::new()).await
    }

    pub async fn with_records(records: MemoryRecordStore) -> Self {
        let dir = TempDir::new().unwrap();
        let blobs = FilesystemBlobStore::new(dir.path().join("uploads"))
            .await
            .unwrap();
        Self {
            records: Arc::new(records),
            blobs: Arc::new(blobs),
            dir,
        }
    }

    /// Write a blob and backdate its modification time by `age`.
    pub async fn put_blob(&self, name: &str, age: Duration) {
        let key = BlobKey::parse(name).unwrap();
        self.blobs.put(&key, b"image-bytes").await.unwrap();

        let path = self.blobs.base_path().join(name);
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    pub fn blob_exists(&self, name: &str) -> bool {
        self.blobs.base_path().join(name).is_file()
    }

    pub fn maintenance(&self, config: MaintenanceConfig) -> MaintenanceService {
        MaintenanceService::new(self.records.clone(), self.blobs.clone(), config)
    }

    /// Sweeps whose blob store cancels `token` after the first successful delete.
    pub fn maintenance_cancelling_after_delete(
        &self,
        config: MaintenanceConfig,
        token: CancellationToken,
    ) -> MaintenanceService {
        let blobs = Arc::new(CancelAfterDelete {
            inner: self.blobs.clone(),
            token,
        });
        MaintenanceService::new(self.records.clone(), blobs, config)
    }

    pub fn inventory(&self, audit: AuditConfig) -> InventoryService {
        InventoryService::new(self.records.clone(), &audit)
    }
}

/// Delegates to the filesystem store and cancels `token` once a delete has gone through.
struct CancelAfterDelete {
    inner: Arc<FilesystemBlobStore>,
    token: CancellationToken,
}

#[async_trait]
impl BlobStore for CancelAfterDelete {
    async fn put(&self, key: &BlobKey, data: &[u8]) -> Result<(), StorageError> {
        self.inner.put(key, data).await
    }

    async fn list(&self) -> Result<Vec<BlobEntry>, StorageError> {
        self.inner.list().await
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError> {
        let deleted = self.inner.delete(key).await?;
        if deleted {
            self.token.cancel();
        }
        Ok(deleted)
    }
}

pub const HOUR: Duration = Duration::from_secs(3600);

pub mod routes {
    use uuid::Uuid;

    pub const PRODUCTS: &str = "/api/v1/products";
    pub const INVENTORY_LOGS: &str = "/api/v1/inventory/logs";
    pub const ORPHAN_FILES: &str = "/api/v1/maintenance/orphan-files";
    pub const ORPHAN_RECORDS: &str = "/api/v1/maintenance/orphan-records";
    pub const PENDING_AUDITS: &str = "/api/v1/maintenance/pending-audits";

    pub fn product(id: Uuid) -> String {
        format!("/api/v1/products/{id}")
    }

    pub fn product_logs(id: Uuid) -> String {
        format!("/api/v1/products/{id}/inventory-logs")
    }
}

/// A running test server over a [`Fixture`].
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub fixture: Fixture,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }
}

impl TestApp {
    pub async fn spawn(mode: DisplayMode) -> Self {
        let fixture = Fixture::new().await;

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
            },
            database: DatabaseConfig {
                url: "postgres://unused".to_string(),
            },
            storage: StorageConfig {
                uploads_dir: fixture.blobs.base_path().to_path_buf(),
            },
            display: DisplayConfig { mode },
            maintenance: MaintenanceConfig::default(),
            audit: instant_audit(2),
        };

        let state = AppState::new(
            app_config,
            fixture.records.clone(),
            fixture.blobs.clone(),
            CancellationToken::new(),
        );
        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            fixture,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn post(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn patch_as(&self, path: &str, body: &Value, actor: Option<&str>) -> TestResponse {
        let mut req = self.client.patch(self.url(path)).json(body);
        if let Some(actor) = actor {
            req = req.header("X-Actor-Id", actor);
        }
        let res = req.send().await.expect("Failed to send PATCH request");

        TestResponse::from_response(res).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }
}
