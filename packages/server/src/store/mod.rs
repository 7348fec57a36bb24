//! Record store contract consumed by the consistency core.

mod postgres;

pub use postgres::SeaOrmRecordStore;

use async_trait::async_trait;
use chrono::Utc;
use common::inventory::{InventoryLogEntry, InventoryReason, NewInventoryLogEntry, PendingAudit};
use common::product::{ProductId, RawProduct};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("product not found: {0}")]
    NotFound(ProductId),

    #[error("product {id} changed concurrently (expected version {expected})")]
    Conflict { id: ProductId, expected: i64 },

    #[error("inventory log append failed: {0}")]
    LogAppend(String),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("record store error: {0}")]
    Backend(String),
}

/// Partial update of a product. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub price_cents: Option<i64>,
    pub category: Option<String>,
    pub images: Option<Vec<String>>,
    pub stock: Option<i32>,
    /// `Some(None)` clears the marker.
    pub pending_audit: Option<Option<PendingAudit>>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to an in-memory record, bumping its version.
    pub fn apply_to(&self, raw: &mut RawProduct) {
        if let Some(title) = &self.title {
            raw.title = title.clone();
        }
        if let Some(price_cents) = self.price_cents {
            raw.price_cents = price_cents;
        }
        if let Some(category) = &self.category {
            raw.category = category.clone();
        }
        if let Some(images) = &self.images {
            raw.images = Some(images.clone());
        }
        if let Some(stock) = self.stock {
            raw.stock = stock;
        }
        if let Some(pending) = &self.pending_audit {
            raw.pending_audit = pending.clone();
        }
        raw.version += 1;
        raw.updated_at = Utc::now();
    }
}

/// Per-record result of a conditional bulk delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Already gone.
    NotFound,
    /// The record's version moved since the caller read it.
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// An entry with the same dedup key already exists.
    Duplicate,
}

/// Who changed the stock, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditContext {
    pub actor_id: String,
    pub reason: InventoryReason,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<RawProduct>, RecordError>;

    async fn find_by_id(&self, id: ProductId) -> Result<Option<RawProduct>, RecordError>;

    /// Apply `patch`; with `expected_version`, fail with `Conflict` if the record moved.
    async fn update_fields(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        expected_version: Option<i64>,
    ) -> Result<RawProduct, RecordError>;

    /// Unconditional delete. Returns `false` if the record did not exist.
    async fn delete_by_id(&self, id: ProductId) -> Result<bool, RecordError>;

    /// Delete every `(id, version)` pair whose record is still at that version.
    async fn delete_many_unchanged(
        &self,
        expected: &[(ProductId, i64)],
    ) -> Result<Vec<(ProductId, DeleteOutcome)>, RecordError>;

    /// Append an inventory log entry, idempotent on its dedup key.
    async fn append_log_entry(
        &self,
        entry: &NewInventoryLogEntry,
    ) -> Result<AppendOutcome, RecordError>;

    /// Log entries, newest first, optionally for one product.
    async fn list_log_entries(
        &self,
        product_id: Option<ProductId>,
    ) -> Result<Vec<InventoryLogEntry>, RecordError>;

    /// Multi-record transaction support, when the backend has it.
    fn transactional(&self) -> Option<&dyn TransactionalRecordStore> {
        None
    }
}

#[async_trait]
pub trait TransactionalRecordStore: Send + Sync {
    /// Lock the record, apply `patch` and append a log entry for any stock
    /// change, all in one transaction.
    async fn update_with_audit(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        audit: &AuditContext,
    ) -> Result<RawProduct, RecordError>;
}
