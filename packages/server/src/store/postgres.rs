use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::inventory::{InventoryLogEntry, InventoryReason, NewInventoryLogEntry, StockChange};
use common::product::{ProductId, RawProduct};
use common::PendingAudit;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use tracing::{debug, error};

use crate::entity::{inventory_log, product};

use super::{
    AppendOutcome, AuditContext, DeleteOutcome, ProductPatch, RecordError, RecordStore,
    TransactionalRecordStore,
};

impl From<DbErr> for RecordError {
    fn from(err: DbErr) -> Self {
        RecordError::Backend(err.to_string())
    }
}

/// Record store backed by the relational database.
#[derive(Clone)]
pub struct SeaOrmRecordStore {
    db: DatabaseConnection,
}

impl SeaOrmRecordStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for SeaOrmRecordStore {
    async fn find_all(&self) -> Result<Vec<RawProduct>, RecordError> {
        let models = product::Entity::find()
            .order_by_asc(product::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(to_raw).collect())
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<RawProduct>, RecordError> {
        let model = product::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(to_raw))
    }

    async fn update_fields(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        expected_version: Option<i64>,
    ) -> Result<RawProduct, RecordError> {
        let txn = self.db.begin().await?;

        let existing = product::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or(RecordError::NotFound(id))?;

        if let Some(expected) = expected_version
            && existing.version != expected
        {
            txn.rollback().await?;
            return Err(RecordError::Conflict { id, expected });
        }

        let updated = apply_patch(existing, patch)?.update(&txn).await?;
        txn.commit().await?;

        Ok(to_raw(updated))
    }

    async fn delete_by_id(&self, id: ProductId) -> Result<bool, RecordError> {
        let result = product::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_many_unchanged(
        &self,
        expected: &[(ProductId, i64)],
    ) -> Result<Vec<(ProductId, DeleteOutcome)>, RecordError> {
        if expected.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin().await?;
        let ids: Vec<ProductId> = expected.iter().map(|(id, _)| *id).collect();

        let current: HashMap<ProductId, i64> = product::Entity::find()
            .select_only()
            .column(product::Column::Id)
            .column(product::Column::Version)
            .filter(product::Column::Id.is_in(ids))
            .lock(LockType::Update)
            .into_tuple::<(ProductId, i64)>()
            .all(&txn)
            .await?
            .into_iter()
            .collect();

        let mut outcomes = Vec::with_capacity(expected.len());
        let mut deletable = Vec::new();
        for &(id, version) in expected {
            let outcome = match current.get(&id) {
                None => DeleteOutcome::NotFound,
                Some(&found) if found == version => {
                    deletable.push(id);
                    DeleteOutcome::Deleted
                }
                Some(_) => DeleteOutcome::Conflict,
            };
            outcomes.push((id, outcome));
        }

        if !deletable.is_empty() {
            product::Entity::delete_many()
                .filter(product::Column::Id.is_in(deletable))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;

        Ok(outcomes)
    }

    async fn append_log_entry(
        &self,
        entry: &NewInventoryLogEntry,
    ) -> Result<AppendOutcome, RecordError> {
        insert_log_entry(&self.db, entry)
            .await
            .map_err(|e| RecordError::LogAppend(e.to_string()))
    }

    async fn list_log_entries(
        &self,
        product_id: Option<ProductId>,
    ) -> Result<Vec<InventoryLogEntry>, RecordError> {
        let mut query = inventory_log::Entity::find();
        if let Some(product_id) = product_id {
            query = query.filter(inventory_log::Column::ProductId.eq(product_id));
        }

        let models = query
            .order_by_desc(inventory_log::Column::CreatedAt)
            .order_by_desc(inventory_log::Column::Id)
            .all(&self.db)
            .await?;

        models.into_iter().map(to_log_entry).collect()
    }

    fn transactional(&self) -> Option<&dyn TransactionalRecordStore> {
        Some(self)
    }
}

#[async_trait]
impl TransactionalRecordStore for SeaOrmRecordStore {
    async fn update_with_audit(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        audit: &AuditContext,
    ) -> Result<RawProduct, RecordError> {
        let txn = self.db.begin().await?;

        let existing = product::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or(RecordError::NotFound(id))?;

        let entry = patch
            .stock
            .and_then(|stock| StockChange::between(existing.stock, stock))
            .map(|change| {
                PendingAudit::new(
                    id,
                    existing.version + 1,
                    audit.actor_id.as_str(),
                    audit.reason,
                    change,
                )
                .to_entry(id)
            });

        let plain = ProductPatch {
            pending_audit: None,
            ..patch.clone()
        };
        let updated = apply_patch(existing, &plain)?.update(&txn).await?;

        if let Some(entry) = &entry {
            // Any failure here drops the transaction, rolling back the stock write.
            let outcome = insert_log_entry(&txn, entry)
                .await
                .map_err(|e| RecordError::LogAppend(e.to_string()))?;
            // A unique violation aborts the transaction, so commit would discard the stock write.
            if outcome == AppendOutcome::Duplicate {
                return Err(RecordError::LogAppend(format!(
                    "dedup key {} already recorded",
                    entry.dedup_key
                )));
            }
            debug!(product_id = %id, change = entry.change, "Inventory log entry written");
        }

        txn.commit().await?;
        Ok(to_raw(updated))
    }
}

/// Insert a log entry; a dedup key collision means it is already recorded.
async fn insert_log_entry<C: ConnectionTrait>(
    conn: &C,
    entry: &NewInventoryLogEntry,
) -> Result<AppendOutcome, DbErr> {
    let model = inventory_log::ActiveModel {
        product_id: Set(entry.product_id),
        actor_id: Set(entry.actor_id.clone()),
        change: Set(entry.change),
        reason: Set(entry.reason.to_string()),
        new_stock: Set(entry.new_stock),
        dedup_key: Set(entry.dedup_key.clone()),
        created_at: Set(entry.created_at),
        ..Default::default()
    };

    match model.insert(conn).await {
        Ok(_) => Ok(AppendOutcome::Appended),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Ok(AppendOutcome::Duplicate)
        }
        Err(e) => Err(e),
    }
}

fn apply_patch(
    existing: product::Model,
    patch: &ProductPatch,
) -> Result<product::ActiveModel, RecordError> {
    let version = existing.version;
    let mut active: product::ActiveModel = existing.into();

    if let Some(title) = &patch.title {
        active.title = Set(title.clone());
    }
    if let Some(price_cents) = patch.price_cents {
        active.price_cents = Set(price_cents);
    }
    if let Some(category) = &patch.category {
        active.category = Set(category.clone());
    }
    if let Some(images) = &patch.images {
        active.images = Set(Some(serde_json::to_value(images)?));
    }
    if let Some(stock) = patch.stock {
        active.stock = Set(stock);
    }
    if let Some(pending) = &patch.pending_audit {
        active.pending_audit = Set(pending.as_ref().map(serde_json::to_value).transpose()?);
    }
    active.version = Set(version + 1);
    active.updated_at = Set(Utc::now());

    Ok(active)
}

fn to_raw(model: product::Model) -> RawProduct {
    let id = model.id;
    let pending_audit = model.pending_audit.and_then(|value| {
        serde_json::from_value::<PendingAudit>(value)
            .inspect_err(|e| {
                error!(product_id = %id, error = %e, "Unreadable pending audit marker");
            })
            .ok()
    });

    RawProduct {
        id: model.id,
        title: model.title,
        price_cents: model.price_cents,
        category: model.category,
        images: model.images.map(decode_images),
        image: model.image,
        stock: model.stock,
        version: model.version,
        pending_audit,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// Non-string array elements become empty references, which key derivation rejects.
fn decode_images(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s,
                _ => String::new(),
            })
            .collect(),
        serde_json::Value::String(s) => vec![s],
        _ => Vec::new(),
    }
}

fn to_log_entry(model: inventory_log::Model) -> Result<InventoryLogEntry, RecordError> {
    let reason: InventoryReason = model
        .reason
        .parse()
        .map_err(RecordError::Backend)?;

    Ok(InventoryLogEntry {
        id: model.id,
        product_id: model.product_id,
        actor_id: model.actor_id,
        change: model.change,
        reason,
        new_stock: model.new_stock,
        created_at: model.created_at,
    })
}
