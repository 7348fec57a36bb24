//! Product updates with an audited stock history.
//!
//! Every accepted write that changes `stock` produces exactly one inventory
//! log entry. Backends with transactions get both writes atomically. Without
//! them the stock write carries a pending audit marker on the record itself;
//! the entry is appended afterwards, idempotently on its dedup key, and the
//! marker cleared. A marker left behind by a crash or exhausted retries is
//! replayed by the next write to that record or by [`InventoryService::recover_pending_audits`].

use std::sync::Arc;

use common::config::AuditConfig;
use common::inventory::{InventoryLogEntry, PendingAudit, StockChange};
use common::product::{Product, ProductId, RawProduct, normalize};
use common::retry::RetryPolicy;
use tracing::{debug, error, info, instrument, warn};

use crate::store::{
    AppendOutcome, AuditContext, DeleteOutcome, ProductPatch, RecordError, RecordStore,
};

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("{0}")]
    Validation(String),

    #[error("product not found: {0}")]
    NotFound(ProductId),

    #[error("product {0} was modified concurrently")]
    Conflict(ProductId),

    /// The stock change is committed on the record but its log entry is not yet durable.
    #[error("inventory log append failed: {0}")]
    AuditAppend(String),

    #[error(transparent)]
    Store(RecordError),
}

impl From<RecordError> for UpdateError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound(id) => UpdateError::NotFound(id),
            RecordError::Conflict { id, .. } => UpdateError::Conflict(id),
            RecordError::LogAppend(msg) => UpdateError::AuditAppend(msg),
            other => UpdateError::Store(other),
        }
    }
}

/// Outcome of a pending-audit recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    pub replayed: usize,
    pub failed: usize,
}

pub struct InventoryService {
    records: Arc<dyn RecordStore>,
    retry: RetryPolicy,
}

impl InventoryService {
    pub fn new(records: Arc<dyn RecordStore>, config: &AuditConfig) -> Self {
        Self {
            records,
            retry: config.retry_policy(),
        }
    }

    /// Whether stock writes go through pending audit markers.
    ///
    /// Transactional backends never leave a marker behind, so recovery has nothing to scan for.
    pub fn writes_markers(&self) -> bool {
        self.records.transactional().is_none()
    }

    /// Apply `patch` to a product, logging any stock change under `audit`.
    #[instrument(skip(self, patch, audit), fields(actor = %audit.actor_id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        mut patch: ProductPatch,
        audit: &AuditContext,
    ) -> Result<Product, UpdateError> {
        if let Some(stock) = patch.stock
            && stock < 0
        {
            return Err(UpdateError::Validation(
                "stock must not be negative".to_string(),
            ));
        }
        if audit.actor_id.trim().is_empty() {
            return Err(UpdateError::Validation("actor id is required".to_string()));
        }
        patch.pending_audit = None;

        if let Some(tx) = self.records.transactional() {
            let raw = tx.update_with_audit(id, &patch, audit).await?;
            return Ok(normalize(raw));
        }

        self.update_with_marker(id, patch, audit).await
    }

    /// Delete a product once any outstanding log entry for it is durable.
    ///
    /// The delete is conditional on the version read here, so a stock change
    /// committed in between turns into `Conflict` instead of being lost.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), UpdateError> {
        let mut current = self
            .records
            .find_by_id(id)
            .await?
            .ok_or(UpdateError::NotFound(id))?;

        if current.pending_audit.is_some() {
            current = self.flush_pending(current).await?;
            if current.pending_audit.is_some() {
                // A newer unconfirmed stock change landed while flushing.
                return Err(UpdateError::Conflict(id));
            }
        }

        let outcomes = self
            .records
            .delete_many_unchanged(&[(id, current.version)])
            .await?;
        match outcomes.first().map(|(_, outcome)| *outcome) {
            Some(DeleteOutcome::Deleted) => Ok(()),
            Some(DeleteOutcome::Conflict) => Err(UpdateError::Conflict(id)),
            Some(DeleteOutcome::NotFound) | None => Err(UpdateError::NotFound(id)),
        }
    }

    /// List log entries, newest first.
    pub async fn list_logs(
        &self,
        product_id: Option<ProductId>,
    ) -> Result<Vec<InventoryLogEntry>, RecordError> {
        self.records.list_log_entries(product_id).await
    }

    /// Replay every outstanding pending audit marker.
    pub async fn recover_pending_audits(&self) -> Result<RecoverySummary, RecordError> {
        let mut summary = RecoverySummary::default();

        for raw in self.records.find_all().await? {
            if raw.pending_audit.is_none() {
                continue;
            }
            let id = raw.id;
            match self.flush_pending(raw).await {
                Ok(_) => summary.replayed += 1,
                Err(e) => {
                    error!(product_id = %id, error = %e, "Pending audit replay failed");
                    summary.failed += 1;
                }
            }
        }

        if summary.replayed > 0 || summary.failed > 0 {
            info!(
                replayed = summary.replayed,
                failed = summary.failed,
                "Pending audit recovery finished"
            );
        }
        Ok(summary)
    }

    async fn update_with_marker(
        &self,
        id: ProductId,
        mut patch: ProductPatch,
        audit: &AuditContext,
    ) -> Result<Product, UpdateError> {
        let mut current = self
            .records
            .find_by_id(id)
            .await?
            .ok_or(UpdateError::NotFound(id))?;

        // An earlier change must be on the log before this one is accepted.
        if current.pending_audit.is_some() {
            current = self.flush_pending(current).await?;
            if current.pending_audit.is_some() {
                // A newer unconfirmed stock change landed while flushing.
                return Err(UpdateError::Conflict(id));
            }
        }

        let change = patch
            .stock
            .and_then(|stock| StockChange::between(current.stock, stock));

        let Some(change) = change else {
            let updated = self
                .records
                .update_fields(id, &patch, Some(current.version))
                .await?;
            return Ok(normalize(updated));
        };

        let pending = PendingAudit::new(
            id,
            current.version + 1,
            audit.actor_id.as_str(),
            audit.reason,
            change,
        );
        debug!(product_id = %id, change = pending.change, dedup_key = %pending.dedup_key, "Committing stock change");
        patch.pending_audit = Some(Some(pending));

        let committed = self
            .records
            .update_fields(id, &patch, Some(current.version))
            .await?;

        let confirmed = self.flush_pending(committed).await?;
        Ok(normalize(confirmed))
    }

    /// Append the record's outstanding log entry, then clear its marker.
    async fn flush_pending(&self, raw: RawProduct) -> Result<RawProduct, UpdateError> {
        let Some(entry) = raw.pending_audit.as_ref().map(|p| p.to_entry(raw.id)) else {
            return Ok(raw);
        };

        let outcome = self
            .retry
            .run(|_| self.records.append_log_entry(&entry))
            .await
            .map_err(|e| {
                error!(
                    product_id = %raw.id,
                    dedup_key = %entry.dedup_key,
                    attempts = e.attempts,
                    error = %e.last_error,
                    "Inventory log append exhausted retries, marker kept for replay"
                );
                UpdateError::AuditAppend(e.to_string())
            })?;

        if outcome == AppendOutcome::Duplicate {
            debug!(product_id = %raw.id, dedup_key = %entry.dedup_key, "Log entry already recorded");
        }

        let clear = ProductPatch {
            pending_audit: Some(None),
            ..Default::default()
        };
        match self
            .records
            .update_fields(raw.id, &clear, Some(raw.version))
            .await
        {
            Ok(cleared) => Ok(cleared),
            Err(RecordError::Conflict { .. }) => {
                // Another writer moved the record; it flushes the marker itself.
                warn!(product_id = %raw.id, "Record changed before marker could be cleared");
                let latest = self.records.find_by_id(raw.id).await?;
                latest.ok_or(UpdateError::NotFound(raw.id))
            }
            Err(e) => Err(e.into()),
        }
    }
}
