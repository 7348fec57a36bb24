use std::collections::HashSet;

use common::product::{InvalidReference, Product, ProductId, extract_blob_keys, normalize};
use common::storage::BlobKey;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::report::{OrphanRecordReport, SweepError, SweepErrorKind};
use super::{MaintenanceError, MaintenanceService, SweepOptions};
use crate::store::DeleteOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum RecordVerdict {
    /// At least one referenced blob exists.
    Keep,
    /// A reference could not be resolved, so the record cannot be judged.
    Unjudgeable(Vec<InvalidReference>),
    /// The record holds a stock change whose log entry is not yet durable.
    AuditPending,
    /// No image survives; the keys are re-checked before deletion.
    Orphan(Vec<BlobKey>),
}

pub(super) fn classify_record(product: &Product, present: &HashSet<BlobKey>) -> RecordVerdict {
    if product.pending_audit.is_some() {
        return RecordVerdict::AuditPending;
    }
    let extracted = extract_blob_keys(product);
    if !extracted.is_clean() {
        return RecordVerdict::Unjudgeable(extracted.invalid);
    }
    if extracted.keys.iter().any(|key| present.contains(key)) {
        RecordVerdict::Keep
    } else {
        RecordVerdict::Orphan(extracted.keys)
    }
}

/// A record chosen for deletion in the decision phase.
#[derive(Debug, Clone)]
struct Candidate {
    id: ProductId,
    version: i64,
    keys: Vec<BlobKey>,
}

impl MaintenanceService {
    /// Delete records none of whose images exist, including records with no images.
    pub async fn sweep_orphan_records(
        &self,
        options: SweepOptions,
        cancel: &CancellationToken,
    ) -> Result<OrphanRecordReport, MaintenanceError> {
        let mut report = OrphanRecordReport::begin(options.dry_run);

        let Some(_guard) = self.acquire_sweep_lock(cancel).await else {
            warn!("Record sweep cancelled before it started");
            report.cancelled = true;
            return Ok(report.finish());
        };

        info!(dry_run = options.dry_run, "Starting orphan record sweep");

        let records = self
            .records
            .find_all()
            .await
            .map_err(MaintenanceError::RecordListing)?;
        let present: HashSet<BlobKey> = self
            .blobs
            .list()
            .await
            .map_err(MaintenanceError::BlobListing)?
            .into_iter()
            .map(|entry| entry.key)
            .collect();

        let mut candidates = Vec::new();

        for raw in records {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.scanned += 1;

            let product = normalize(raw);
            match classify_record(&product, &present) {
                RecordVerdict::Keep => {
                    debug!(product_id = %product.id, "Record has a surviving image, keeping");
                    report.retained += 1;
                }
                RecordVerdict::Unjudgeable(invalid) => {
                    report.retained += 1;
                    for bad in invalid {
                        warn!(
                            product_id = %product.id,
                            reference = %bad.reference,
                            cause = %bad.cause,
                            "Record has an invalid image reference, skipping"
                        );
                        report.errors.push(SweepError::new(
                            product.id,
                            SweepErrorKind::InvalidReference,
                            format!("reference '{}': {}", bad.reference, bad.cause),
                        ));
                    }
                }
                RecordVerdict::AuditPending => {
                    warn!(product_id = %product.id, "Record has an unconfirmed stock change, keeping");
                    report.retained += 1;
                    report.errors.push(pending_audit_error(product.id));
                }
                RecordVerdict::Orphan(keys) => candidates.push(Candidate {
                    id: product.id,
                    version: product.version,
                    keys,
                }),
            }
        }

        let batch_size = self.config.delete_batch_size.max(1);
        for batch in candidates.chunks(batch_size) {
            if report.cancelled || cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let confirmed = self.reverify(batch, &mut report, cancel).await;
            if confirmed.is_empty() {
                continue;
            }

            if options.dry_run {
                for (id, _) in confirmed {
                    info!(product_id = %id, "DRY-RUN: would delete orphan record");
                    report.would_delete.insert(id);
                }
                continue;
            }

            match self.records.delete_many_unchanged(&confirmed).await {
                Ok(outcomes) => {
                    for (id, outcome) in outcomes {
                        match outcome {
                            DeleteOutcome::Deleted => {
                                info!(product_id = %id, "Deleted orphan record");
                                report.deleted_ids.insert(id);
                            }
                            DeleteOutcome::NotFound => {
                                debug!(product_id = %id, "Orphan record already gone");
                            }
                            DeleteOutcome::Conflict => {
                                warn!(product_id = %id, "Record changed before delete, keeping");
                                report.errors.push(SweepError::new(
                                    id,
                                    SweepErrorKind::Conflict,
                                    "record changed since the sweep read it",
                                ));
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(batch = confirmed.len(), error = %e, "Bulk delete of orphan records failed");
                    for (id, _) in confirmed {
                        report.errors.push(SweepError::from_record(id, &e));
                    }
                }
            }
        }

        let report = report.finish();
        info!(
            scanned = report.scanned,
            deleted = report.deleted_ids.len(),
            would_delete = report.would_delete.len(),
            retained = report.retained,
            errors = report.errors.len(),
            cancelled = report.cancelled,
            "Orphan record sweep finished"
        );
        Ok(report)
    }

    /// Re-read each candidate and re-check its images just before deletion.
    /// Returns the `(id, version)` pairs that are still orphaned.
    async fn reverify(
        &self,
        batch: &[Candidate],
        report: &mut OrphanRecordReport,
        cancel: &CancellationToken,
    ) -> Vec<(ProductId, i64)> {
        let mut confirmed = Vec::with_capacity(batch.len());

        'candidates: for candidate in batch {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.records.find_by_id(candidate.id).await {
                Ok(None) => {
                    debug!(product_id = %candidate.id, "Orphan record already gone");
                    continue;
                }
                Ok(Some(current)) if current.version != candidate.version => {
                    warn!(product_id = %candidate.id, "Record changed since decision, keeping");
                    report.errors.push(SweepError::new(
                        candidate.id,
                        SweepErrorKind::Conflict,
                        format!(
                            "version moved from {} to {}",
                            candidate.version, current.version
                        ),
                    ));
                    continue;
                }
                Ok(Some(current)) if current.pending_audit.is_some() => {
                    warn!(product_id = %candidate.id, "Record gained an unconfirmed stock change, keeping");
                    report.retained += 1;
                    report.errors.push(pending_audit_error(candidate.id));
                    continue;
                }
                Ok(Some(_)) => {}
                Err(e) => {
                    warn!(product_id = %candidate.id, error = %e, "Failed to re-read record, keeping");
                    report.errors.push(SweepError::from_record(candidate.id, &e));
                    continue;
                }
            }

            for key in &candidate.keys {
                match self.blobs.exists(key).await {
                    Ok(false) => {}
                    Ok(true) => {
                        debug!(product_id = %candidate.id, key = %key, "Image reappeared, keeping");
                        report.retained += 1;
                        continue 'candidates;
                    }
                    Err(e) => {
                        warn!(product_id = %candidate.id, key = %key, error = %e, "Existence check failed, keeping");
                        report.errors.push(SweepError::from_storage(candidate.id, &e));
                        continue 'candidates;
                    }
                }
            }

            confirmed.push((candidate.id, candidate.version));
        }

        confirmed
    }
}

/// Deleting the record would lose the only copy of the outstanding log entry.
fn pending_audit_error(id: ProductId) -> SweepError {
    SweepError::new(
        id,
        SweepErrorKind::AuditPending,
        "stock change not yet on the inventory log",
    )
}
