use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::product::{RawProduct, extract_blob_keys, normalize};
use common::storage::{BlobEntry, BlobKey};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::report::{OrphanFileReport, SweepError, SweepErrorKind};
use super::{MaintenanceError, MaintenanceService, SweepOptions};

/// What the file sweep does with one listed blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FileVerdict {
    Referenced,
    /// Unreferenced but inside the grace period, or of unknown age.
    TooRecent,
    Orphan,
}

pub(super) fn classify_blob(
    entry: &BlobEntry,
    referenced: &HashSet<BlobKey>,
    cutoff: DateTime<Utc>,
) -> FileVerdict {
    if referenced.contains(&entry.key) {
        return FileVerdict::Referenced;
    }
    match entry.modified {
        Some(modified) if modified <= cutoff => FileVerdict::Orphan,
        _ => FileVerdict::TooRecent,
    }
}

/// Every blob key referenced by any record. A bad reference is reported and
/// skipped; the record's other references still count.
fn referenced_keys(records: Vec<RawProduct>, errors: &mut Vec<SweepError>) -> HashSet<BlobKey> {
    let mut keys = HashSet::new();
    for raw in records {
        let product = normalize(raw);
        let extracted = extract_blob_keys(&product);
        for invalid in extracted.invalid {
            warn!(
                product_id = %product.id,
                reference = %invalid.reference,
                cause = %invalid.cause,
                "Skipping invalid image reference"
            );
            errors.push(SweepError::new(
                product.id,
                SweepErrorKind::InvalidReference,
                format!("reference '{}': {}", invalid.reference, invalid.cause),
            ));
        }
        keys.extend(extracted.keys);
    }
    keys
}

impl MaintenanceService {
    /// Delete blobs no record references and that are older than the grace period.
    pub async fn sweep_orphan_files(
        &self,
        options: SweepOptions,
        cancel: &CancellationToken,
    ) -> Result<OrphanFileReport, MaintenanceError> {
        let mut report = OrphanFileReport::begin(options.dry_run);

        let Some(_guard) = self.acquire_sweep_lock(cancel).await else {
            warn!("File sweep cancelled before it started");
            report.cancelled = true;
            return Ok(report.finish());
        };

        let cutoff = report.started_at - self.config.grace_period();
        info!(dry_run = options.dry_run, %cutoff, "Starting orphan file sweep");

        let entries = self
            .blobs
            .list()
            .await
            .map_err(MaintenanceError::BlobListing)?;
        let records = self
            .records
            .find_all()
            .await
            .map_err(MaintenanceError::RecordListing)?;

        let referenced = referenced_keys(records, &mut report.errors);

        for entry in entries {
            if cancel.is_cancelled() {
                warn!(deleted = report.deleted_keys.len(), "File sweep cancelled");
                report.cancelled = true;
                break;
            }
            report.scanned += 1;

            match classify_blob(&entry, &referenced, cutoff) {
                FileVerdict::Referenced => {
                    debug!(key = %entry.key, "Blob referenced, keeping");
                    report.retained += 1;
                }
                FileVerdict::TooRecent => {
                    debug!(key = %entry.key, modified = ?entry.modified, "Unreferenced blob within grace period, skipping");
                    report.skipped_recent += 1;
                }
                FileVerdict::Orphan if options.dry_run => {
                    info!(key = %entry.key, "DRY-RUN: would delete orphan blob");
                    report.would_delete.insert(entry.key.into_string());
                }
                FileVerdict::Orphan => match self.blobs.delete(&entry.key).await {
                    Ok(true) => {
                        info!(key = %entry.key, "Deleted orphan blob");
                        report.deleted_keys.insert(entry.key.into_string());
                    }
                    Ok(false) => {
                        debug!(key = %entry.key, "Orphan blob already gone");
                    }
                    Err(e) => {
                        warn!(key = %entry.key, code = e.code(), error = %e, "Failed to delete orphan blob");
                        report.errors.push(SweepError::from_storage(&entry.key, &e));
                    }
                },
            }
        }

        let report = report.finish();
        info!(
            scanned = report.scanned,
            deleted = report.deleted_keys.len(),
            would_delete = report.would_delete.len(),
            retained = report.retained,
            skipped_recent = report.skipped_recent,
            errors = report.errors.len(),
            cancelled = report.cancelled,
            "Orphan file sweep finished"
        );
        Ok(report)
    }
}
