use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::storage::StorageError;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::RecordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SweepErrorKind {
    InvalidReference,
    PermissionDenied,
    IoFailure,
    /// The record changed between decision and delete.
    Conflict,
    /// The record carries a stock change not yet on the inventory log.
    AuditPending,
    StoreFailure,
}

/// A per-entry failure recorded by a sweep. The entry was left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepError {
    /// Blob key or product id.
    pub target: String,
    pub kind: SweepErrorKind,
    pub cause: String,
}

impl SweepError {
    pub fn new(target: impl ToString, kind: SweepErrorKind, cause: impl Into<String>) -> Self {
        Self {
            target: target.to_string(),
            kind,
            cause: cause.into(),
        }
    }

    pub fn from_storage(target: impl ToString, err: &StorageError) -> Self {
        let kind = match err {
            StorageError::InvalidKey(_) => SweepErrorKind::InvalidReference,
            StorageError::PermissionDenied(_) => SweepErrorKind::PermissionDenied,
            StorageError::NotFound(_) | StorageError::Io(_) => SweepErrorKind::IoFailure,
        };
        Self::new(target, kind, err.to_string())
    }

    pub fn from_record(target: impl ToString, err: &RecordError) -> Self {
        let kind = match err {
            RecordError::Conflict { .. } => SweepErrorKind::Conflict,
            _ => SweepErrorKind::StoreFailure,
        };
        Self::new(target, kind, err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrphanFileReport {
    /// Blobs listed.
    pub scanned: usize,
    pub deleted_keys: BTreeSet<String>,
    /// Dry-run candidates.
    pub would_delete: BTreeSet<String>,
    /// Blobs still referenced by a record.
    pub retained: usize,
    /// Unreferenced blobs inside the grace period or with no modification time.
    pub skipped_recent: usize,
    pub errors: Vec<SweepError>,
    pub cancelled: bool,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OrphanFileReport {
    pub(super) fn begin(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            scanned: 0,
            deleted_keys: BTreeSet::new(),
            would_delete: BTreeSet::new(),
            retained: 0,
            skipped_recent: 0,
            errors: Vec::new(),
            cancelled: false,
            dry_run,
            started_at: now,
            finished_at: now,
        }
    }

    pub(super) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrphanRecordReport {
    /// Records examined.
    pub scanned: usize,
    pub deleted_ids: BTreeSet<Uuid>,
    /// Dry-run candidates.
    pub would_delete: BTreeSet<Uuid>,
    /// Records kept: at least one image exists, or a reference could not be judged.
    pub retained: usize,
    pub errors: Vec<SweepError>,
    pub cancelled: bool,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OrphanRecordReport {
    pub(super) fn begin(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            scanned: 0,
            deleted_ids: BTreeSet::new(),
            would_delete: BTreeSet::new(),
            retained: 0,
            errors: Vec::new(),
            cancelled: false,
            dry_run,
            started_at: now,
            finished_at: now,
        }
    }

    pub(super) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}
