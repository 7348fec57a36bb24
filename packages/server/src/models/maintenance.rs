use serde::{Deserialize, Serialize};

use crate::inventory::RecoverySummary;

/// Query parameters for the sweep triggers.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SweepQuery {
    /// Report what would be deleted without deleting. Defaults to the configured value.
    #[param(example = true)]
    pub dry_run: Option<bool>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct PendingAuditRecoveryResponse {
    /// Markers whose log entry is now durable.
    #[schema(example = 2)]
    pub replayed: usize,
    /// Markers still outstanding after this pass.
    #[schema(example = 0)]
    pub failed: usize,
}

impl From<RecoverySummary> for PendingAuditRecoveryResponse {
    fn from(s: RecoverySummary) -> Self {
        Self {
            replayed: s.replayed,
            failed: s.failed,
        }
    }
}
