use axum::{
    Json,
    extract::{Query, State},
};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::maintenance::{OrphanFileReport, OrphanRecordReport, run_with_deadline};
use crate::models::maintenance::*;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/maintenance/orphan-files",
    tag = "Maintenance",
    operation_id = "sweepOrphanFiles",
    summary = "Delete unreferenced image files",
    description = "Deletes blobs that no product references and that are older than the configured grace period. Waits for any running sweep to finish first. Stops at the configured timeout and returns partial results with `cancelled = true`.",
    params(SweepQuery),
    responses(
        (status = 200, description = "Sweep report", body = OrphanFileReport),
        (status = 500, description = "Snapshot failed (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn sweep_orphan_files(
    State(state): State<AppState>,
    Query(query): Query<SweepQuery>,
) -> Result<Json<OrphanFileReport>, AppError> {
    let maintenance = state.maintenance.as_ref();
    let options = maintenance.options(query.dry_run);
    let timeout = maintenance.config().sweep_timeout();

    let report = run_with_deadline(&state.shutdown, timeout, |token| async move {
        maintenance.sweep_orphan_files(options, &token).await
    })
    .await?;

    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/maintenance/orphan-records",
    tag = "Maintenance",
    operation_id = "sweepOrphanRecords",
    summary = "Delete products with no surviving image",
    description = "Deletes products none of whose images exist, including products with no images. Products changed since the sweep read them are kept and reported as CONFLICT.",
    params(SweepQuery),
    responses(
        (status = 200, description = "Sweep report", body = OrphanRecordReport),
        (status = 500, description = "Snapshot failed (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn sweep_orphan_records(
    State(state): State<AppState>,
    Query(query): Query<SweepQuery>,
) -> Result<Json<OrphanRecordReport>, AppError> {
    let maintenance = state.maintenance.as_ref();
    let options = maintenance.options(query.dry_run);
    let timeout = maintenance.config().sweep_timeout();

    let report = run_with_deadline(&state.shutdown, timeout, |token| async move {
        maintenance.sweep_orphan_records(options, &token).await
    })
    .await?;

    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/maintenance/pending-audits",
    tag = "Maintenance",
    operation_id = "recoverPendingAudits",
    summary = "Replay outstanding inventory log entries",
    description = "Appends the log entry of every product still carrying a pending stock change, then clears the marker.",
    responses(
        (status = 200, description = "Recovery summary", body = PendingAuditRecoveryResponse),
        (status = 500, description = "Store failure (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn recover_pending_audits(
    State(state): State<AppState>,
) -> Result<Json<PendingAuditRecoveryResponse>, AppError> {
    let summary = state.inventory.recover_pending_audits().await?;
    Ok(Json(summary.into()))
}
