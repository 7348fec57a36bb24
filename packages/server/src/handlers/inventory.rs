use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::models::inventory::*;
use crate::state::AppState;

use super::parse_product_id;

#[utoipa::path(
    get,
    path = "/inventory/logs",
    tag = "Inventory",
    operation_id = "listInventoryLogs",
    summary = "List inventory log entries",
    description = "Returns stock change history, newest first, optionally for one product.",
    params(InventoryLogQuery),
    responses(
        (status = 200, description = "Log entries", body = InventoryLogListResponse),
    ),
)]
#[instrument(skip(state))]
pub async fn list_inventory_logs(
    State(state): State<AppState>,
    Query(query): Query<InventoryLogQuery>,
) -> Result<Json<InventoryLogListResponse>, AppError> {
    let entries = state.inventory.list_logs(query.product_id).await?;
    let data: Vec<InventoryLogResponse> = entries.into_iter().map(Into::into).collect();
    Ok(Json(InventoryLogListResponse {
        total: data.len(),
        data,
    }))
}

#[utoipa::path(
    get,
    path = "/products/{id}/inventory-logs",
    tag = "Inventory",
    operation_id = "listProductInventoryLogs",
    summary = "List a product's inventory log",
    description = "Returns the product's stock change history, newest first. Entries remain after the product is deleted.",
    params(("id" = String, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Log entries", body = InventoryLogListResponse),
        (status = 400, description = "Invalid ID (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn list_product_inventory_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InventoryLogListResponse>, AppError> {
    let id = parse_product_id(&id)?;
    let entries = state.inventory.list_logs(Some(id)).await?;
    let data: Vec<InventoryLogResponse> = entries.into_iter().map(Into::into).collect();
    Ok(Json(InventoryLogListResponse {
        total: data.len(),
        data,
    }))
}
