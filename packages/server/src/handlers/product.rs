use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use common::product::normalize;
use tracing::{info, instrument};

use crate::catalog::{filter_for_display, is_displayable};
use crate::error::{AppError, ErrorBody};
use crate::extractors::actor::Actor;
use crate::extractors::json::AppJson;
use crate::models::product::*;
use crate::state::AppState;
use crate::store::AuditContext;

use super::parse_product_id;

#[utoipa::path(
    get,
    path = "/products",
    tag = "Products",
    operation_id = "listProducts",
    summary = "List products",
    description = "Returns normalized products, newest first. In `strict` display mode, products with no surviving image in the blob store are omitted.",
    params(ProductListQuery),
    responses(
        (status = 200, description = "Products", body = ProductListResponse),
    ),
)]
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ProductListResponse>, AppError> {
    let mut products: Vec<_> = state
        .records
        .find_all()
        .await?
        .into_iter()
        .map(normalize)
        .filter(|p| query.category.as_deref().is_none_or(|c| p.category == c))
        .collect();
    products.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let visible = filter_for_display(
        products,
        state.config.display.mode,
        state.blob_store.as_ref(),
    )
    .await;

    let data: Vec<ProductResponse> = visible.into_iter().map(Into::into).collect();
    Ok(Json(ProductListResponse {
        total: data.len(),
        data,
    }))
}

#[utoipa::path(
    get,
    path = "/products/{id}",
    tag = "Products",
    operation_id = "getProduct",
    summary = "Get a product",
    description = "Returns the normalized product. Legacy single-image records are presented with an `images` array. In `strict` display mode a product with no surviving image is reported as not found.",
    params(("id" = String, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product", body = ProductResponse),
        (status = 400, description = "Invalid ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, AppError> {
    let id = parse_product_id(&id)?;
    let not_found = || AppError::NotFound(format!("Product {id} not found"));

    let product = normalize(state.records.find_by_id(id).await?.ok_or_else(not_found)?);
    if !is_displayable(&product, state.config.display.mode, state.blob_store.as_ref()).await {
        return Err(not_found());
    }

    Ok(Json(product.into()))
}

#[utoipa::path(
    patch,
    path = "/products/{id}",
    tag = "Products",
    operation_id = "updateProduct",
    summary = "Update a product",
    description = "Partially updates a product. A change to `stock` is recorded in the inventory log under the `X-Actor-Id` principal, exactly once. If the log cannot be written the call fails with AUDIT_APPEND_FAILED; the change stays on the product and its log entry is replayed later.",
    params(
        ("id" = String, Path, description = "Product ID"),
        ("X-Actor-Id" = String, Header, description = "Acting principal"),
    ),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Updated product", body = ProductResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Missing actor (ACTOR_MISSING)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Concurrent modification (CONFLICT)", body = ErrorBody),
        (status = 503, description = "Inventory log unavailable (AUDIT_APPEND_FAILED)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, actor, payload), fields(actor = %actor.id))]
pub async fn update_product(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, AppError> {
    let id = parse_product_id(&id)?;
    let (patch, reason) = payload.into_patch()?;
    let audit = AuditContext {
        actor_id: actor.id,
        reason,
    };

    let product = state.inventory.update_product(id, patch, &audit).await?;
    Ok(Json(product.into()))
}

#[utoipa::path(
    delete,
    path = "/products/{id}",
    tag = "Products",
    operation_id = "deleteProduct",
    summary = "Delete a product",
    description = "Deletes the product record. Its image files are left to the orphan file sweep. A stock change still awaiting its inventory log entry is written to the log first; if that fails the product is kept and the call fails with AUDIT_APPEND_FAILED.",
    params(("id" = String, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Invalid ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Concurrent modification (CONFLICT)", body = ErrorBody),
        (status = 503, description = "Inventory log unavailable (AUDIT_APPEND_FAILED)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_product_id(&id)?;

    state.inventory.delete_product(id).await?;

    info!(product_id = %id, "Product deleted, images left for the file sweep");
    Ok(StatusCode::NO_CONTENT)
}
