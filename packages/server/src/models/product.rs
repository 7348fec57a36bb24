use chrono::{DateTime, Utc};
use common::inventory::InventoryReason;
use common::product::{Product, ShapeKind};
use common::storage::BlobKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::store::ProductPatch;

/// Query parameters for listing products.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ProductListQuery {
    /// Only products in this category.
    #[param(example = "lighting")]
    pub category: Option<String>,
}

/// Partial product update. Absent fields are left unchanged.
#[derive(Debug, Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateProductRequest {
    #[schema(example = "Desk lamp")]
    pub title: Option<String>,
    #[schema(example = 2499)]
    pub price_cents: Option<i64>,
    #[schema(example = "lighting")]
    pub category: Option<String>,
    /// Replaces the full image list.
    #[schema(example = json!(["/uploads/lamp-front.jpg"]))]
    pub images: Option<Vec<String>>,
    #[schema(example = 7)]
    pub stock: Option<i32>,
    /// Reason recorded with a stock change. Defaults to `edit`.
    pub reason: Option<InventoryReason>,
}

impl UpdateProductRequest {
    /// Validate and convert into a store patch plus the audit reason.
    pub fn into_patch(self) -> Result<(ProductPatch, InventoryReason), AppError> {
        let reason = self.reason.unwrap_or(InventoryReason::Edit);

        let title = self.title.map(|t| t.trim().to_string());
        if let Some(title) = &title
            && (title.is_empty() || title.chars().count() > 256)
        {
            return Err(AppError::Validation("Title must be 1-256 characters".into()));
        }

        if let Some(price) = self.price_cents
            && price < 0
        {
            return Err(AppError::Validation("price_cents must be >= 0".into()));
        }

        let category = self.category.map(|c| c.trim().to_string());
        if category.as_deref().is_some_and(str::is_empty) {
            return Err(AppError::Validation("Category must not be empty".into()));
        }

        if let Some(stock) = self.stock
            && stock < 0
        {
            return Err(AppError::Validation("stock must not be negative".into()));
        }

        if let Some(images) = &self.images {
            for reference in images {
                BlobKey::from_reference(reference)
                    .map_err(|e| AppError::Validation(e.to_string()))?;
            }
        }

        let patch = ProductPatch {
            title,
            price_cents: self.price_cents,
            category,
            images: self.images,
            stock: self.stock,
            pending_audit: None,
        };
        if patch.is_empty() {
            return Err(AppError::Validation("No fields to update".into()));
        }

        Ok((patch, reason))
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    #[schema(example = "Desk lamp")]
    pub title: String,
    #[schema(example = 2499)]
    pub price_cents: i64,
    #[schema(example = "lighting")]
    pub category: String,
    /// Normalized image references, in stored order.
    #[schema(example = json!(["/uploads/lamp-front.jpg"]))]
    pub images: Vec<String>,
    /// Which stored layout the images came from: `canonical`, `legacy` or `empty`.
    #[schema(example = "canonical")]
    pub image_layout: String,
    #[schema(example = 7)]
    pub stock: i32,
    #[schema(example = 3)]
    pub version: i64,
    /// True while a stock change is committed but not yet on the inventory log.
    pub audit_pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        let image_layout = match p.shape {
            ShapeKind::Canonical => "canonical",
            ShapeKind::Legacy => "legacy",
            ShapeKind::Empty => "empty",
        };
        Self {
            id: p.id,
            title: p.title,
            price_cents: p.price_cents,
            category: p.category,
            images: p.images,
            image_layout: image_layout.to_string(),
            stock: p.stock,
            version: p.version,
            audit_pending: p.pending_audit.is_some(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ProductListResponse {
    pub data: Vec<ProductResponse>,
    #[schema(example = 12)]
    pub total: usize,
}
