use chrono::{DateTime, Utc};
use common::inventory::{InventoryLogEntry, InventoryReason};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query parameters for listing inventory log entries.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct InventoryLogQuery {
    /// Only entries for this product.
    pub product_id: Option<Uuid>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct InventoryLogResponse {
    #[schema(example = 1)]
    pub id: i32,
    pub product_id: Uuid,
    #[schema(example = "staff-42")]
    pub actor_id: String,
    /// Signed stock delta.
    #[schema(example = -3)]
    pub change: i32,
    pub reason: InventoryReason,
    #[schema(example = 7)]
    pub new_stock: i32,
    pub created_at: DateTime<Utc>,
}

impl From<InventoryLogEntry> for InventoryLogResponse {
    fn from(e: InventoryLogEntry) -> Self {
        Self {
            id: e.id,
            product_id: e.product_id,
            actor_id: e.actor_id,
            change: e.change,
            reason: e.reason,
            new_stock: e.new_stock,
            created_at: e.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct InventoryLogListResponse {
    pub data: Vec<InventoryLogResponse>,
    #[schema(example = 4)]
    pub total: usize,
}
