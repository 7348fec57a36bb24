use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::product::ProductId;

/// Why a stock quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InventoryReason {
    /// Manual edit through the product update path.
    Edit,
    Restock,
    Sale,
    /// Correction after a stock count.
    Correction,
}

impl InventoryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Restock => "restock",
            Self::Sale => "sale",
            Self::Correction => "correction",
        }
    }
}

impl fmt::Display for InventoryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InventoryReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edit" => Ok(Self::Edit),
            "restock" => Ok(Self::Restock),
            "sale" => Ok(Self::Sale),
            "correction" => Ok(Self::Correction),
            other => Err(format!("unknown inventory reason: {other}")),
        }
    }
}

/// A stock transition with a non-zero delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub old_stock: i32,
    pub new_stock: i32,
}

impl StockChange {
    /// `None` when the quantity does not actually change.
    pub fn between(old_stock: i32, new_stock: i32) -> Option<Self> {
        (old_stock != new_stock).then_some(Self {
            old_stock,
            new_stock,
        })
    }

    pub fn delta(&self) -> i32 {
        self.new_stock - self.old_stock
    }
}

/// Idempotency key for a log entry: one per accepted stock-changing write.
///
/// `version` is the record version produced by that write.
pub fn dedup_key(product_id: ProductId, version: i64, new_stock: i32) -> String {
    format!("{product_id}:v{version}:{new_stock}")
}

/// Audit entry recorded on the product in the same write as the stock change,
/// and removed once the inventory log has durably accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAudit {
    pub actor_id: String,
    pub change: i32,
    pub reason: InventoryReason,
    pub new_stock: i32,
    pub dedup_key: String,
    pub recorded_at: DateTime<Utc>,
}

impl PendingAudit {
    /// `version` is the version the stock-changing write will produce.
    pub fn new(
        product_id: ProductId,
        version: i64,
        actor_id: impl Into<String>,
        reason: InventoryReason,
        change: StockChange,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            change: change.delta(),
            reason,
            new_stock: change.new_stock,
            dedup_key: dedup_key(product_id, version, change.new_stock),
            recorded_at: Utc::now(),
        }
    }

    pub fn to_entry(&self, product_id: ProductId) -> NewInventoryLogEntry {
        NewInventoryLogEntry {
            product_id,
            actor_id: self.actor_id.clone(),
            change: self.change,
            reason: self.reason,
            new_stock: self.new_stock,
            dedup_key: self.dedup_key.clone(),
            created_at: self.recorded_at,
        }
    }
}

/// Log entry to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInventoryLogEntry {
    pub product_id: ProductId,
    pub actor_id: String,
    pub change: i32,
    pub reason: InventoryReason,
    pub new_stock: i32,
    pub dedup_key: String,
    pub created_at: DateTime<Utc>,
}

/// A durable, append-only inventory log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLogEntry {
    pub id: i32,
    pub product_id: ProductId,
    pub actor_id: String,
    pub change: i32,
    pub reason: InventoryReason,
    pub new_stock: i32,
    pub created_at: DateTime<Utc>,
}
