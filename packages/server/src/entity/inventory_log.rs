use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only stock change history. Rows outlive the product they describe,
/// so `product_id` carries no foreign key.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub product_id: Uuid,

    /// Acting principal as reported by the upstream auth layer.
    pub actor_id: String,

    /// Signed stock delta.
    pub change: i32,

    /// One of: edit, restock, sale, correction.
    pub reason: String,

    pub new_stock: i32,

    #[sea_orm(unique)]
    pub dedup_key: String,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
