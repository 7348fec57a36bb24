use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub title: String,
    pub price_cents: i64,
    #[sea_orm(indexed)]
    pub category: String,

    /// Image references as a JSON array of strings. NULL on records created
    /// before multi-image support.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub images: Option<serde_json::Value>,

    /// Legacy single-image reference.
    pub image: Option<String>,

    pub stock: i32,

    /// Incremented on every write; optimistic concurrency token.
    #[sea_orm(default_value = 1)]
    pub version: i64,

    /// Stock change awaiting confirmation in `inventory_log`.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub pending_audit: Option<serde_json::Value>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
