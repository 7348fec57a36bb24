pub mod config;
pub mod inventory;
pub mod product;
pub mod retry;
pub mod storage;

pub use config::DisplayMode;
pub use inventory::{InventoryReason, PendingAudit};
pub use product::{Product, ProductId, RawProduct};
