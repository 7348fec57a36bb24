pub mod inventory;
pub mod maintenance;
pub mod product;

use common::product::ProductId;

use crate::error::AppError;

/// Parse a product id path segment.
pub(crate) fn parse_product_id(raw: &str) -> Result<ProductId, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("Invalid product id '{raw}'")))
}
