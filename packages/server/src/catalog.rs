//! Read-time filtering of products whose images no longer exist.

use common::product::{Product, extract_blob_keys};
use common::storage::BlobStore;
use common::DisplayMode;
use futures::StreamExt;
use futures::stream;
use tracing::{debug, warn};

/// Products checked against the blob store concurrently.
const EXISTENCE_CHECK_CONCURRENCY: usize = 16;

/// Drop products that have no surviving image. Order is preserved.
///
/// `Permissive` returns the input untouched without consulting the blob store.
pub async fn filter_for_display(
    products: Vec<Product>,
    mode: DisplayMode,
    blobs: &dyn BlobStore,
) -> Vec<Product> {
    match mode {
        DisplayMode::Permissive => products,
        DisplayMode::Strict => {
            stream::iter(products)
                .map(|product| async move {
                    let keep = has_surviving_image(&product, blobs).await;
                    (product, keep)
                })
                .buffered(EXISTENCE_CHECK_CONCURRENCY)
                .filter_map(|(product, keep)| async move { keep.then_some(product) })
                .collect()
                .await
        }
    }
}

/// Whether a single product should be shown under `mode`.
pub async fn is_displayable(product: &Product, mode: DisplayMode, blobs: &dyn BlobStore) -> bool {
    match mode {
        DisplayMode::Permissive => true,
        DisplayMode::Strict => has_surviving_image(product, blobs).await,
    }
}

/// True when at least one of the product's references resolves to an existing blob.
///
/// Invalid references and failed existence checks count as absent.
pub async fn has_surviving_image(product: &Product, blobs: &dyn BlobStore) -> bool {
    let extracted = extract_blob_keys(product);
    for invalid in &extracted.invalid {
        debug!(
            product_id = %product.id,
            reference = %invalid.reference,
            cause = %invalid.cause,
            "Ignoring unusable image reference"
        );
    }

    for key in &extracted.keys {
        match blobs.exists(key).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                warn!(product_id = %product.id, key = %key, error = %e, "Image existence check failed");
            }
        }
    }

    false
}
