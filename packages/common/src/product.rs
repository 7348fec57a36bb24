//! Product records as seen by the image consistency core.
//!
//! The record store may hold two shapes of the same record: the canonical
//! multi-image `images` array, and the legacy single `image` field written
//! before the array existed. [`ImageShape`] is the only place that tells them
//! apart; everything downstream works on the normalized [`Product`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::inventory::PendingAudit;
use crate::storage::BlobKey;

pub type ProductId = Uuid;

/// A product exactly as the record store returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProduct {
    pub id: ProductId,
    pub title: String,
    pub price_cents: i64,
    pub category: String,
    /// Canonical multi-image field; `None` when the column was never written.
    pub images: Option<Vec<String>>,
    /// Legacy single-image field.
    pub image: Option<String>,
    pub stock: i32,
    /// Bumped by every write; used for optimistic checks.
    pub version: i64,
    /// Stock change committed on the record but not yet confirmed in the log.
    pub pending_audit: Option<PendingAudit>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The image field layout a record was stored with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageShape {
    Canonical(Vec<String>),
    Legacy(String),
    Empty,
}

/// Tag-only form of [`ImageShape`], kept on the normalized product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Canonical,
    Legacy,
    Empty,
}

impl ImageShape {
    /// Resolve the stored fields; a non-empty `images` array always wins.
    pub fn resolve(images: Option<Vec<String>>, image: Option<String>) -> Self {
        match (images, image) {
            (Some(images), _) if !images.is_empty() => Self::Canonical(images),
            (_, Some(image)) if !image.trim().is_empty() => Self::Legacy(image),
            _ => Self::Empty,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Canonical(_) => ShapeKind::Canonical,
            Self::Legacy(_) => ShapeKind::Legacy,
            Self::Empty => ShapeKind::Empty,
        }
    }

    pub fn into_references(self) -> Vec<String> {
        match self {
            Self::Canonical(images) => images,
            Self::Legacy(image) => vec![image],
            Self::Empty => Vec::new(),
        }
    }
}

/// Canonical in-memory product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub price_cents: i64,
    pub category: String,
    pub images: Vec<String>,
    pub shape: ShapeKind,
    pub stock: i32,
    pub version: i64,
    pub pending_audit: Option<PendingAudit>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// True when normalization left no image reference at all.
    pub fn has_no_images(&self) -> bool {
        self.images.is_empty()
    }
}

/// Build the canonical view of a stored record. Never writes back.
pub fn normalize(raw: RawProduct) -> Product {
    let shape = ImageShape::resolve(raw.images, raw.image);
    let kind = shape.kind();

    Product {
        id: raw.id,
        title: raw.title,
        price_cents: raw.price_cents,
        category: raw.category,
        images: shape.into_references(),
        shape: kind,
        stock: raw.stock,
        version: raw.version,
        pending_audit: raw.pending_audit,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    }
}

/// Image references of a product, in stored order, duplicates kept.
pub fn extract_references(product: &Product) -> Vec<String> {
    product.images.clone()
}

/// A reference that could not be turned into a blob key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidReference {
    pub reference: String,
    pub cause: String,
}

/// Blob keys derived from a product's references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedKeys {
    pub keys: Vec<BlobKey>,
    pub invalid: Vec<InvalidReference>,
}

impl ExtractedKeys {
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Derive blob keys for every reference; bad references are collected, not fatal.
pub fn extract_blob_keys(product: &Product) -> ExtractedKeys {
    let mut extracted = ExtractedKeys::default();
    for reference in &product.images {
        match BlobKey::from_reference(reference) {
            Ok(key) => extracted.keys.push(key),
            Err(e) => extracted.invalid.push(InvalidReference {
                reference: reference.clone(),
                cause: e.to_string(),
            }),
        }
    }
    extracted
}
