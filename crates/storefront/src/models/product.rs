//! Product domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bazaar_core::{CategoryId, Price, ProductId, Title};

/// A product in the catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub title: Title,
    /// Main image file name inside `products/{title}/`.
    pub image: String,
    pub description: String,
    /// Additional image file names, in upload order.
    pub gallery: Vec<String>,
    pub price: Price,
    pub stock: i32,
    pub category_id: CategoryId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub title: Title,
    pub image: String,
    pub description: String,
    pub gallery: Vec<String>,
    pub price: Price,
    pub stock: i32,
    pub category_id: CategoryId,
}

/// Partial product update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub title: Option<Title>,
    pub image: Option<String>,
    pub description: Option<String>,
    /// The complete new gallery, already merged with additions and removals.
    pub gallery: Option<Vec<String>>,
    pub price: Option<Price>,
    pub stock: Option<i32>,
    pub category_id: Option<CategoryId>,
}
