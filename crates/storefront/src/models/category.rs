//! Category domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bazaar_core::{CategoryId, Title};

/// Title of the category that collects uncategorized products.
pub const DEFAULT_CATEGORY_TITLE: &str = "others";

/// A product category.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub title: Title,
    /// File name inside `categories/{title}/`.
    pub image: String,
    pub description: String,
    /// The fallback category. It cannot be deleted.
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a category.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub title: Title,
    pub image: String,
    pub description: String,
    pub is_default: bool,
}

/// Partial category update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct CategoryChanges {
    pub title: Option<Title>,
    pub image: Option<String>,
    pub description: Option<String>,
}
