//! Blog post domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bazaar_core::{BlogId, Title};

/// A blog post.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: BlogId,
    pub title: Title,
    pub content: String,
    /// Cover image file name inside `blogs/{title}/`, if one was uploaded.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a blog post.
#[derive(Debug, Clone)]
pub struct NewBlog {
    pub title: Title,
    pub content: String,
    pub image: Option<String>,
}

/// Partial blog update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct BlogChanges {
    pub title: Option<Title>,
    pub content: Option<String>,
    pub image: Option<String>,
}
