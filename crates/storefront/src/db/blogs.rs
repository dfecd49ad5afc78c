//! Blog repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use bazaar_core::{BlogId, Title};

use super::RepositoryError;
use crate::models::blog::{Blog, BlogChanges, NewBlog};

const BLOG_COLUMNS: &str = "id, title, content, image, created_at, updated_at";
const TITLE_TAKEN: &str = "blog title already exists";

#[derive(Debug, sqlx::FromRow)]
struct BlogRow {
    id: i32,
    title: String,
    content: String,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BlogRow> for Blog {
    type Error = RepositoryError;

    fn try_from(row: BlogRow) -> Result<Self, Self::Error> {
        let title = Title::parse(&row.title).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid blog title in database: {e}"))
        })?;

        Ok(Self {
            id: BlogId::new(row.id),
            title,
            content: row.content,
            image: row.image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for blog database operations.
pub struct BlogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> BlogRepository<'a> {
    /// Create a new blog repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List all posts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Blog>, RepositoryError> {
        let rows = sqlx::query_as::<_, BlogRow>(&format!(
            "SELECT {BLOG_COLUMNS} FROM shop.blog ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Blog::try_from).collect()
    }

    /// Get a post by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: BlogId) -> Result<Option<Blog>, RepositoryError> {
        let row = sqlx::query_as::<_, BlogRow>(&format!(
            "SELECT {BLOG_COLUMNS} FROM shop.blog WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Blog::try_from).transpose()
    }

    /// Insert a post.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the title is taken.
    pub async fn create(&self, blog: &NewBlog) -> Result<Blog, RepositoryError> {
        let row = sqlx::query_as::<_, BlogRow>(&format!(
            "INSERT INTO shop.blog (title, content, image) VALUES ($1, $2, $3) \
             RETURNING {BLOG_COLUMNS}"
        ))
        .bind(&blog.title)
        .bind(&blog.content)
        .bind(blog.image.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, TITLE_TAKEN))?;

        row.try_into()
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post doesn't exist.
    /// Returns `RepositoryError::Conflict` if the new title is taken.
    pub async fn update(&self, id: BlogId, changes: &BlogChanges) -> Result<Blog, RepositoryError> {
        let row = sqlx::query_as::<_, BlogRow>(&format!(
            "UPDATE shop.blog SET \
                 title = COALESCE($2, title), \
                 content = COALESCE($3, content), \
                 image = COALESCE($4, image) \
             WHERE id = $1 RETURNING {BLOG_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.title.as_ref())
        .bind(changes.content.as_deref())
        .bind(changes.image.as_deref())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, TITLE_TAKEN))?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Delete a post, returning the removed row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post doesn't exist.
    pub async fn delete(&self, id: BlogId) -> Result<Blog, RepositoryError> {
        let row = sqlx::query_as::<_, BlogRow>(&format!(
            "DELETE FROM shop.blog WHERE id = $1 RETURNING {BLOG_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }
}
