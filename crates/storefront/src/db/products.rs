//! Product repository for database operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use bazaar_core::{CategoryId, Price, ProductId, Title};

use super::RepositoryError;
use crate::models::product::{NewProduct, Product, ProductChanges};

const PRODUCT_COLUMNS: &str =
    "id, title, image, description, gallery, price, stock, category_id, created_at, updated_at";
const TITLE_TAKEN: &str = "product title already exists";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    title: String,
    image: String,
    description: String,
    gallery: Vec<String>,
    price: Decimal,
    stock: i32,
    category_id: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let title = Title::parse(&row.title).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid product title in database: {e}"))
        })?;
        let price = Price::new(row.price).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid price in database: {e}"))
        })?;

        Ok(Self {
            id: ProductId::new(row.id),
            title,
            image: row.image,
            description: row.description,
            gallery: row.gallery,
            price,
            stock: row.stock,
            category_id: CategoryId::new(row.category_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn collect(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products, newest first, optionally restricted to one category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, category: Option<CategoryId>) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product \
             WHERE $1::INT IS NULL OR category_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(category)
        .fetch_all(self.pool)
        .await?;

        collect(rows)
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// Other products in the same category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn related(
        &self,
        category: CategoryId,
        exclude: ProductId,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product \
             WHERE category_id = $1 AND id <> $2 ORDER BY created_at DESC, id DESC"
        ))
        .bind(category)
        .bind(exclude)
        .fetch_all(self.pool)
        .await?;

        collect(rows)
    }

    /// Products whose title or description matches an `ILIKE` pattern.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search(&self, pattern: &str) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product \
             WHERE title ILIKE $1 OR description ILIKE $1 ORDER BY title"
        ))
        .bind(pattern)
        .fetch_all(self.pool)
        .await?;

        collect(rows)
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the title is taken.
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO shop.product \
                 (title, image, description, gallery, price, stock, category_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&product.title)
        .bind(&product.image)
        .bind(&product.description)
        .bind(&product.gallery)
        .bind(product.price.amount())
        .bind(product.stock)
        .bind(product.category_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, TITLE_TAKEN))?;

        row.try_into()
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Conflict` if the new title is taken.
    pub async fn update(
        &self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE shop.product SET \
                 title = COALESCE($2, title), \
                 image = COALESCE($3, image), \
                 description = COALESCE($4, description), \
                 gallery = COALESCE($5, gallery), \
                 price = COALESCE($6, price), \
                 stock = COALESCE($7, stock), \
                 category_id = COALESCE($8, category_id) \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.title.as_ref())
        .bind(changes.image.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.gallery.as_ref())
        .bind(changes.price.map(|p| p.amount()))
        .bind(changes.stock)
        .bind(changes.category_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, TITLE_TAKEN))?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Delete a product, returning the removed row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn delete(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "DELETE FROM shop.product WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }
}
