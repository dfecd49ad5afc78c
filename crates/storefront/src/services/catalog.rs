//! Catalog writes: categories, products and blog posts.
//!
//! Each write touches both the database and the entity's image folder. The
//! filesystem half runs first through a [`MediaChange`], then the row is
//! written; a failed row write rolls the folder back, and old images are
//! only deleted once the row write went through.

use std::path::Path;

use sqlx::PgPool;
use thiserror::Error;

use bazaar_core::{BlogId, CategoryId, Price, ProductId, Title};

use crate::db::{BlogRepository, CategoryRepository, ProductRepository, RepositoryError};
use crate::models::blog::{Blog, BlogChanges, NewBlog};
use crate::models::category::{Category, CategoryChanges, DEFAULT_CATEGORY_TITLE, NewCategory};
use crate::models::product::{NewProduct, Product, ProductChanges};
use crate::services::media::{MediaChange, MediaError, MediaKind, MediaStore, StagedFile};

const DEFAULT_CATEGORY_IMAGE: &str = "others.jpeg";
const DEFAULT_CATEGORY_DESCRIPTION: &str = "Other Products";

/// Errors from catalog writes.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Client input was missing or malformed.
    #[error("{0}")]
    Invalid(String),

    /// The entity being read or changed doesn't exist.
    #[error("{0}")]
    NotFound(&'static str),

    #[error("Default category cannot be deleted.")]
    DefaultCategoryProtected,

    /// Another entity of the same kind already uses the title.
    #[error("{0}")]
    DuplicateTitle(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Category fields from a multipart form.
#[derive(Debug, Default)]
pub struct CategoryForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<StagedFile>,
}

/// Product fields from a multipart form.
#[derive(Debug, Default)]
pub struct ProductForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub stock: Option<String>,
    pub category_id: Option<String>,
    pub image: Option<StagedFile>,
    pub gallery: Vec<StagedFile>,
    /// Gallery file names to drop (updates only).
    pub remove_gallery: Vec<String>,
}

/// Blog fields from a multipart form.
#[derive(Debug, Default)]
pub struct BlogForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image: Option<StagedFile>,
}

/// Catalog write service.
pub struct CatalogService<'a> {
    pool: &'a PgPool,
    media: &'a MediaStore,
    default_image: &'a Path,
}

impl<'a> CatalogService<'a> {
    /// Create a catalog service.
    ///
    /// `default_image` is copied into the default category's folder when
    /// that category has to be created.
    #[must_use]
    pub const fn new(pool: &'a PgPool, media: &'a MediaStore, default_image: &'a Path) -> Self {
        Self {
            pool,
            media,
            default_image,
        }
    }

    // =========================================================================
    // Categories
    // =========================================================================

    /// Return the default category, creating `others` if there is none.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the database fails, or
    /// `CatalogError::DuplicateTitle` if a non-default `others` category
    /// already exists.
    pub async fn ensure_default_category(&self) -> Result<Category, CatalogError> {
        let categories = CategoryRepository::new(self.pool);
        if let Some(category) = categories.get_default().await? {
            return Ok(category);
        }

        let title = parse_title(DEFAULT_CATEGORY_TITLE)?;
        let created = categories
            .create(&NewCategory {
                title: title.clone(),
                image: DEFAULT_CATEGORY_IMAGE.to_owned(),
                description: DEFAULT_CATEGORY_DESCRIPTION.to_owned(),
                is_default: true,
            })
            .await;

        let category = match created {
            Ok(category) => category,
            // Lost a race with another request creating it.
            Err(RepositoryError::Conflict(_)) => {
                return categories.get_default().await?.ok_or_else(|| {
                    CatalogError::DuplicateTitle(format!(
                        "A non-default category named '{DEFAULT_CATEGORY_TITLE}' already exists"
                    ))
                });
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(category_id = %category.id, "Created default category");
        self.seed_default_image(&title).await;
        Ok(category)
    }

    async fn seed_default_image(&self, title: &Title) {
        if !tokio::fs::try_exists(self.default_image)
            .await
            .unwrap_or(false)
        {
            tracing::warn!(
                path = %self.default_image.display(),
                "Default category image not found, category has no image file"
            );
            return;
        }
        if let Err(e) = self
            .media
            .copy_into(MediaKind::Category, title, self.default_image, DEFAULT_CATEGORY_IMAGE)
            .await
        {
            tracing::warn!(error = %e, "Failed to copy default category image");
        }
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for missing fields,
    /// `CatalogError::DuplicateTitle` if the title is taken.
    pub async fn create_category(&self, form: CategoryForm) -> Result<Category, CatalogError> {
        let (Some(title), Some(description), Some(image)) =
            (form.title, non_empty(form.description), form.image)
        else {
            return Err(CatalogError::Invalid(
                "Title, Image and Description are required".to_owned(),
            ));
        };
        let title = parse_title(&title)?;

        let mut change = self.media.change();
        let result: Result<Category, CatalogError> = async {
            let image = change.place(MediaKind::Category, &title, image).await?;
            CategoryRepository::new(self.pool)
                .create(&NewCategory {
                    title: title.clone(),
                    image,
                    description,
                    is_default: false,
                })
                .await
                .map_err(duplicate("category"))
        }
        .await;

        change.finish(result).await
    }

    /// Update a category. Absent fields keep their value.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown ID,
    /// `CatalogError::DuplicateTitle` if the new title is taken.
    pub async fn update_category(
        &self,
        id: CategoryId,
        form: CategoryForm,
    ) -> Result<Category, CatalogError> {
        let categories = CategoryRepository::new(self.pool);
        let current = categories
            .get(id)
            .await?
            .ok_or(CatalogError::NotFound("Category not found."))?;
        let new_title = changed_title(form.title.as_deref(), &current.title)?;

        let mut change = self.media.change();
        let result: Result<Category, CatalogError> = async {
            let folder =
                rename_if_needed(&mut change, MediaKind::Category, &current.title, new_title.as_ref())
                    .await?;

            let mut changes = CategoryChanges {
                title: new_title.clone(),
                description: non_empty(form.description),
                image: None,
            };
            if let Some(image) = form.image {
                changes.image = Some(change.place(MediaKind::Category, &folder, image).await?);
                change.remove_later(MediaKind::Category, &folder, &current.image);
            }

            categories
                .update(id, &changes)
                .await
                .map_err(duplicate("category"))
        }
        .await;

        change.finish(result).await
    }

    /// Delete a category, moving its products to the default category.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::DefaultCategoryProtected` for the default
    /// category and `CatalogError::NotFound` for an unknown ID.
    pub async fn delete_category(&self, id: CategoryId) -> Result<CategoryId, CatalogError> {
        let categories = CategoryRepository::new(self.pool);
        let current = categories
            .get(id)
            .await?
            .ok_or(CatalogError::NotFound("Category not found."))?;
        if current.is_default {
            return Err(CatalogError::DefaultCategoryProtected);
        }

        let fallback = self.ensure_default_category().await?;
        let moved = categories
            .delete_reassigning(id, fallback.id)
            .await
            .map_err(not_found("Category not found."))?;

        let mut change = self.media.change();
        change.remove_folder_later(MediaKind::Category, &current.title);
        change.commit().await;

        tracing::info!(category_id = %id, moved, "Deleted category");
        Ok(id)
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// A product with the other products of its category.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown ID.
    pub async fn product_with_related(
        &self,
        id: ProductId,
    ) -> Result<(Product, Vec<Product>), CatalogError> {
        let products = ProductRepository::new(self.pool);
        let product = products
            .get(id)
            .await?
            .ok_or(CatalogError::NotFound("Product not found."))?;
        let related = products.related(product.category_id, product.id).await?;
        Ok((product, related))
    }

    /// Create a product. Without a category it goes into the default one.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for missing or malformed fields or an
    /// unknown category, `CatalogError::DuplicateTitle` if the title is taken.
    pub async fn create_product(&self, form: ProductForm) -> Result<Product, CatalogError> {
        let ProductForm {
            title,
            description,
            price,
            stock,
            category_id,
            image,
            gallery: gallery_files,
            ..
        } = form;
        let (Some(title), Some(image), Some(price)) = (title, image, price) else {
            return Err(CatalogError::Invalid(
                "Title, Image and Price are required".to_owned(),
            ));
        };
        let title = parse_title(&title)?;
        let price = parse_price(&price)?;
        let stock = stock.as_deref().map(parse_stock).transpose()?.unwrap_or(0);
        let category_id = match category_id.as_deref() {
            Some(raw) => self.existing_category(raw).await?,
            None => self.ensure_default_category().await?.id,
        };

        let mut change = self.media.change();
        let result: Result<Product, CatalogError> = async {
            let image = change.place(MediaKind::Product, &title, image).await?;
            let mut gallery = Vec::with_capacity(gallery_files.len());
            for file in gallery_files {
                gallery.push(change.place(MediaKind::Product, &title, file).await?);
            }

            ProductRepository::new(self.pool)
                .create(&NewProduct {
                    title: title.clone(),
                    image,
                    description: description.unwrap_or_default(),
                    gallery,
                    price,
                    stock,
                    category_id,
                })
                .await
                .map_err(duplicate("product"))
        }
        .await;

        change.finish(result).await
    }

    /// Update a product. Absent fields keep their value; new gallery files
    /// are appended and `remove_gallery` names are dropped.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown ID,
    /// `CatalogError::Invalid` for malformed fields or an unknown category,
    /// `CatalogError::DuplicateTitle` if the new title is taken.
    pub async fn update_product(
        &self,
        id: ProductId,
        form: ProductForm,
    ) -> Result<Product, CatalogError> {
        let products = ProductRepository::new(self.pool);
        let current = products
            .get(id)
            .await?
            .ok_or(CatalogError::NotFound("Product not found."))?;

        let new_title = changed_title(form.title.as_deref(), &current.title)?;
        let price = form.price.as_deref().map(parse_price).transpose()?;
        let stock = form.stock.as_deref().map(parse_stock).transpose()?;
        let category_id = match form.category_id.as_deref() {
            Some(raw) => Some(self.existing_category(raw).await?),
            None => None,
        };

        let mut change = self.media.change();
        let result: Result<Product, CatalogError> = async {
            let folder =
                rename_if_needed(&mut change, MediaKind::Product, &current.title, new_title.as_ref())
                    .await?;

            let mut changes = ProductChanges {
                title: new_title.clone(),
                description: form.description,
                price,
                stock,
                category_id,
                ..ProductChanges::default()
            };

            if let Some(image) = form.image {
                changes.image = Some(change.place(MediaKind::Product, &folder, image).await?);
                change.remove_later(MediaKind::Product, &folder, &current.image);
            }

            let mut gallery = current.gallery.clone();
            for name in &form.remove_gallery {
                if let Some(pos) = gallery.iter().position(|g| g == name) {
                    gallery.remove(pos);
                    change.remove_later(MediaKind::Product, &folder, name);
                }
            }
            for file in form.gallery {
                gallery.push(change.place(MediaKind::Product, &folder, file).await?);
            }
            if gallery != current.gallery {
                changes.gallery = Some(gallery);
            }

            products
                .update(id, &changes)
                .await
                .map_err(duplicate("product"))
        }
        .await;

        change.finish(result).await
    }

    /// Delete a product and its image folder.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown ID.
    pub async fn delete_product(&self, id: ProductId) -> Result<ProductId, CatalogError> {
        let removed = ProductRepository::new(self.pool)
            .delete(id)
            .await
            .map_err(not_found("Product not found."))?;

        let mut change = self.media.change();
        change.remove_folder_later(MediaKind::Product, &removed.title);
        change.commit().await;

        Ok(id)
    }

    async fn existing_category(&self, raw: &str) -> Result<CategoryId, CatalogError> {
        let unknown = || CatalogError::Invalid("Category not found.".to_owned());
        let id: CategoryId = raw.parse().map_err(|_| unknown())?;
        CategoryRepository::new(self.pool)
            .get(id)
            .await?
            .map(|c| c.id)
            .ok_or_else(unknown)
    }

    // =========================================================================
    // Blog posts
    // =========================================================================

    /// Create a blog post.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for missing fields,
    /// `CatalogError::DuplicateTitle` if the title is taken.
    pub async fn create_blog(&self, form: BlogForm) -> Result<Blog, CatalogError> {
        let BlogForm {
            title,
            content,
            image,
        } = form;
        let (Some(title), Some(content)) = (title, non_empty(content)) else {
            return Err(CatalogError::Invalid(
                "Title and Content are required".to_owned(),
            ));
        };
        let title = parse_title(&title)?;

        let mut change = self.media.change();
        let result: Result<Blog, CatalogError> = async {
            let image = match image {
                Some(file) => Some(change.place(MediaKind::Blog, &title, file).await?),
                None => None,
            };

            BlogRepository::new(self.pool)
                .create(&NewBlog {
                    title: title.clone(),
                    content,
                    image,
                })
                .await
                .map_err(duplicate("blog"))
        }
        .await;

        change.finish(result).await
    }

    /// Update a blog post. Absent fields keep their value.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown ID,
    /// `CatalogError::DuplicateTitle` if the new title is taken.
    pub async fn update_blog(&self, id: BlogId, form: BlogForm) -> Result<Blog, CatalogError> {
        let blogs = BlogRepository::new(self.pool);
        let current = blogs
            .get(id)
            .await?
            .ok_or(CatalogError::NotFound("Blog not found."))?;
        let new_title = changed_title(form.title.as_deref(), &current.title)?;

        let mut change = self.media.change();
        let result: Result<Blog, CatalogError> = async {
            let folder =
                rename_if_needed(&mut change, MediaKind::Blog, &current.title, new_title.as_ref())
                    .await?;

            let mut changes = BlogChanges {
                title: new_title.clone(),
                content: non_empty(form.content),
                image: None,
            };
            if let Some(image) = form.image {
                changes.image = Some(change.place(MediaKind::Blog, &folder, image).await?);
                if let Some(old) = &current.image {
                    change.remove_later(MediaKind::Blog, &folder, old);
                }
            }

            blogs.update(id, &changes).await.map_err(duplicate("blog"))
        }
        .await;

        change.finish(result).await
    }

    /// Delete a blog post and its image folder.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown ID.
    pub async fn delete_blog(&self, id: BlogId) -> Result<BlogId, CatalogError> {
        let removed = BlogRepository::new(self.pool)
            .delete(id)
            .await
            .map_err(not_found("Blog not found."))?;

        let mut change = self.media.change();
        change.remove_folder_later(MediaKind::Blog, &removed.title);
        change.commit().await;

        Ok(id)
    }
}

/// Rename the entity folder when the title changes; returns the folder title
/// to use for the rest of the request.
async fn rename_if_needed(
    change: &mut MediaChange<'_>,
    kind: MediaKind,
    current: &Title,
    new: Option<&Title>,
) -> Result<Title, CatalogError> {
    match new {
        Some(new) => {
            change.rename_folder(kind, current, new).await?;
            Ok(new.clone())
        }
        None => Ok(current.clone()),
    }
}

fn parse_title(raw: &str) -> Result<Title, CatalogError> {
    Title::parse(raw).map_err(|e| CatalogError::Invalid(format!("Invalid title: {e}")))
}

/// Parse a submitted title, returning `None` when it's absent or unchanged.
fn changed_title(raw: Option<&str>, current: &Title) -> Result<Option<Title>, CatalogError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let title = parse_title(raw)?;
    Ok((&title != current).then_some(title))
}

fn parse_price(raw: &str) -> Result<Price, CatalogError> {
    Price::parse(raw).map_err(|e| CatalogError::Invalid(format!("Invalid price: {e}")))
}

fn parse_stock(raw: &str) -> Result<i32, CatalogError> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|stock| *stock >= 0)
        .ok_or_else(|| CatalogError::Invalid("Stock must be a non-negative integer".to_owned()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn duplicate(kind: &'static str) -> impl Fn(RepositoryError) -> CatalogError {
    move |e| match e {
        RepositoryError::Conflict(_) => {
            CatalogError::DuplicateTitle(format!("A {kind} with this title already exists"))
        }
        other => CatalogError::Repository(other),
    }
}

fn not_found(message: &'static str) -> impl Fn(RepositoryError) -> CatalogError {
    move |e| match e {
        RepositoryError::NotFound => CatalogError::NotFound(message),
        other => CatalogError::Repository(other),
    }
}
