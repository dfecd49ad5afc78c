//! Seed required catalog data.

use std::path::PathBuf;

use bazaar_storefront::config::{ConfigError, UploadConfig};
use bazaar_storefront::services::{CatalogError, CatalogService, MediaError, MediaStore};
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upload directory error: {0}")]
    Media(#[from] MediaError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Create the default category (`others`) if it doesn't exist yet.
///
/// # Arguments
///
/// * `image` - Image to copy into the category folder; falls back to
///   `DEFAULT_CATEGORY_IMAGE`
///
/// # Errors
///
/// Returns an error if the database or upload directory is unusable.
pub async fn default_category(image: Option<PathBuf>) -> Result<(), SeedError> {
    let mut uploads = UploadConfig::from_env()?;
    if let Some(image) = image {
        uploads.default_category_image = image;
    }

    let pool = connect().await?;
    let media = MediaStore::new(&uploads);
    media.ensure_layout().await?;

    let category = CatalogService::new(&pool, &media, &uploads.default_category_image)
        .ensure_default_category()
        .await?;

    tracing::info!(
        category_id = %category.id,
        title = %category.title,
        "Default category ready"
    );
    Ok(())
}
