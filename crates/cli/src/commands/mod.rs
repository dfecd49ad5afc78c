//! CLI subcommands.

pub mod admin;
pub mod migrate;
pub mod seed;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use bazaar_storefront::config::{ConfigError, database_url_from_env};

/// Errors shared by commands that talk to the database.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Connect to the storefront database.
pub async fn connect() -> Result<PgPool, CommandError> {
    let database_url = database_url_from_env()?;

    tracing::info!("Connecting to storefront database...");
    Ok(PgPool::connect(database_url.expose_secret()).await?)
}
