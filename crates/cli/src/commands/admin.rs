//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a new admin user
//! bazaar-cli admin create -e admin@example.com -p 'long password'
//!
//! # Promote an existing shopper
//! bazaar-cli admin promote -e shopper@example.com
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

use bazaar_core::{Email, UserId};
use bazaar_storefront::services::{AuthError, AuthService};
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Account operation failed.
    #[error("{0}")]
    Auth(#[from] AuthError),
}

/// Create a new admin user.
///
/// # Returns
///
/// The ID of the created user.
///
/// # Errors
///
/// Returns an error if the email is malformed, the password is too short, or
/// the email is already registered.
pub async fn create_user(email: &str, password: &str) -> Result<UserId, AdminError> {
    let email = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let pool = connect().await?;

    tracing::info!("Creating admin user: {}", email);
    let user = AuthService::new(&pool).create_admin(&email, password).await?;

    tracing::info!(user_id = %user.id, "Admin user created");
    Ok(user.id)
}

/// Grant the admin role to an existing user.
///
/// # Errors
///
/// Returns an error if the email is malformed or no user has it.
pub async fn promote_user(email: &str) -> Result<(), AdminError> {
    let email = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let pool = connect().await?;

    let user = AuthService::new(&pool).promote(&email).await?;

    tracing::info!(user_id = %user.id, "User promoted to admin");
    Ok(())
}
