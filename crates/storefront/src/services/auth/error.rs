//! Account error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors from account operations.
///
/// Route handlers turn these into status codes in `AppError`; the CLI prints
/// them as-is.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The submitted address doesn't parse (send-otp, register, reset).
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] bazaar_core::EmailError),

    /// Login or change-pass with a wrong password, or login with an unknown
    /// email. Both look the same to the client.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No account for the ID or email. Raised by reset-pass, `GET /api/user/{id}`
    /// and `bazaar-cli admin promote`; login never returns it.
    #[error("user not found")]
    UserNotFound,

    /// Register or `admin create` for an email that already has an account.
    #[error("user already exists")]
    UserAlreadyExists,

    /// The new password fails [`validate_password`](super::validate_password).
    /// Carries the client-facing message.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The user table could not be read or written.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Argon2 failed to hash a new password.
    #[error("password hashing error")]
    PasswordHash,
}
