//! Authentication extractors.
//!
//! Identity comes from the signed `token` cookie (or a bearer header), so
//! these extractors only need the token service from state.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::services::token::{Claims, token_from_headers};
use crate::state::AppState;

const NO_TOKEN: &str = "Access denied. No token provided.";
const BAD_TOKEN: &str = "Invalid or expired token.";
const WRONG_ROLE: &str = "Forbidden! Insufficient role.";

/// Extractor that requires a logged-in user of any role.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireUser(claims): RequireUser) -> String {
///     format!("Hello, user {}!", claims.user_id)
/// }
/// ```
pub struct RequireUser(pub Claims);

/// Extractor that requires a logged-in admin.
pub struct RequireAdmin(pub Claims);

fn verified_claims(parts: &Parts, state: &AppState) -> Result<Claims, AppError> {
    let token = token_from_headers(&parts.headers)
        .ok_or_else(|| AppError::Unauthorized(NO_TOKEN.to_string()))?;

    state.tokens().verify(&token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected session token");
        AppError::Forbidden(BAD_TOKEN.to_string())
    })
}

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        verified_claims(parts, state).map(Self)
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = verified_claims(parts, state)?;
        if !claims.user_role.is_admin() {
            return Err(AppError::Forbidden(WRONG_ROLE.to_string()));
        }
        Ok(Self(claims))
    }
}
