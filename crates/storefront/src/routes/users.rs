//! User account endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;

use bazaar_core::UserId;

use crate::error::{AppError, Result};
use crate::middleware::{RequireAdmin, RequireUser};
use crate::models::User;
use crate::services::AuthService;
use crate::state::AppState;

use super::parse_id;

const NOT_FOUND: &str = "User not found";

/// Build the user router, mounted at `/api/user`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/{id}", get(show))
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

/// List every account (admin only).
pub async fn index(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<UserListResponse>> {
    let users = AuthService::new(state.pool()).list_users().await?;
    Ok(Json(UserListResponse { users }))
}

/// Show one account. Users may only read their own.
pub async fn show(
    RequireUser(claims): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>> {
    let id: UserId = parse_id(&id, NOT_FOUND)?;
    if id != claims.user_id && !claims.user_role.is_admin() {
        return Err(AppError::Forbidden(
            "Forbidden! Insufficient role.".to_owned(),
        ));
    }

    let user = AuthService::new(state.pool()).get_user(id).await?;
    Ok(Json(UserResponse { user }))
}
