//! Category endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Serialize;

use bazaar_core::CategoryId;

use crate::db::CategoryRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::Category;
use crate::services::catalog::CategoryForm;
use crate::state::AppState;

use super::{parse_id, upload::UploadForm};

const NOT_FOUND: &str = "Category not found.";

/// Build the category router, mounted at `/api/category`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/{id}", get(show).put(update).delete(destroy))
}

#[derive(Debug, Serialize)]
pub struct CategoryListResponse {
    pub categories: Vec<Category>,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub category: Category,
}

#[derive(Debug, Serialize)]
pub struct CategoryWriteResponse {
    pub message: &'static str,
    pub category: Category,
}

#[derive(Debug, Serialize)]
pub struct CategoryDeleteResponse {
    pub message: &'static str,
    pub id: CategoryId,
}

/// List every category, ordered by title.
pub async fn index(State(state): State<AppState>) -> Result<Json<CategoryListResponse>> {
    let categories = CategoryRepository::new(state.pool()).list().await?;
    Ok(Json(CategoryListResponse { categories }))
}

/// Show one category.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CategoryResponse>> {
    let id: CategoryId = parse_id(&id, NOT_FOUND)?;
    let category = CategoryRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_owned()))?;
    Ok(Json(CategoryResponse { category }))
}

/// Create a category from a multipart form.
pub async fn create(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    mut form: UploadForm,
) -> Result<(StatusCode, Json<CategoryWriteResponse>)> {
    let category = state
        .catalog()
        .create_category(category_form(&mut form))
        .await?;

    tracing::info!(category_id = %category.id, admin_id = %admin.user_id, "Category created");
    Ok((
        StatusCode::CREATED,
        Json(CategoryWriteResponse {
            message: "Category created successfully",
            category,
        }),
    ))
}

/// Update a category from a multipart form.
pub async fn update(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut form: UploadForm,
) -> Result<Json<CategoryWriteResponse>> {
    let id: CategoryId = parse_id(&id, NOT_FOUND)?;
    let category = state
        .catalog()
        .update_category(id, category_form(&mut form))
        .await?;

    tracing::info!(category_id = %id, admin_id = %admin.user_id, "Category updated");
    Ok(Json(CategoryWriteResponse {
        message: "Category updated successfully",
        category,
    }))
}

/// Delete a category. Its products move to the default category.
pub async fn destroy(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CategoryDeleteResponse>> {
    let id: CategoryId = parse_id(&id, NOT_FOUND)?;
    let id = state.catalog().delete_category(id).await?;

    Ok(Json(CategoryDeleteResponse {
        message: "Category deleted successfully.",
        id,
    }))
}

fn category_form(form: &mut UploadForm) -> CategoryForm {
    CategoryForm {
        title: form.text("title"),
        description: form.text("description"),
        image: form.take_file("image"),
    }
}
