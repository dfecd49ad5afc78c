//! Blog endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Serialize;

use bazaar_core::BlogId;

use crate::db::BlogRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::Blog;
use crate::services::catalog::BlogForm;
use crate::state::AppState;

use super::{parse_id, upload::UploadForm};

const NOT_FOUND: &str = "Blog not found.";

/// Build the blog router, mounted at `/api/blog`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/{id}", get(show).put(update).delete(destroy))
}

#[derive(Debug, Serialize)]
pub struct BlogListResponse {
    pub blogs: Vec<Blog>,
}

#[derive(Debug, Serialize)]
pub struct BlogResponse {
    pub blog: Blog,
}

#[derive(Debug, Serialize)]
pub struct BlogWriteResponse {
    pub message: &'static str,
    pub blog: Blog,
}

#[derive(Debug, Serialize)]
pub struct BlogDeleteResponse {
    pub message: &'static str,
    pub id: BlogId,
}

pub async fn index(State(state): State<AppState>) -> Result<Json<BlogListResponse>> {
    let blogs = BlogRepository::new(state.pool()).list().await?;
    Ok(Json(BlogListResponse { blogs }))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BlogResponse>> {
    let id: BlogId = parse_id(&id, NOT_FOUND)?;
    let blog = BlogRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_owned()))?;
    Ok(Json(BlogResponse { blog }))
}

pub async fn create(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    mut form: UploadForm,
) -> Result<(StatusCode, Json<BlogWriteResponse>)> {
    let blog = state.catalog().create_blog(blog_form(&mut form)).await?;
    Ok((
        StatusCode::CREATED,
        Json(BlogWriteResponse {
            message: "Blog created successfully",
            blog,
        }),
    ))
}

pub async fn update(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut form: UploadForm,
) -> Result<Json<BlogWriteResponse>> {
    let id: BlogId = parse_id(&id, NOT_FOUND)?;
    let blog = state.catalog().update_blog(id, blog_form(&mut form)).await?;
    Ok(Json(BlogWriteResponse {
        message: "Blog updated successfully",
        blog,
    }))
}

pub async fn destroy(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BlogDeleteResponse>> {
    let id: BlogId = parse_id(&id, NOT_FOUND)?;
    let id = state.catalog().delete_blog(id).await?;
    Ok(Json(BlogDeleteResponse {
        message: "Blog deleted successfully.",
        id,
    }))
}

fn blog_form(form: &mut UploadForm) -> BlogForm {
    BlogForm {
        title: form.text("title"),
        content: form.text("content"),
        image: form.take_file("image"),
    }
}
