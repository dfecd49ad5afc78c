//! Product endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};

use bazaar_core::{CategoryId, ProductId};

use crate::db::ProductRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::Product;
use crate::services::catalog::ProductForm;
use crate::state::AppState;

use super::{parse_id, upload::UploadForm};

const NOT_FOUND: &str = "Product not found.";

/// Build the product router, mounted at `/api/product`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/{id}", get(show).put(update).delete(destroy))
}

/// Query parameters for the product listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub category_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetailResponse {
    pub product: Product,
    pub related_products: Vec<Product>,
}

#[derive(Debug, Serialize)]
pub struct ProductWriteResponse {
    pub message: &'static str,
    pub product: Product,
}

#[derive(Debug, Serialize)]
pub struct ProductDeleteResponse {
    pub message: &'static str,
    pub id: ProductId,
}

/// List products, newest first, optionally limited to one category.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductListResponse>> {
    let category = match query.category_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<CategoryId>()
                .map_err(|_| AppError::BadRequest("Invalid categoryId".to_owned()))?,
        ),
    };

    let products = ProductRepository::new(state.pool()).list(category).await?;
    Ok(Json(ProductListResponse { products }))
}

/// Show one product with the other products of its category.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductDetailResponse>> {
    let id: ProductId = parse_id(&id, NOT_FOUND)?;
    let (product, related_products) = state.catalog().product_with_related(id).await?;
    Ok(Json(ProductDetailResponse {
        product,
        related_products,
    }))
}

/// Create a product from a multipart form.
pub async fn create(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    mut form: UploadForm,
) -> Result<(StatusCode, Json<ProductWriteResponse>)> {
    let product = state.catalog().create_product(product_form(&mut form)).await?;

    tracing::info!(product_id = %product.id, admin_id = %admin.user_id, "Product created");
    Ok((
        StatusCode::CREATED,
        Json(ProductWriteResponse {
            message: "Product created successfully",
            product,
        }),
    ))
}

/// Update a product from a multipart form.
pub async fn update(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut form: UploadForm,
) -> Result<Json<ProductWriteResponse>> {
    let id: ProductId = parse_id(&id, NOT_FOUND)?;
    let product = state
        .catalog()
        .update_product(id, product_form(&mut form))
        .await?;

    tracing::info!(product_id = %id, admin_id = %admin.user_id, "Product updated");
    Ok(Json(ProductWriteResponse {
        message: "Product updated successfully",
        product,
    }))
}

/// Delete a product and its images.
pub async fn destroy(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductDeleteResponse>> {
    let id: ProductId = parse_id(&id, NOT_FOUND)?;
    let id = state.catalog().delete_product(id).await?;

    tracing::info!(product_id = %id, admin_id = %admin.user_id, "Product deleted");
    Ok(Json(ProductDeleteResponse {
        message: "Product deleted successfully.",
        id,
    }))
}

fn product_form(form: &mut UploadForm) -> ProductForm {
    ProductForm {
        title: form.text("title"),
        description: form.text("description"),
        price: form.text("price"),
        stock: form.text("stock"),
        category_id: form.text("categoryId"),
        image: form.take_file("image"),
        gallery: form.take_files("gallery"),
        remove_gallery: form.texts("removeGallery"),
    }
}
