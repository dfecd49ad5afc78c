//! Catalog search.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::db::{CategoryRepository, ProductRepository, contains_pattern};
use crate::error::{AppError, Result};
use crate::models::{Category, Product};
use crate::state::AppState;

/// Build the search router, mounted at `/api/search`.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(search))
}

/// Search query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub search_item: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub products: Vec<Product>,
    pub categories: Vec<Category>,
}

/// Products and categories whose title or description contains the term.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    let term = query
        .search_item
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("Search term is required".to_owned()))?;

    let pattern = contains_pattern(term);
    let product_repo = ProductRepository::new(state.pool());
    let category_repo = CategoryRepository::new(state.pool());
    let (products, categories) = tokio::try_join!(
        product_repo.search(&pattern),
        category_repo.search(&pattern),
    )?;

    tracing::debug!(
        term,
        products = products.len(),
        categories = categories.len(),
        "Search"
    );
    Ok(Json(SearchResponse {
        products,
        categories,
    }))
}
