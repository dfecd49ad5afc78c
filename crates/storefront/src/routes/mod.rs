//! HTTP routes for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Liveness text
//! GET  /health                    - Health check
//! GET  /health/ready              - Readiness check (database)
//! GET  /uploads/{kind}/{title}/*  - Uploaded images (categories, products, blogs)
//!
//! # Catalog (writes require admin)
//! GET|POST        /api/category
//! GET|PUT|DELETE  /api/category/{id}
//! GET|POST        /api/product        (?categoryId=)
//! GET|PUT|DELETE  /api/product/{id}
//! GET|POST        /api/blog
//! GET|PUT|DELETE  /api/blog/{id}
//! GET             /api/search         (?searchItem=)
//!
//! # Accounts
//! GET  /api/user                  - All users (admin)
//! GET  /api/user/{id}             - One user (self or admin)
//!
//! # Auth
//! GET  /api/auth/validate-token   - Who the token cookie belongs to
//! GET  /api/auth/get-existing-user
//! POST /api/auth/send-otp         - Email a registration code
//! POST /api/auth/verify-otp       - Check the code
//! POST /api/auth/register         - Create the verified account
//! POST /api/auth/login
//! POST /api/auth/logout
//! POST /api/auth/forgot-pass      - Email a reset code
//! POST /api/auth/reset-pass       - Reset with the code
//! POST /api/auth/change-pass      - Change password (logged in)
//! ```

pub mod auth;
pub mod blogs;
pub mod categories;
pub mod products;
pub mod search;
pub mod upload;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::from_fn,
    routing::get,
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::SessionStore;
use tracing::Span;

use crate::error::{AppError, Result};
use crate::middleware::{
    create_session_layer, request_id_middleware, security_headers_middleware,
};
use crate::services::media::{MediaKind, MediaStore};
use crate::state::AppState;

/// Uploaded files allowed in one request: the main image plus a full gallery
/// plus one spare part for text fields.
const BODY_LIMIT_FILES: usize = upload::MAX_GALLERY_FILES + 2;

/// Create the `/api` routes.
pub fn api_routes(rate_limit: bool) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router(rate_limit))
        .nest("/category", categories::router())
        .nest("/product", products::router())
        .nest("/blog", blogs::router())
        .nest("/user", users::router())
        .nest("/search", search::router())
}

/// Build the complete application with its middleware stack.
///
/// The session store is a parameter so tests can run without a database.
pub fn app<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let config = state.config();
    let body_limit = config
        .uploads
        .max_file_bytes
        .saturating_mul(BODY_LIMIT_FILES);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api", api_routes(config.rate_limit))
        .nest("/uploads", upload_routes(state.media()))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(create_session_layer(session_store, config))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&config.cors_origin()))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// Read-only file serving for the entity folders. The staging area is not
/// reachable.
fn upload_routes(media: &MediaStore) -> Router<AppState> {
    MediaKind::ALL.into_iter().fold(Router::new(), |router, kind| {
        router.nest_service(
            &format!("/{}", kind.dir_name()),
            ServeDir::new(media.root().join(kind.dir_name())),
        )
    })
}

/// Credentialed CORS for the frontend origin.
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(AllowOrigin::exact(value)),
        Err(_) => {
            tracing::warn!(origin, "Client origin is not a valid header value, CORS disabled");
            layer
        }
    }
}

/// Parse a path ID; anything that isn't an ID can't name an existing row.
pub(crate) fn parse_id<T: FromStr>(raw: &str, not_found: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::NotFound(not_found.to_owned()))
}

async fn root() -> &'static str {
    "Request received."
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies database connectivity before returning OK.
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not found" })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::ProductId;

    use super::*;

    #[test]
    fn test_parse_id() {
        let id: ProductId = parse_id(" 42 ", "Product not found.").unwrap();
        assert_eq!(id.as_i32(), 42);

        let err = parse_id::<ProductId>("abc", "Product not found.").unwrap_err();
        assert!(matches!(err, AppError::NotFound(msg) if msg == "Product not found."));
    }
}
