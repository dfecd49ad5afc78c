//! Catalog write flows through the router.
//!
//! The first section runs against the unreachable pool: every write fails at
//! the row step, so these check that the upload tree is left as it was. The
//! `#[ignore]` section needs a database (see the crate docs) and checks the
//! tree after successful writes.

#![allow(clippy::unwrap_used)]

use std::path::PathBuf;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;

use bazaar_core::UserRole;
use bazaar_integration_tests::{Part, TestApp, body_json, multipart_request, unique_title};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nnot really a png";
const JPEG: &[u8] = b"\xff\xd8\xff\xe0 not really a jpeg";

fn file<'a>(field: &'a str, file_name: &'a str, content_type: &'a str, bytes: &'a [u8]) -> Part<'a> {
    Part::File {
        field,
        file_name,
        content_type,
        bytes,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::delete(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn folder(app: &TestApp, kind: &str, title: &str) -> PathBuf {
    app.uploads_root().join(kind).join(title)
}

fn folder_entries(app: &TestApp, kind: &str, title: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(folder(app, kind, title))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn str_field(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap().to_owned()
}

// ============================================================================
// Failed row writes
// ============================================================================

#[tokio::test]
async fn test_category_create_rolls_back_when_the_row_write_fails() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);

    let request = multipart_request(
        "POST",
        "/api/category",
        &token,
        &[
            Part::Text("title", "Shoes"),
            Part::Text("description", "Feet"),
            file("image", "shoes.png", "image/png", PNG),
        ],
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["message"], "Internal server error");
    assert!(!folder(&app, "categories", "Shoes").exists());
    assert!(app.staged_files().is_empty());
}

#[tokio::test]
async fn test_product_create_leaves_no_files_when_the_database_is_down() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);

    let request = multipart_request(
        "POST",
        "/api/product",
        &token,
        &[
            Part::Text("title", "Boots"),
            Part::Text("price", "49.99"),
            file("image", "boots.png", "image/png", PNG),
            file("gallery", "side.jpg", "image/jpeg", JPEG),
        ],
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!folder(&app, "products", "Boots").exists());
    assert!(app.staged_files().is_empty());
}

#[tokio::test]
async fn test_update_with_image_drops_staged_file_when_lookup_fails() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);

    let request = multipart_request(
        "PUT",
        "/api/category/1",
        &token,
        &[
            Part::Text("title", "Sandals"),
            file("image", "sandals.png", "image/png", PNG),
        ],
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!folder(&app, "categories", "Sandals").exists());
    assert!(app.staged_files().is_empty());
}

#[tokio::test]
async fn test_search_reaches_the_repositories() {
    let app = TestApp::new().await;

    let response = app.send(get("/api/search?searchItem=boot")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app.send(get("/api/search?searchItem=%20")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Search term is required");
}

// ============================================================================
// Serving uploads
// ============================================================================

#[tokio::test]
async fn test_uploads_serve_entity_folders_only() {
    let app = TestApp::new().await;

    let product_dir = folder(&app, "products", "Boots");
    std::fs::create_dir_all(&product_dir).unwrap();
    std::fs::write(product_dir.join("front.png"), PNG).unwrap();
    std::fs::write(app.uploads_root().join(".staging").join("pending.png"), PNG).unwrap();

    let response = app.send(get("/uploads/products/Boots/front.png")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(get("/uploads/.staging/pending.png")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["message"], "Not found");
}

// ============================================================================
// Database-backed scenarios
// ============================================================================

async fn default_category_id(app: &TestApp) -> i64 {
    let response = app.send(get("/api/category")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["categories"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["isDefault"].as_bool() == Some(true))
        .unwrap()["id"]
        .as_i64()
        .unwrap()
}

async fn create_category(app: &TestApp, token: &str, title: &str) -> Value {
    let request = multipart_request(
        "POST",
        "/api/category",
        token,
        &[
            Part::Text("title", title),
            Part::Text("description", "Seasonal"),
            file("image", "cover.png", "image/png", PNG),
        ],
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["category"].clone()
}

#[tokio::test]
#[ignore = "Requires running database"]
async fn test_category_lifecycle() {
    let app = TestApp::with_database().await;
    let token = app.token(1, UserRole::Admin);

    let title = unique_title("Shoes");
    let category = create_category(&app, &token, &title).await;
    let id = category["id"].as_i64().unwrap();
    let first_image = str_field(&category, "image");
    assert_eq!(folder_entries(&app, "categories", &title), [first_image.clone()]);

    // Same title again: the row write fails and only the new file goes away.
    let request = multipart_request(
        "POST",
        "/api/category",
        &token,
        &[
            Part::Text("title", &title),
            Part::Text("description", "Again"),
            file("image", "again.png", "image/png", PNG),
        ],
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(folder_entries(&app, "categories", &title), [first_image.clone()]);

    // Rename and replace the image in one update.
    let renamed = unique_title("Footwear");
    let request = multipart_request(
        "PUT",
        &format!("/api/category/{id}"),
        &token,
        &[
            Part::Text("title", &renamed),
            file("image", "new.jpg", "image/jpeg", JPEG),
        ],
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["category"].clone();
    let second_image = str_field(&updated, "image");
    assert_eq!(str_field(&updated, "title"), renamed);
    assert_eq!(str_field(&updated, "description"), "Seasonal");
    assert!(!folder(&app, "categories", &title).exists());
    assert_eq!(folder_entries(&app, "categories", &renamed), [second_image]);

    // A product in the category moves to the default one on delete.
    let product_title = unique_title("Trainers");
    let request = multipart_request(
        "POST",
        "/api/product",
        &token,
        &[
            Part::Text("title", &product_title),
            Part::Text("price", "59.90"),
            Part::Text("categoryId", &id.to_string()),
            file("image", "trainers.png", "image/png", PNG),
        ],
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let product_id = body_json(response).await["product"]["id"].as_i64().unwrap();

    let response = app
        .send(delete(&format!("/api/category/{id}"), &token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], id);
    assert!(!folder(&app, "categories", &renamed).exists());

    let response = app.send(get(&format!("/api/category/{id}"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(get(&format!("/api/product/{product_id}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["product"]["categoryId"], default_category_id(&app).await);

    let response = app
        .send(delete(&format!("/api/product/{product_id}"), &token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running database"]
async fn test_default_category_cannot_be_deleted() {
    let app = TestApp::with_database().await;
    let token = app.token(1, UserRole::Admin);

    // Creating a product without a category seeds the default one.
    let title = unique_title("Socks");
    let request = multipart_request(
        "POST",
        "/api/product",
        &token,
        &[
            Part::Text("title", &title),
            Part::Text("price", "4.50"),
            file("image", "socks.png", "image/png", PNG),
        ],
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let product = body_json(response).await["product"].clone();
    let default_id = default_category_id(&app).await;
    assert_eq!(product["categoryId"], default_id);

    let response = app
        .send(delete(&format!("/api/category/{default_id}"), &token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let product_id = product["id"].as_i64().unwrap();
    let response = app
        .send(delete(&format!("/api/product/{product_id}"), &token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!folder(&app, "products", &title).exists());
}

#[tokio::test]
#[ignore = "Requires running database"]
async fn test_product_gallery_edits() {
    let app = TestApp::with_database().await;
    let token = app.token(1, UserRole::Admin);

    let title = unique_title("Boots");
    let request = multipart_request(
        "POST",
        "/api/product",
        &token,
        &[
            Part::Text("title", &title),
            Part::Text("description", "Waterproof"),
            Part::Text("price", "129.00"),
            Part::Text("stock", "3"),
            file("image", "front.png", "image/png", PNG),
            file("gallery", "left.jpg", "image/jpeg", JPEG),
            file("gallery", "right.jpg", "image/jpeg", JPEG),
        ],
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let product = body_json(response).await["product"].clone();
    let id = product["id"].as_i64().unwrap();
    let image = str_field(&product, "image");
    let gallery: Vec<String> = product["gallery"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g.as_str().unwrap().to_owned())
        .collect();
    assert_eq!(gallery.len(), 2);
    let price: f64 = product["price"].as_str().unwrap().parse().unwrap();
    assert!((price - 129.0).abs() < f64::EPSILON);
    assert_eq!(product["stock"], 3);
    assert_eq!(folder_entries(&app, "products", &title).len(), 3);

    // Drop the first gallery image, append one, replace the main image.
    let request = multipart_request(
        "PUT",
        &format!("/api/product/{id}"),
        &token,
        &[
            Part::Text("removeGallery", &gallery[0]),
            file("gallery", "back.jpg", "image/jpeg", JPEG),
            file("image", "front2.png", "image/png", PNG),
        ],
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["product"].clone();
    let new_image = str_field(&updated, "image");
    let new_gallery: Vec<String> = updated["gallery"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g.as_str().unwrap().to_owned())
        .collect();
    assert_ne!(new_image, image);
    assert_eq!(new_gallery.len(), 2);
    assert_eq!(new_gallery[0], gallery[1]);
    assert_eq!(updated["description"], "Waterproof");

    let mut expected = vec![new_image, new_gallery[0].clone(), new_gallery[1].clone()];
    expected.sort();
    assert_eq!(folder_entries(&app, "products", &title), expected);

    let response = app
        .send(delete(&format!("/api/product/{id}"), &token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!folder(&app, "products", &title).exists());

    let response = app.send(get(&format!("/api/product/{id}"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running database"]
async fn test_blog_lifecycle() {
    let app = TestApp::with_database().await;
    let token = app.token(1, UserRole::Admin);

    // The image is optional for posts.
    let title = unique_title("Launch");
    let request = multipart_request(
        "POST",
        "/api/blog",
        &token,
        &[Part::Text("title", &title), Part::Text("content", "We're open")],
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let blog = body_json(response).await["blog"].clone();
    let id = blog["id"].as_i64().unwrap();
    assert!(blog["image"].is_null());

    let request = multipart_request(
        "PUT",
        &format!("/api/blog/{id}"),
        &token,
        &[file("image", "banner.png", "image/png", PNG)],
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["blog"].clone();
    assert_eq!(updated["content"], "We're open");
    assert_eq!(
        folder_entries(&app, "blogs", &title),
        [str_field(&updated, "image")]
    );

    let response = app.send(delete(&format!("/api/blog/{id}"), &token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!folder(&app, "blogs", &title).exists());

    let response = app.send(get(&format!("/api/blog/{id}"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
