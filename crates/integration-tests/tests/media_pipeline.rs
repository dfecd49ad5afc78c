//! Upload pipeline scenarios.
//!
//! The first half sends multipart requests through the router and checks
//! that rejected uploads leave nothing in the staging area. The second half
//! replays the catalog update sequence (rename, place, replace) against a
//! temporary upload root and checks the tree after commit and rollback.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::path::Path;

use axum::body::Bytes;
use axum::http::StatusCode;

use bazaar_core::{Title, UserRole};
use bazaar_integration_tests::{
    Part, TEST_MAX_FILE_BYTES, TestApp, body_json, multipart_request, test_config,
};
use bazaar_storefront::services::media::{ChunkSource, MediaError, MediaKind, MediaStore};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nnot really a png";

fn image(bytes: &[u8]) -> Part<'_> {
    Part::File {
        field: "image",
        file_name: "photo.png",
        content_type: "image/png",
        bytes,
    }
}

// ============================================================================
// Through the router
// ============================================================================

#[tokio::test]
async fn test_category_without_image_is_rejected() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);

    let request = multipart_request(
        "POST",
        "/api/category",
        &token,
        &[Part::Text("title", "Shoes"), Part::Text("description", "Feet")],
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Title, Image and Description are required"
    );
}

#[tokio::test]
async fn test_wrong_content_type_is_rejected() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);

    let request = multipart_request(
        "POST",
        "/api/category",
        &token,
        &[
            Part::Text("title", "Shoes"),
            Part::File {
                field: "image",
                file_name: "notes.txt",
                content_type: "text/plain",
                bytes: b"hello",
            },
        ],
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Invalid file type");
    assert!(app.staged_files().is_empty());
}

#[tokio::test]
async fn test_oversized_file_is_rejected_without_leftovers() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);
    let big = vec![0u8; TEST_MAX_FILE_BYTES + 1];

    let request = multipart_request(
        "POST",
        "/api/product",
        &token,
        &[Part::Text("title", "Boots"), image(&big)],
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["message"], "File too large");
    assert!(app.staged_files().is_empty());
}

#[tokio::test]
async fn test_staged_files_are_dropped_when_validation_fails() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);

    // Image and gallery get staged, then the missing price fails the request.
    let request = multipart_request(
        "POST",
        "/api/product",
        &token,
        &[
            Part::Text("title", "Boots"),
            image(PNG),
            Part::File {
                field: "gallery",
                file_name: "side.webp",
                content_type: "image/webp",
                bytes: b"RIFF....WEBP",
            },
        ],
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Title, Image and Price are required"
    );
    assert!(app.staged_files().is_empty());
}

#[tokio::test]
async fn test_invalid_price_is_rejected() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);

    let request = multipart_request(
        "POST",
        "/api/product",
        &token,
        &[
            Part::Text("title", "Boots"),
            Part::Text("price", "-3"),
            image(PNG),
        ],
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = body_json(response).await["message"].as_str().unwrap().to_owned();
    assert!(message.starts_with("Invalid price"), "{message}");
    assert!(app.staged_files().is_empty());
}

#[tokio::test]
async fn test_unsafe_title_is_rejected() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);

    let request = multipart_request(
        "POST",
        "/api/blog",
        &token,
        &[Part::Text("title", "../etc"), Part::Text("content", "hi")],
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = body_json(response).await["message"].as_str().unwrap().to_owned();
    assert!(message.starts_with("Invalid title"), "{message}");
}

#[tokio::test]
async fn test_unexpected_file_field_and_duplicate_image() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);

    let request = multipart_request(
        "POST",
        "/api/category",
        &token,
        &[Part::File {
            field: "avatar",
            file_name: "me.png",
            content_type: "image/png",
            bytes: PNG,
        }],
    );
    assert_eq!(app.send(request).await.status(), StatusCode::BAD_REQUEST);

    let request = multipart_request("POST", "/api/category", &token, &[image(PNG), image(PNG)]);
    assert_eq!(app.send(request).await.status(), StatusCode::BAD_REQUEST);
    assert!(app.staged_files().is_empty());
}

#[tokio::test]
async fn test_blog_requires_title_and_content() {
    let app = TestApp::new().await;
    let token = app.token(1, UserRole::Admin);

    let request = multipart_request("POST", "/api/blog", &token, &[Part::Text("title", "News")]);
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Title and Content are required"
    );
}

// ============================================================================
// Journal scenarios
// ============================================================================

struct Chunks(VecDeque<Bytes>);

impl ChunkSource for Chunks {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, MediaError> {
        Ok(self.0.pop_front())
    }
}

fn store(root: &Path) -> MediaStore {
    MediaStore::new(&test_config(root.to_path_buf()).uploads)
}

fn title(s: &str) -> Title {
    Title::parse(s).unwrap()
}

async fn staged(store: &MediaStore, field: &str) -> bazaar_storefront::services::StagedFile {
    let mut source = Chunks(VecDeque::from([Bytes::from_static(PNG)]));
    store
        .stage(field, Some("upload.png"), Some("image/png"), &mut source)
        .await
        .unwrap()
}

/// Create `products/{title}/` holding one image, as a committed create would.
async fn existing_product(store: &MediaStore, name: &str) -> String {
    let mut change = store.change();
    let file = change
        .place(MediaKind::Product, &title(name), staged(store, "image").await)
        .await
        .unwrap();
    change.commit().await;
    file
}

#[tokio::test]
async fn test_rename_and_replace_commit() {
    let root = tempfile::tempdir().unwrap();
    let store = store(root.path());
    store.ensure_layout().await.unwrap();
    let old_image = existing_product(&store, "Red Boots").await;

    let (old, new) = (title("Red Boots"), title("Crimson Boots"));
    let mut change = store.change();
    change.rename_folder(MediaKind::Product, &old, &new).await.unwrap();
    let new_image = change
        .place(MediaKind::Product, &new, staged(&store, "image").await)
        .await
        .unwrap();
    change.remove_later(MediaKind::Product, &new, &old_image);

    let result: Result<(), MediaError> = change.finish(Ok(())).await;
    assert!(result.is_ok());

    let dir = store.entity_dir(MediaKind::Product, &new);
    assert!(!store.entity_dir(MediaKind::Product, &old).exists());
    assert!(dir.join(&new_image).exists());
    assert!(!dir.join(&old_image).exists());
}

#[tokio::test]
async fn test_rename_and_replace_rollback() {
    let root = tempfile::tempdir().unwrap();
    let store = store(root.path());
    store.ensure_layout().await.unwrap();
    let old_image = existing_product(&store, "Red Boots").await;

    let (old, new) = (title("Red Boots"), title("Crimson Boots"));
    let mut change = store.change();
    change.rename_folder(MediaKind::Product, &old, &new).await.unwrap();
    let new_image = change
        .place(MediaKind::Product, &new, staged(&store, "gallery").await)
        .await
        .unwrap();
    change.remove_later(MediaKind::Product, &new, &old_image);

    // The row write failed.
    let result: Result<(), &str> = change.finish(Err("duplicate title")).await;
    assert!(result.is_err());

    let dir = store.entity_dir(MediaKind::Product, &old);
    assert!(dir.join(&old_image).exists());
    assert!(!dir.join(&new_image).exists());
    assert!(!store.entity_dir(MediaKind::Product, &new).exists());
}

#[tokio::test]
async fn test_rename_onto_existing_folder_changes_nothing() {
    let root = tempfile::tempdir().unwrap();
    let store = store(root.path());
    store.ensure_layout().await.unwrap();
    let boots = existing_product(&store, "Boots").await;
    let shoes = existing_product(&store, "Shoes").await;

    let mut change = store.change();
    let err = change
        .rename_folder(MediaKind::Product, &title("Boots"), &title("Shoes"))
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::FolderExists(_)));
    change.rollback().await;

    assert!(
        store
            .entity_dir(MediaKind::Product, &title("Boots"))
            .join(&boots)
            .exists()
    );
    assert!(
        store
            .entity_dir(MediaKind::Product, &title("Shoes"))
            .join(&shoes)
            .exists()
    );
}

#[tokio::test]
async fn test_delete_removes_folder_only_on_commit() {
    let root = tempfile::tempdir().unwrap();
    let store = store(root.path());
    store.ensure_layout().await.unwrap();
    existing_product(&store, "Boots").await;
    let dir = store.entity_dir(MediaKind::Product, &title("Boots"));

    let mut change = store.change();
    change.remove_folder_later(MediaKind::Product, &title("Boots"));
    change.rollback().await;
    assert!(dir.exists());

    let mut change = store.change();
    change.remove_folder_later(MediaKind::Product, &title("Boots"));
    change.commit().await;
    assert!(!dir.exists());
}
