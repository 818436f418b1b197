//! # Store Server Tests
//!
//! Exercises every route of the blob store over real HTTP.

mod test_helpers;

use otsu_relay::codec;
use otsu_relay::store::{BlobEntry, ErrorResponse, UploadResponse};
use reqwest::StatusCode;
use test_helpers::{
    half_black_grid, png_bytes, post_file, spawn_test_store, spawn_test_store_with, two_cluster_grid,
    upload,
};

#[tokio::test]
async fn test_upload_then_list_and_fetch() {
    let store = spawn_test_store().await;
    let bytes = png_bytes(&half_black_grid());

    let uploaded = upload(&store, "my scan.png", bytes.clone()).await;
    assert!(uploaded.filename.ends_with("_my_scan.png"));
    assert_eq!(uploaded.url, format!("/static/uploads/{}", uploaded.filename));

    let listing: Vec<BlobEntry> = reqwest::get(store.url("/images"))
        .await
        .expect("list request")
        .json()
        .await
        .expect("list body");
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, uploaded.filename);

    for path in [
        format!("/image/{}", uploaded.filename),
        format!("/static/uploads/{}", uploaded.filename),
    ] {
        let response = reqwest::get(store.url(&path)).await.expect("fetch request");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").map(|v| v.to_str().unwrap_or("")),
            Some("image/png")
        );
        assert_eq!(response.bytes().await.expect("body").to_vec(), bytes);
    }
}

#[tokio::test]
async fn test_listing_is_sorted() {
    let store = spawn_test_store().await;
    std::fs::write(store.storage.config().upload_dir.join("b.png"), [1]).expect("write");
    std::fs::write(store.storage.config().upload_dir.join("a.gif"), [1]).expect("write");
    std::fs::write(store.storage.config().upload_dir.join("notes.txt"), [1]).expect("write");

    let listing: Vec<BlobEntry> = reqwest::get(store.url("/images"))
        .await
        .expect("list request")
        .json()
        .await
        .expect("list body");

    let names: Vec<_> = listing.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["a.gif", "b.png"]);
}

#[tokio::test]
async fn test_upload_rejects_disallowed_extension() {
    let store = spawn_test_store().await;

    let response = post_file(&store, "/upload", "payload.exe", vec![1, 2, 3]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await.expect("error body");
    assert!(body.error.contains("exe"));
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let store = spawn_test_store().await;
    let form = reqwest::multipart::Form::new().text("other", "value");

    let response = reqwest::Client::new()
        .post(store.url("/upload"))
        .multipart(form)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await.expect("error body");
    assert_eq!(body.error, "No file part");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let store = spawn_test_store_with(|config| config.max_content_length = 1024).await;

    let response = post_file(&store, "/upload", "big.png", vec![0u8; 4096]).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_save_processed_prefixes_once() {
    let store = spawn_test_store().await;
    let bytes = png_bytes(&half_black_grid());

    for name in ["scan.png", "otsu_scan.png"] {
        let response = post_file(&store, "/save_processed", name, bytes.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: UploadResponse = response.json().await.expect("save body");
        assert_eq!(body.filename, "otsu_scan.png");
        assert_eq!(body.url, "/static/processed/otsu_scan.png");
    }

    let response = reqwest::get(store.url("/static/processed/otsu_scan.png"))
        .await
        .expect("fetch processed");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.bytes().await.expect("body").to_vec(), bytes);
}

#[tokio::test]
async fn test_server_side_processing() {
    let store = spawn_test_store().await;

    let response = post_file(&store, "/processed", "clusters.png", png_bytes(&two_cluster_grid())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: UploadResponse = response.json().await.expect("process body");
    assert_eq!(body.filename, "otsu_clusters.png");
    let threshold = body.threshold.expect("threshold reported");
    assert!((42..198).contains(&threshold));

    let bytes = reqwest::get(store.url(&body.url))
        .await
        .expect("fetch processed")
        .bytes()
        .await
        .expect("body");
    let binary = codec::decode_bytes(&bytes).expect("decode").to_luma8();
    assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
}

#[tokio::test]
async fn test_server_side_processing_rejects_garbage() {
    let store = spawn_test_store().await;

    let response = post_file(&store, "/processed", "fake.png", b"not an image".to_vec()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await.expect("error body");
    assert!(body.error.starts_with("[DECODE]"));
}

#[tokio::test]
async fn test_missing_and_unsafe_names_are_not_found() {
    let store = spawn_test_store().await;

    for path in ["/image/missing.png", "/static/uploads/..%2f..%2fsecret.png", "/nowhere"] {
        let response = reqwest::get(store.url(path)).await.expect("request");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", path);
    }
}

#[tokio::test]
async fn test_health_and_index() {
    let store = spawn_test_store().await;

    for path in ["/health/live", "/health/ready"] {
        let response = reqwest::get(store.url(path)).await.expect("health request");
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
    }

    upload(&store, "scan.png", png_bytes(&half_black_grid())).await;
    let html = reqwest::get(store.url("/"))
        .await
        .expect("index request")
        .text()
        .await
        .expect("index body");
    assert!(html.contains("Uploaded images"));
    assert!(html.contains("_scan.png"));
}

#[tokio::test]
async fn test_readiness_fails_when_storage_disappears() {
    let store = spawn_test_store().await;
    std::fs::remove_dir_all(&store.storage.config().processed_dir).expect("remove processed dir");

    let response = reqwest::get(store.url("/health/ready")).await.expect("health request");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
