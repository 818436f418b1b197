//! # Test Helper Library
//!
//! Common setup shared by the integration suites: a real store server bound
//! to an ephemeral port over temporary directories, client configuration
//! pointing at it, and small fixture images.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use image::{GrayImage, Luma, Rgb, RgbImage};
use otsu_relay::client::HttpStoreClient;
use otsu_relay::codec;
use otsu_relay::config::{ClientConfig, StoreConfig};
use otsu_relay::store::{spawn_store_server, BlobStorage, UploadResponse};
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// A running store server; the accept loop stops when this is dropped
pub struct TestStore {
    pub addr: SocketAddr,
    pub base_url: String,
    pub storage: Arc<BlobStorage>,
    pub dir: TempDir,
    handle: JoinHandle<()>,
}

impl Drop for TestStore {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl TestStore {
    /// Client configuration pointing at this server, writing locally into `output_dir`
    pub fn client_config(&self, output_dir: &std::path::Path) -> ClientConfig {
        ClientConfig {
            server_url: self.base_url.clone(),
            http_timeout_secs: 10,
            local_output_dir: output_dir.to_path_buf(),
            ..ClientConfig::default()
        }
    }

    pub fn store_client(&self) -> HttpStoreClient {
        HttpStoreClient::new(&self.client_config(self.dir.path()))
            .expect("client for test store")
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Start a store server on 127.0.0.1 with a fresh temporary root
pub async fn spawn_test_store() -> TestStore {
    spawn_test_store_with(|_| {}).await
}

/// Start a store server after adjusting its configuration
pub async fn spawn_test_store_with(adjust: impl FnOnce(&mut StoreConfig)) -> TestStore {
    let dir = tempfile::tempdir().expect("temp dir for store");
    let mut config = StoreConfig::rooted_at(dir.path());
    config.bind_address = "127.0.0.1".to_string();
    config.port = 0;
    adjust(&mut config);

    let storage = Arc::new(BlobStorage::new(config).expect("storage"));
    let (addr, handle) = spawn_store_server(storage.clone(), "127.0.0.1:0".parse().expect("addr"))
        .await
        .expect("store server should start");

    TestStore {
        addr,
        base_url: format!("http://{}", addr),
        storage,
        dir,
        handle,
    }
}

/// POST `bytes` as multipart field `file` to `route`
pub async fn post_file(
    store: &TestStore,
    route: &str,
    filename: &str,
    bytes: Vec<u8>,
) -> reqwest::Response {
    let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);

    reqwest::Client::new()
        .post(store.url(route))
        .multipart(form)
        .send()
        .await
        .expect("request should reach the store")
}

/// Upload a source image and return the stored name
pub async fn upload(store: &TestStore, filename: &str, bytes: Vec<u8>) -> UploadResponse {
    let response = post_file(store, "/upload", filename, bytes).await;
    assert!(response.status().is_success(), "upload failed: {}", response.status());
    response.json().await.expect("upload response body")
}

/// 4x4 grid whose left half is 0 and right half 255
pub fn half_black_grid() -> GrayImage {
    GrayImage::from_fn(4, 4, |x, _| if x < 2 { Luma([0]) } else { Luma([255]) })
}

/// Two intensity clusters spread around 40 and 200
pub fn two_cluster_grid() -> GrayImage {
    GrayImage::from_fn(32, 32, |x, y| {
        let jitter = ((x + y) % 5) as u8;
        if x < 16 {
            Luma([38 + jitter])
        } else {
            Luma([198 + jitter])
        }
    })
}

/// Colour image: dark red background with a bright yellow square
pub fn color_scene() -> RgbImage {
    RgbImage::from_fn(16, 16, |x, y| {
        if (4..12).contains(&x) && (4..12).contains(&y) {
            Rgb([250, 240, 40])
        } else {
            Rgb([60, 10, 10])
        }
    })
}

pub fn png_bytes(gray: &GrayImage) -> Vec<u8> {
    codec::encode_gray(gray, "fixture.png").expect("encode fixture")
}

pub fn color_png_bytes(rgb: &RgbImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    image::DynamicImage::ImageRgb8(rgb.clone())
        .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .expect("encode colour fixture");
    buffer
}
