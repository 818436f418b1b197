//! # Orchestrator Tests
//!
//! Runs every orchestration mode end to end against a live store server.

mod test_helpers;

use otsu_relay::client::{Menu, Orchestrator, RemoteStore};
use otsu_relay::codec;
use otsu_relay::pipeline_errors::PipelineError;
use test_helpers::{
    color_png_bytes, color_scene, half_black_grid, png_bytes, spawn_test_store, two_cluster_grid,
    upload,
};

#[tokio::test]
async fn test_local_to_remote_binary_input_round_trips() {
    let store = spawn_test_store().await;
    let workdir = tempfile::tempdir().expect("workdir");
    let source = workdir.path().join("grid.png");
    std::fs::write(&source, png_bytes(&half_black_grid())).expect("write source");

    let orchestrator = Orchestrator::new(store.store_client(), workdir.path().join("out"));
    let outcome = orchestrator
        .run_local_to_remote(&source)
        .await
        .expect("local to remote run");

    assert!(outcome.threshold < 255);
    assert_eq!(outcome.dimensions, (4, 4));
    assert_eq!(outcome.deposits.len(), 1);
    assert_eq!(outcome.deposits[0].name, "otsu_grid.png");

    // Already binary input comes back unchanged
    let fetched = orchestrator
        .store()
        .fetch(&outcome.deposits[0].locator)
        .await
        .expect("deposited image is fetchable");
    let binary = codec::decode_file(fetched.path()).expect("decode").to_luma8();
    assert_eq!(binary, half_black_grid());
}

#[tokio::test]
async fn test_remote_to_remote() {
    let store = spawn_test_store().await;
    let uploaded = upload(&store, "clusters.png", png_bytes(&two_cluster_grid())).await;

    let orchestrator = Orchestrator::new(store.store_client(), store.dir.path().join("local"));
    let outcome = orchestrator
        .run_remote_to_remote(&uploaded.url)
        .await
        .expect("remote to remote run");

    assert!((42..198).contains(&outcome.threshold));
    assert_eq!(outcome.deposits.len(), 1);
    assert_eq!(outcome.deposits[0].name, format!("otsu_{}", uploaded.filename));
    assert!(outcome.deposits[0].locator.starts_with(&store.base_url));

    let stored = store
        .storage
        .config()
        .processed_dir
        .join(&outcome.deposits[0].name);
    assert!(stored.is_file());
    assert!(!orchestrator.local_output_dir().exists());
}

#[tokio::test]
async fn test_remote_to_local_by_bare_name() {
    let store = spawn_test_store().await;
    let uploaded = upload(&store, "scene.png", color_png_bytes(&color_scene())).await;
    let output = tempfile::tempdir().expect("output dir");

    let orchestrator = Orchestrator::new(store.store_client(), output.path().join("results"));
    let outcome = orchestrator
        .run_remote_to_local(&uploaded.filename)
        .await
        .expect("remote to local run");

    assert_eq!(outcome.deposits.len(), 1);
    let written = output.path().join("results").join(format!("otsu_{}", uploaded.filename));
    assert_eq!(outcome.deposits[0].locator, written.display().to_string());

    let binary = codec::decode_file(&written).expect("decode local result").to_luma8();
    assert_eq!(binary.dimensions(), (16, 16));
    assert_eq!(binary.get_pixel(8, 8)[0], 255);
    assert_eq!(binary.get_pixel(0, 0)[0], 0);

    // Nothing deposited remotely
    let processed = std::fs::read_dir(&store.storage.config().processed_dir)
        .expect("processed dir")
        .count();
    assert_eq!(processed, 0);
}

#[tokio::test]
async fn test_remote_to_both() {
    let store = spawn_test_store().await;
    let uploaded = upload(&store, "clusters.png", png_bytes(&two_cluster_grid())).await;
    let output = tempfile::tempdir().expect("output dir");

    let orchestrator = Orchestrator::new(store.store_client(), output.path());
    let outcome = orchestrator
        .run_remote_to_both(&uploaded.url)
        .await
        .expect("remote to both run");

    assert_eq!(outcome.deposits.len(), 2);
    let expected = format!("otsu_{}", uploaded.filename);
    assert!(outcome.deposits.iter().all(|deposit| deposit.name == expected));

    let remote = store.storage.config().processed_dir.join(&expected);
    let local = output.path().join(&expected);
    assert_eq!(
        std::fs::read(remote).expect("remote copy"),
        std::fs::read(local).expect("local copy")
    );
}

#[tokio::test]
async fn test_missing_remote_source_is_acquire_error() {
    let store = spawn_test_store().await;
    let orchestrator = Orchestrator::new(store.store_client(), store.dir.path().join("local"));

    let err = orchestrator
        .run_remote_to_local("/image/absent.png")
        .await
        .expect_err("missing image cannot be processed");

    assert!(matches!(err, PipelineError::Acquire(_)), "{:?}", err);
}

#[tokio::test]
async fn test_missing_local_source_is_acquire_error() {
    let store = spawn_test_store().await;
    let orchestrator = Orchestrator::new(store.store_client(), store.dir.path().join("local"));

    let err = orchestrator
        .run_local_to_remote(&store.dir.path().join("nope.png"))
        .await
        .expect_err("missing file cannot be processed");

    assert!(matches!(err, PipelineError::Acquire(_)), "{:?}", err);
}

#[tokio::test]
async fn test_constant_remote_image_is_degenerate() {
    let store = spawn_test_store().await;
    let flat = image::GrayImage::from_pixel(8, 8, image::Luma([90]));
    let uploaded = upload(&store, "flat.png", png_bytes(&flat)).await;

    let orchestrator = Orchestrator::new(store.store_client(), store.dir.path().join("local"));
    let err = orchestrator
        .run_remote_to_remote(&uploaded.url)
        .await
        .expect_err("flat image has no threshold");

    assert!(matches!(err, PipelineError::DegenerateInput(_)), "{:?}", err);
    let processed = std::fs::read_dir(&store.storage.config().processed_dir)
        .expect("processed dir")
        .count();
    assert_eq!(processed, 0);
}

#[tokio::test]
async fn test_list_available_reports_uploads() {
    let store = spawn_test_store().await;
    let uploaded = upload(&store, "scan.png", png_bytes(&half_black_grid())).await;

    let entries = store
        .store_client()
        .list_available()
        .await
        .expect("listing");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, uploaded.filename);
    assert_eq!(entries[0].url, uploaded.url);
}

#[tokio::test]
async fn test_menu_switches_to_reachable_server() {
    let store = spawn_test_store().await;
    let script = format!("5\n{}\n1\n0\n", store.base_url);
    let mut output = Vec::new();

    {
        let config = otsu_relay::config::ClientConfig {
            server_url: "http://127.0.0.1:1".to_string(),
            ..otsu_relay::config::ClientConfig::default()
        };
        let mut menu = Menu::new(std::io::Cursor::new(script), &mut output, config);
        menu.run().await.expect("menu run");
    }

    let output = String::from_utf8(output).expect("utf8 output");
    assert!(output.contains(&format!("Server set to {}", store.base_url)));
    assert!(!output.contains("Warning"));
    assert!(output.contains("No images on the server."));
}
