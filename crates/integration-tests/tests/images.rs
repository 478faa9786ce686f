//! Integration tests for `/images/resolve`.
//!
//! The fake API serves `dune.jpg` below its second media base only, so the
//! first candidate always fails its probe.
//!
//! Run with: cargo test -p bookswap-integration-tests

use bookswap_core::images::DEFAULT_PLACEHOLDER;
use bookswap_integration_tests::{spawn_backend, spawn_storefront};
use reqwest::{Client, StatusCode, header};

async fn resolve(src: &str) -> (StatusCode, String, Option<String>) {
    let backend = spawn_backend().await;
    let storefront = spawn_storefront(backend).await;
    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client");

    let resp = client
        .get(format!("http://{storefront}/images/resolve"))
        .query(&[("src", src)])
        .send()
        .await
        .expect("Resolve request failed");

    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let cache = resp
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    (resp.status(), location.replace(&backend.to_string(), "backend"), cache)
}

#[tokio::test]
async fn test_redirects_to_first_loadable_candidate() {
    let (status, location, cache) = resolve("dune.jpg").await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location, "http://backend/media/books/dune.jpg");
    assert_eq!(cache.as_deref(), Some("public, max-age=600"));
}

#[tokio::test]
async fn test_embedded_prefix_is_resolved() {
    let (status, location, _) = resolve("/media/books/dune.jpg").await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location, "http://backend/media/books/dune.jpg");
}

#[tokio::test]
async fn test_missing_image_falls_back_to_placeholder() {
    let (status, location, _) = resolve("books/missing.jpg").await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location, DEFAULT_PLACEHOLDER);
}

#[tokio::test]
async fn test_absent_reference_is_placeholder() {
    let (status, location, _) = resolve("  ").await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location, DEFAULT_PLACEHOLDER);
}

#[tokio::test]
async fn test_foreign_host_is_replaced_by_media_copy() {
    let (status, location, _) = resolve("http://127.0.0.1:9/private/dune.jpg").await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location, "http://backend/media/books/dune.jpg");
}

#[tokio::test]
async fn test_foreign_host_without_media_copy_is_placeholder() {
    let (status, location, _) = resolve("http://169.254.169.254/latest/meta-data/").await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location, DEFAULT_PLACEHOLDER);
}
