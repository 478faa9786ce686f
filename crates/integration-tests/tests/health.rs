//! Integration tests for the liveness endpoint and the shared middleware stack.
//!
//! Run with: cargo test -p bookswap-integration-tests

use bookswap_integration_tests::{spawn_backend, spawn_storefront};
use reqwest::{StatusCode, header};

#[tokio::test]
async fn test_health_carries_security_headers() {
    let backend = spawn_backend().await;
    let storefront = spawn_storefront(backend).await;

    let resp = reqwest::get(format!("http://{storefront}/health"))
        .await
        .expect("Health request failed");

    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store, max-age=0");
    assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(resp.text().await.expect("Body is text"), "ok");
}
