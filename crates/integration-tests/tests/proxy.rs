//! Integration tests for `/api/proxy` request forwarding.
//!
//! Run with: cargo test -p bookswap-integration-tests

use bookswap_integration_tests::{UPSTREAM_CORS_ORIGIN, spawn_backend, spawn_storefront};
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use uuid::Uuid;

async fn storefront() -> String {
    let backend = spawn_backend().await;
    let storefront = spawn_storefront(backend).await;
    format!("http://{storefront}")
}

fn client() -> Client {
    Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

#[tokio::test]
async fn test_forwards_method_path_query_and_body() {
    let base = storefront().await;

    let resp = client()
        .post(format!("{base}/api/proxy/echo/books/1/reviews?draft=1"))
        .header("x-forwarded-for", "203.0.113.10")
        .header(header::CONTENT_TYPE, "application/json")
        .body(r#"{"rating":5}"#)
        .send()
        .await
        .expect("Proxy request failed");

    // Upstream status is relayed as-is
    assert_eq!(resp.status(), StatusCode::CREATED);
    let echo: Value = resp.json().await.expect("Echo body is JSON");
    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["path"], "/api/echo/books/1/reviews");
    assert_eq!(echo["query"], "draft=1");
    assert_eq!(echo["body"], r#"{"rating":5}"#);
    assert_eq!(echo["headers"]["content-type"], "application/json");
}

#[tokio::test]
async fn test_request_hop_by_hop_headers_are_dropped() {
    let base = storefront().await;
    let request_id = Uuid::new_v4().to_string();

    let resp = client()
        .get(format!("{base}/api/proxy/echo/orders"))
        .header("x-forwarded-for", "203.0.113.11")
        .header(header::AUTHORIZATION, "Bearer tok-reader")
        .header("keep-alive", "timeout=5")
        .header(header::PROXY_AUTHORIZATION, "Basic c2VjcmV0")
        .header("x-request-id", &request_id)
        .send()
        .await
        .expect("Proxy request failed");

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Value = resp.json().await.expect("Echo body is JSON");
    let headers = &echo["headers"];
    assert_eq!(headers["authorization"], "Bearer tok-reader");
    assert_eq!(headers["x-request-id"], request_id.as_str());
    assert!(headers.get("keep-alive").is_none());
    assert!(headers.get("proxy-authorization").is_none());
}

#[tokio::test]
async fn test_response_headers_are_filtered() {
    let base = storefront().await;

    let resp = client()
        .get(format!("{base}/api/proxy/echo/books"))
        .header("x-forwarded-for", "203.0.113.12")
        .header(header::ORIGIN, "https://shop.example")
        .send()
        .await
        .expect("Proxy request failed");

    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert_eq!(headers["x-upstream"], "echo");
    assert!(headers.get("x-upstream-secret").is_none());

    // Only the storefront's own CORS answer survives
    let origins: Vec<_> = headers
        .get_all(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .iter()
        .collect();
    assert_eq!(origins.len(), 1);
    let origin = origins.first().and_then(|v| v.to_str().ok());
    assert_ne!(origin, Some(UPSTREAM_CORS_ORIGIN));
    assert_eq!(origin, Some("*"));
}

#[tokio::test]
async fn test_preflight_is_answered_locally() {
    let base = storefront().await;

    let resp = client()
        .request(reqwest::Method::OPTIONS, format!("{base}/api/proxy/echo/books"))
        .header("x-forwarded-for", "203.0.113.13")
        .header(header::ORIGIN, "https://shop.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization, content-type")
        .send()
        .await
        .expect("Preflight failed");

    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    assert!(resp.headers().get("x-upstream").is_none());
}

#[tokio::test]
async fn test_session_cookie_is_not_relayed() {
    let base = storefront().await;

    let resp = client()
        .get(format!("{base}/api/proxy/echo/orders"))
        .header("x-forwarded-for", "203.0.113.14")
        .header(header::COOKIE, "theme=dark; bookswap_session=not-a-session-id")
        .send()
        .await
        .expect("Proxy request failed");

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Value = resp.json().await.expect("Echo body is JSON");
    assert_eq!(echo["headers"]["cookie"], "theme=dark");
}
