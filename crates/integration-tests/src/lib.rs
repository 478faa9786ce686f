//! Integration tests for BookSwap.
//!
//! Every test runs against in-process servers on `127.0.0.1:0`: a fake
//! BookSwap API built with axum, and the real storefront router pointed at
//! it. No database is needed; the session pool connects lazily and the routes
//! under test never touch a session.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bookswap-integration-tests
//! ```
//!
//! # Fake API
//!
//! | Route | Behaviour |
//! |---|---|
//! | `POST /api/auth/login` | [`TOKEN`] for [`EMAIL`]/[`PASSWORD`], else 401 `{"detail"}` |
//! | `POST /api/auth/register` | 400 with a Django-style field error |
//! | `GET /api/auth/me` | the reader for `Bearer` [`TOKEN`], else 401 |
//! | `GET /api/books` | paged envelope, filtered by `search` |
//! | `GET /api/books/{id}` | book 1, else 404 |
//! | `GET /api/categories` | 500 with an HTML body |
//! | `ANY /api/echo/{*path}` | request echoed back as JSON |
//! | `GET /media/books/dune.jpg` | a JPEG |

use std::net::SocketAddr;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, Request},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use bookswap_storefront::config::StorefrontConfig;
use bookswap_storefront::routes;
use bookswap_storefront::state::AppState;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use sqlx::postgres::PgPoolOptions;

/// Account the fake API accepts.
pub const EMAIL: &str = "reader@example.com";
pub const PASSWORD: &str = "correct horse";
/// Token the fake API issues and accepts.
pub const TOKEN: &str = "tok-reader";

/// Origin the echo endpoint advertises in its own CORS header.
pub const UPSTREAM_CORS_ORIGIN: &str = "https://upstream.example";

/// Serve `router` on an ephemeral local port.
///
/// # Panics
///
/// Panics if the listener cannot be bound.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Test server failed");
    });
    addr
}

/// Start the fake BookSwap API.
pub async fn spawn_backend() -> SocketAddr {
    serve(backend_router()).await
}

/// Storefront configuration pointing at the fake API on `backend`.
///
/// # Panics
///
/// Panics if the generated configuration is rejected.
#[must_use]
pub fn storefront_config(backend: SocketAddr) -> StorefrontConfig {
    let api = format!("http://{backend}/api/");
    let media = format!("http://{backend}/covers/,http://{backend}/media/books/");
    StorefrontConfig::from_source(|key| match key {
        "STOREFRONT_DATABASE_URL" => Some("postgres://bookswap@127.0.0.1:1/bookswap".to_string()),
        "STOREFRONT_BASE_URL" => Some("http://localhost:3000".to_string()),
        "BOOKSWAP_API_URL" => Some(api.clone()),
        "BOOKSWAP_MEDIA_BASES" => Some(media.clone()),
        "BOOKSWAP_API_TIMEOUT_SECS" => Some("5".to_string()),
        _ => None,
    })
    .expect("Test configuration is invalid")
}

/// Start the storefront against the fake API on `backend`.
///
/// # Panics
///
/// Panics if the application state cannot be built.
pub async fn spawn_storefront(backend: SocketAddr) -> SocketAddr {
    let config = storefront_config(backend);
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(config.database_url.expose_secret())
        .expect("Invalid test database URL");
    let state = AppState::new(config, pool).expect("Failed to build app state");
    serve(routes::app(state)).await
}

// =============================================================================
// Fake BookSwap API
// =============================================================================

fn backend_router() -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/me", get(me))
        .route("/api/books", get(list_books))
        .route("/api/books/{id}", get(get_book))
        .route("/api/categories", get(categories))
        .route("/api/echo/{*path}", any(echo))
        .route("/media/books/dune.jpg", get(cover))
}

fn reader() -> Value {
    json!({
        "id": 7,
        "username": "Ada Reader",
        "email": EMAIL,
        "created_at": "2026-01-15T10:00:00Z"
    })
}

fn dune() -> Value {
    json!({
        "id": 1,
        "title": "Dune",
        "author": "Frank Herbert",
        "price": "9.50",
        "condition": "like_new",
        "images": ["books/dune.jpg"],
        "seller": {"id": 3, "name": "Sam Seller"}
    })
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

async fn login(Json(credentials): Json<Credentials>) -> Response {
    if credentials.email == EMAIL && credentials.password == PASSWORD {
        Json(json!({"access_token": TOKEN})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid credentials"})),
        )
            .into_response()
    }
}

async fn register() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "email": ["A user with that email already exists."],
            "password": ["This password is too common.", "This password is too short."]
        })),
    )
        .into_response()
}

async fn me(headers: HeaderMap) -> Response {
    let expected = format!("Bearer {TOKEN}");
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if authorized {
        Json(reader()).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Given token not valid for any token type"})),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct BooksQuery {
    search: Option<String>,
}

async fn list_books(Query(query): Query<BooksQuery>) -> Json<Value> {
    let matches = query
        .search
        .as_deref()
        .is_none_or(|term| "dune frank herbert".contains(&term.to_lowercase()));
    let results: Vec<Value> = if matches { vec![dune()] } else { Vec::new() };
    Json(json!({"count": results.len(), "results": results}))
}

async fn get_book(Path(id): Path<i64>) -> Response {
    if id == 1 {
        Json(dune()).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response()
    }
}

async fn categories() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/html")],
        "<html><body>Server Error (500)</body></html>",
    )
        .into_response()
}

/// Echo method, path, query, headers and body, and answer with a few headers
/// a proxy must not pass through unchanged.
async fn echo(request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_else(|_| Bytes::new());

    let headers: Map<String, Value> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();

    let mut response = Json(json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
    .into_response();

    let out = response.headers_mut();
    out.insert(header::CONNECTION, HeaderValue::from_static("x-upstream-secret"));
    out.insert("x-upstream-secret", HeaderValue::from_static("1"));
    out.insert("x-upstream", HeaderValue::from_static("echo"));
    out.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(UPSTREAM_CORS_ORIGIN),
    );
    *response.status_mut() = if parts.method == axum::http::Method::POST {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    response
}

async fn cover() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "image/jpeg")],
        Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0]),
    )
}
