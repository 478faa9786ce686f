//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Home page
//! GET  /health                 - Health check
//! GET  /health/ready           - Readiness check (database)
//!
//! # Books
//! GET  /books                  - Book list (search, category, page)
//! POST /books                  - Create listing (multipart)
//! GET  /books/new              - Listing form
//! GET  /books/{id}             - Book detail with reviews
//! POST /books/{id}             - Update listing (multipart)
//! GET  /books/{id}/edit        - Edit form (owner only)
//! POST /books/{id}/delete      - Delete listing (owner only)
//! POST /books/{id}/reviews     - Post review
//!
//! # Checkout
//! GET  /checkout/{book_id}         - Checkout page
//! POST /checkout/{book_id}/intent  - Create payment intent (JSON)
//! POST /checkout/{book_id}/confirm - Confirm payment (JSON)
//! GET  /checkout/success           - Order confirmation
//!
//! # Auth
//! GET  /auth/login             - Login page
//! POST /auth/login             - Login action
//! GET  /auth/register          - Register page
//! POST /auth/register          - Register action
//! POST /auth/logout            - Logout action
//!
//! # Account (requires auth)
//! GET  /account                     - Profile and own listings
//! GET  /account/orders              - Order history
//! GET  /account/orders/{id}         - Order detail
//! POST /account/orders/clear-local  - Forget local order snapshots
//!
//! # Other
//! GET  /images/resolve         - Server-side image fallback
//! ANY  /api/proxy/{*path}      - Request forwarding to the API
//! GET  /static/*               - Static assets
//! ```

pub mod account;
pub mod auth;
pub mod books;
pub mod checkout;
pub mod home;
pub mod images;
pub mod proxy;
pub mod views;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::forms::MAX_LISTING_BODY;
use crate::middleware::{
    ContentSecurityPolicy, auth_rate_limiter, create_session_layer, proxy_rate_limiter,
    request_id_middleware, security_headers_middleware, session_expiry_middleware,
};
use crate::state::AppState;

/// Static assets, relative to the workspace root.
const STATIC_DIR: &str = "crates/storefront/static";

/// Create the book routes router.
pub fn book_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(books::index).post(books::create))
        .route("/new", get(books::new_page))
        .route("/{id}", get(books::show).post(books::update))
        .route("/{id}/edit", get(books::edit_page))
        .route("/{id}/delete", post(books::delete))
        .route("/{id}/reviews", post(books::create_review))
        .layer(DefaultBodyLimit::max(MAX_LISTING_BODY))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/success", get(checkout::success))
        .route("/{book_id}", get(checkout::show))
        .route("/{book_id}/intent", post(checkout::create_intent))
        .route("/{book_id}/confirm", post(checkout::confirm))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
        .layer(auth_rate_limiter())
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::index))
        .route("/orders", get(account::orders))
        .route("/orders/clear-local", post(account::clear_local))
        .route("/orders/{id}", get(account::order_detail))
}

/// Create the request-forwarding router.
///
/// CORS sits outermost so preflights are answered without touching the
/// upstream or the rate limit.
pub fn proxy_routes() -> Router<AppState> {
    Router::new()
        .route("/{*path}", any(proxy::forward))
        .layer(proxy_rate_limiter())
        .layer(CorsLayer::permissive())
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Home page
        .route("/", get(home::home))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/books", book_routes())
        .nest("/checkout", checkout_routes())
        .nest("/auth", auth_routes())
        .nest("/account", account_routes())
        .route("/images/resolve", get(images::resolve))
        .nest("/api/proxy", proxy_routes())
}

/// Build the complete application with its middleware stack.
///
/// See [`crate::middleware`] for the layer order.
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.pool(), state.config());
    let csp = ContentSecurityPolicy::from_config(state.config());

    routes()
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(from_fn(session_expiry_middleware))
        .layer(session_layer)
        .layer(from_fn_with_state(csp, security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
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
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
