//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions, and the
//! middleware that ends a session whose API token was rejected.

use axum::{
    extract::Request,
    http::{StatusCode, header::ACCEPT},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use sqlx::PgPool;
use tower_sessions::{Expiry, Session, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;
use crate::error::SessionExpired;
use crate::middleware::auth::clear_current_user;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "bookswap_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Where the visitor lands after the API rejected their token.
pub const SESSION_EXPIRED_REDIRECT: &str = "/auth/login?error=session_expired";

/// Create the session layer with `PostgreSQL` store.
///
/// # Arguments
///
/// * `pool` - `PostgreSQL` connection pool
/// * `config` - Storefront configuration (for the cookie's `Secure` flag)
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &StorefrontConfig,
) -> SessionManagerLayer<PostgresStore> {
    // The sessions table is created by `bookswap migrate`
    let store = PostgresStore::new(pool.clone());

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// Drop the stored token and send the visitor to the login page when a
/// handler reports that the API answered 401.
///
/// JSON callers (the checkout script) get a 401 body naming the redirect
/// instead, since a redirect would be followed silently by `fetch`.
pub async fn session_expiry_middleware(request: Request, next: Next) -> Response {
    let session = request.extensions().get::<Session>().cloned();
    let wants_json = request
        .headers()
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));

    let response = next.run(request).await;
    if response.extensions().get::<SessionExpired>().is_none() {
        return response;
    }

    if let Some(session) = session
        && let Err(e) = clear_current_user(&session).await
    {
        tracing::error!("Failed to clear expired session: {}", e);
    }
    tracing::info!("API token rejected, session cleared");

    if wants_json {
        (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({
                "message": "Please sign in again",
                "status": 401,
                "redirect": SESSION_EXPIRED_REDIRECT,
            })),
        )
            .into_response()
    } else {
        Redirect::to(SESSION_EXPIRED_REDIRECT).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, body::Body, middleware, routing::get};
    use tower::ServiceExt;

    use super::*;
    use crate::api::ApiError;
    use crate::error::AppError;

    async fn rejected() -> Result<&'static str, AppError> {
        Err(AppError::Api(ApiError {
            message: "Token expired".to_string(),
            errors: None,
            status: Some(401),
            local: false,
        }))
    }

    fn app() -> Router {
        Router::new()
            .route("/account", get(rejected))
            .route("/ok", get(|| async { "fine" }))
            .layer(middleware::from_fn(session_expiry_middleware))
    }

    #[tokio::test]
    async fn test_api_401_redirects_to_login() {
        let response = app()
            .oneshot(Request::get("/account").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get("location").unwrap(),
            SESSION_EXPIRED_REDIRECT
        );
    }

    #[tokio::test]
    async fn test_api_401_json_caller_gets_401() {
        let response = app()
            .oneshot(
                Request::get("/account")
                    .header(ACCEPT, "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_other_responses_pass_through() {
        let response = app()
            .oneshot(Request::get("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
