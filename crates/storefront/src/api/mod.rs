//! BookSwap REST API client.
//!
//! # Architecture
//!
//! - One `reqwest::Client` with a single fixed client-wide timeout
//! - The visitor's bearer token is attached per call; the client itself is
//!   shared and holds no per-user state
//! - Every failure is normalized into [`ApiError`] (see [`error`])
//! - Book listings, book details, reviews and categories are cached in
//!   memory via `moka` for 60 seconds; writes invalidate the cache
//!
//! # Example
//!
//! ```rust,ignore
//! use bookswap_storefront::api::{ApiClient, BookQuery};
//!
//! let client = ApiClient::new(&config.api)?;
//! let page = client.list_books(&BookQuery::search("dune"), None).await?;
//! let book = client.get_book(page.items[0].id, None).await?;
//! ```

mod auth;
mod books;
mod cache;
pub mod error;
mod orders;
mod payments;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

pub use auth::{AuthSession, LoginRequest, RegisterRequest};
pub use books::{BookQuery, ImageUpload, ListingInput, ReviewInput};
pub use error::{ApiError, ErrorKind};
pub use payments::{ConfirmPaymentRequest, CreateIntentRequest, PaymentIntent};

use crate::config::ApiConfig;
use cache::CacheValue;

/// Bearer token issued by the API at login.
#[derive(Clone)]
pub struct ApiToken(SecretString);

impl ApiToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken([REDACTED])")
    }
}

/// Client for the BookSwap REST API.
///
/// Cheaply cloneable; all clones share the connection pool and cache.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    cache: Cache<String, CacheValue>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (e.g. no TLS backend).
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(concat!("bookswap-storefront/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::local(format!("failed to build HTTP client: {e}")))?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(60))
            .build();

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.base_url.clone(),
                cache,
            }),
        })
    }

    /// Base URL all endpoint paths are joined onto.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Resolve an endpoint path below the base URL.
    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        let mut url = self
            .inner
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::local(format!("invalid API path '{path}': {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Start a request, attaching `Authorization: Bearer` when a token is given.
    fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        token: Option<&ApiToken>,
    ) -> Result<RequestBuilder, ApiError> {
        let url = self.url(path, query)?;
        let builder = self.inner.client.request(method, url);
        Ok(match token {
            Some(token) => builder.bearer_auth(token.expose()),
            None => builder,
        })
    }

    /// Send a request and decode a JSON success body.
    async fn send<T>(&self, builder: RequestBuilder) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let body = self.send_raw(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse BookSwap API response"
            );
            ApiError {
                status: Some(502),
                ..ApiError::local("Unexpected response from the book service")
            }
        })
    }

    /// Send a request whose success body is ignored.
    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        self.send_raw(builder).await.map(drop)
    }

    async fn send_raw(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, timeout = e.is_timeout(), "BookSwap API request failed");
            ApiError::network(&e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::network(&e))?;

        if status.is_success() {
            return Ok(body);
        }

        let error = ApiError::from_response(status.as_u16(), &body);
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "BookSwap API returned server error"
            );
        } else {
            debug!(status = %status, message = %error.message, "BookSwap API rejected request");
        }
        Err(error)
    }

    async fn get_json<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: Option<&ApiToken>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let builder = self.request(Method::GET, path, query, token)?;
        self.send(builder).await
    }

    async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        token: Option<&ApiToken>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(Method::POST, path, &[], token)?.json(body);
        self.send(builder).await
    }

    /// Drop every cached listing, detail and category entry.
    pub fn invalidate_cache(&self) {
        self.inner.cache.invalidate_all();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url: Url::parse("https://api.bookswap.example/api/").unwrap(),
            timeout: Duration::from_secs(5),
            proxy_upstream: Url::parse("https://api.bookswap.example/").unwrap(),
        })
        .unwrap()
    }

    #[test]
    fn test_paths_join_below_base() {
        let url = client().url("/books/7", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.bookswap.example/api/books/7");
    }

    #[test]
    fn test_query_is_encoded() {
        let url = client()
            .url("books", &[("search", "war & peace".to_string()), ("page", "2".to_string())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.bookswap.example/api/books?search=war+%26+peace&page=2"
        );
    }

    #[test]
    fn test_bearer_header_is_attached() {
        let token = ApiToken::new("abc123");
        let request = client()
            .request(Method::GET, "auth/me", &[], Some(&token))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer abc123"
        );
    }

    #[test]
    fn test_no_token_no_header() {
        let request = client()
            .request(Method::GET, "books", &[], None)
            .unwrap()
            .build()
            .unwrap();
        assert!(request.headers().get("authorization").is_none());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = ApiToken::new("super-secret-token");
        assert!(!format!("{token:?}").contains("super-secret-token"));
    }
}
