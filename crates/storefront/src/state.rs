//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::api::{ApiClient, ApiError};
use crate::config::StorefrontConfig;
use crate::services::images::ImageService;

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("API client: {0}")]
    Api(#[from] ApiError),
    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the session database pool and the API client.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    api: ApiClient,
    images: ImageService,
    proxy_client: reqwest::Client,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool (session store)
    ///
    /// # Errors
    ///
    /// Returns an error if one of the HTTP clients cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let api = ApiClient::new(&config.api)?;
        let images = ImageService::new(&config.media)?;
        // Upstream redirects are relayed, not followed.
        let proxy_client = reqwest::Client::builder()
            .timeout(config.api.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                api,
                images,
                proxy_client,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the BookSwap API client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Get a reference to the image resolution service.
    #[must_use]
    pub fn images(&self) -> &ImageService {
        &self.inner.images
    }

    /// HTTP client used by `/api/proxy`.
    #[must_use]
    pub fn proxy_client(&self) -> &reqwest::Client {
        &self.inner.proxy_client
    }
}
