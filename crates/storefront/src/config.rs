//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string for the session store
//!   (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `BOOKSWAP_API_URL` - Base URL of the BookSwap REST API (e.g. `https://api.bookswap.example/api/`)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `BOOKSWAP_API_TIMEOUT_SECS` - Client-wide timeout for API calls (default: 30)
//! - `BOOKSWAP_PROXY_UPSTREAM` - Upstream for `/api/proxy` (default: `BOOKSWAP_API_URL`)
//! - `BOOKSWAP_MEDIA_BASES` - Comma-separated media base URLs, tried in order
//!   (default: `/media/`, `/storage/` and `/uploads/` on the API host)
//! - `BOOKSWAP_IMAGE_PLACEHOLDER` - Placeholder image (default: `/static/img/placeholder.svg`)
//! - `STRIPE_PUBLISHABLE_KEY` - Stripe publishable key for the checkout page
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.1)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use bookswap_core::images::{DEFAULT_PLACEHOLDER, ImageError, MediaBase};
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Default client-wide timeout for REST API calls.
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Media directories the API has historically served uploads from.
const DEFAULT_MEDIA_DIRS: &[&str] = &["media/", "storage/", "uploads/"];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// BookSwap REST API configuration
    pub api: ApiConfig,
    /// Image resolution configuration
    pub media: MediaConfig,
    /// Payment processor configuration
    pub stripe: StripeConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. `production`)
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// BookSwap REST API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, always ending in `/`.
    pub base_url: Url,
    /// Single client-wide timeout applied to every API request.
    pub timeout: Duration,
    /// Upstream that `/api/proxy/*` forwards to.
    pub proxy_upstream: Url,
}

/// Image resolution configuration.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Known media hosts and prefixes, tried in order.
    pub bases: Vec<MediaBase>,
    /// Image shown when no candidate loads.
    pub placeholder: String,
}

/// Stripe configuration. Only the publishable key lives here; intents are
/// created and confirmed by the BookSwap API.
#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    /// Publishable key (`pk_...`), safe to expose in the browser.
    pub publishable_key: Option<String>,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_source<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(get);

        let database_url = env
            .optional("STOREFRONT_DATABASE_URL")
            .or_else(|| env.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("STOREFRONT_DATABASE_URL".to_string()))?;
        let host = env.parse_or("STOREFRONT_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = env.parse_or("STOREFRONT_PORT", 3000_u16)?;
        let base_url = env.required("STOREFRONT_BASE_URL")?;

        let api = ApiConfig::from_env(&env)?;
        let media = MediaConfig::from_env(&env, &api.base_url)?;
        let stripe = StripeConfig {
            publishable_key: env.optional("STRIPE_PUBLISHABLE_KEY"),
        };

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            api,
            media,
            stripe,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: env.parse_or("SENTRY_SAMPLE_RATE", 1.0_f32)?,
            sentry_traces_sample_rate: env.parse_or("SENTRY_TRACES_SAMPLE_RATE", 0.1_f32)?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the storefront is served over HTTPS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl ApiConfig {
    fn from_env<F>(env: &Env<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = env.url("BOOKSWAP_API_URL")?;
        let proxy_upstream = match env.optional("BOOKSWAP_PROXY_UPSTREAM") {
            Some(_) => env.url("BOOKSWAP_PROXY_UPSTREAM")?,
            None => base_url.clone(),
        };
        let timeout_secs = env.parse_or("BOOKSWAP_API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BOOKSWAP_API_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            proxy_upstream,
        })
    }
}

impl MediaConfig {
    fn from_env<F>(env: &Env<F>, api_url: &Url) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let invalid = |e: ImageError| {
            ConfigError::InvalidEnvVar("BOOKSWAP_MEDIA_BASES".to_string(), e.to_string())
        };

        let bases = match env.optional("BOOKSWAP_MEDIA_BASES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| MediaBase::parse(s).map_err(invalid))
                .collect::<Result<Vec<_>, _>>()?,
            None => default_media_bases(api_url).map_err(invalid)?,
        };

        Ok(Self {
            bases,
            placeholder: env
                .optional("BOOKSWAP_IMAGE_PLACEHOLDER")
                .unwrap_or_else(|| DEFAULT_PLACEHOLDER.to_string()),
        })
    }
}

/// Media bases on the API's origin.
fn default_media_bases(api_url: &Url) -> Result<Vec<MediaBase>, ImageError> {
    let origin = api_url.origin().ascii_serialization();
    DEFAULT_MEDIA_DIRS
        .iter()
        .map(|dir| MediaBase::parse(&format!("{origin}/{dir}")))
        .collect()
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Key/value lookup with typed accessors.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable; empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    /// Get a required http(s) URL, normalised to end in `/` so relative
    /// endpoint paths join below it.
    fn url(&self, key: &str) -> Result<Url, ConfigError> {
        let raw = self.required(key)?;
        let mut url = Url::parse(raw.trim())
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}
