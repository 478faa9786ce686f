//! Image resolution for book covers.
//!
//! Pages render every image with its full candidate sequence so the browser
//! can fall back on its own (`static/js/app.js`). The
//! `/images/resolve` endpoint does the same walk server-side with `HEAD`
//! probes and remembers the winner.

use std::sync::Arc;
use std::time::Duration;

use bookswap_core::images::{ImageProbe, ImageResolver, Resolution};
use moka::future::Cache;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};

use crate::config::MediaConfig;

/// Timeout for a single image probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a resolved URL is remembered.
const RESOLVED_TTL: Duration = Duration::from_secs(10 * 60);

/// Image display data for templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageView {
    /// URL to put in `src`.
    pub src: String,
    /// Remaining candidates as a JSON array, for `data-fallbacks`.
    pub fallbacks: String,
    /// URL to show once every candidate failed.
    pub placeholder: String,
    pub alt: String,
    /// `/images/resolve` link for clients that cannot run the fallback
    /// script (link previews), `None` without an image reference.
    pub resolve_url: Option<String>,
}

/// Probes candidate URLs with `HEAD` requests.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create a probe with its own short timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

impl ImageProbe for HttpProbe {
    async fn exists(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) if response.status().is_success() => response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_none_or(|ct| ct.starts_with("image/")),
            Ok(response) => {
                debug!(url, status = %response.status(), "Image candidate missing");
                false
            }
            Err(e) => {
                debug!(url, error = %e, "Image probe failed");
                false
            }
        }
    }
}

/// Resolves image references into displayable URLs.
///
/// Cheaply cloneable; clones share the resolved-URL cache.
#[derive(Clone)]
pub struct ImageService {
    inner: Arc<ImageServiceInner>,
}

struct ImageServiceInner {
    resolver: ImageResolver,
    probe: HttpProbe,
    resolved: Cache<String, String>,
}

impl ImageService {
    /// Create the service from media configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the probe's HTTP client fails to build.
    pub fn new(config: &MediaConfig) -> Result<Self, reqwest::Error> {
        let resolved = Cache::builder()
            .max_capacity(5000)
            .time_to_live(RESOLVED_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(ImageServiceInner {
                resolver: ImageResolver::new(config.bases.clone(), config.placeholder.clone()),
                probe: HttpProbe::new()?,
                resolved,
            }),
        })
    }

    #[must_use]
    pub fn resolver(&self) -> &ImageResolver {
        &self.inner.resolver
    }

    /// Template data for one image reference.
    #[must_use]
    pub fn view(&self, raw: Option<&str>, alt: &str) -> ImageView {
        let fallback = self.inner.resolver.fallback(raw);
        let fallbacks =
            serde_json::to_string(fallback.remaining()).unwrap_or_else(|_| "[]".to_string());
        let resolve_url = (!fallback.is_placeholder()).then(|| {
            format!(
                "/images/resolve?src={}",
                urlencoding::encode(raw.unwrap_or_default().trim())
            )
        });
        ImageView {
            src: fallback.current().to_string(),
            fallbacks,
            placeholder: fallback.placeholder().to_string(),
            alt: alt.to_string(),
            resolve_url,
        }
    }

    /// First candidate that answers a probe, else the placeholder.
    ///
    /// Only candidates under a media base are fetched. A reference on any
    /// other host contributes its path and filename, never its own URL.
    ///
    /// Only successful resolutions are cached so a temporarily unreachable
    /// media host is retried after the entry would have expired anyway.
    #[instrument(skip(self))]
    pub async fn resolve(&self, raw: &str) -> String {
        let key = raw.trim().to_string();
        if let Some(url) = self.inner.resolved.get(&key).await {
            debug!("Cache hit for resolved image");
            return url;
        }

        match self
            .inner
            .resolver
            .media_fallback(Some(&key))
            .resolve_with(&self.inner.probe)
            .await
        {
            Resolution::Candidate(url) => {
                self.inner.resolved.insert(key, url.clone()).await;
                url
            }
            Resolution::Placeholder(url) => url,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Router, routing::get};
    use bookswap_core::images::{DEFAULT_PLACEHOLDER, MediaBase};

    use super::*;

    fn service() -> ImageService {
        ImageService::new(&MediaConfig {
            bases: vec![
                MediaBase::parse("https://api.bookswap.example/media/").unwrap(),
                MediaBase::parse("https://api.bookswap.example/uploads/").unwrap(),
            ],
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_view_lists_remaining_candidates() {
        let view = service().view(Some("dune.jpg"), "Dune");
        assert_eq!(view.src, "https://api.bookswap.example/media/dune.jpg");
        assert_eq!(
            view.fallbacks,
            r#"["https://api.bookswap.example/uploads/dune.jpg"]"#
        );
        assert_eq!(view.placeholder, DEFAULT_PLACEHOLDER);
        assert_eq!(
            view.resolve_url.as_deref(),
            Some("/images/resolve?src=dune.jpg")
        );
    }

    #[test]
    fn test_view_of_missing_image_is_placeholder() {
        let view = service().view(None, "No cover");
        assert_eq!(view.src, DEFAULT_PLACEHOLDER);
        assert_eq!(view.fallbacks, "[]");
        assert!(view.resolve_url.is_none());
    }

    #[tokio::test]
    async fn test_absent_reference_resolves_without_probing() {
        assert_eq!(service().resolve("null").await, DEFAULT_PLACEHOLDER);
    }

    /// Local host with a media directory and a private endpoint, counting
    /// requests to the latter.
    async fn spawn_media_host() -> (String, Arc<AtomicUsize>) {
        let private_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&private_hits);
        let app = Router::new()
            .route(
                "/media/dune.jpg",
                get(|| async { ([(CONTENT_TYPE, "image/jpeg")], "jpeg") }),
            )
            .route(
                "/internal/{*rest}",
                get(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        ([(CONTENT_TYPE, "image/png")], "secret")
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), private_hits)
    }

    fn service_for(origin: &str) -> ImageService {
        ImageService::new(&MediaConfig {
            bases: vec![MediaBase::parse(&format!("{origin}/media/")).unwrap()],
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_off_base_reference_is_never_fetched() {
        let (origin, private_hits) = spawn_media_host().await;
        let images = service_for(&origin);

        for raw in [
            format!("{origin}/internal/secret.png"),
            format!("{origin}/media/../internal/secret.png"),
            format!("{origin}/media/%2e%2e/internal/secret.png"),
        ] {
            assert_eq!(images.resolve(&raw).await, DEFAULT_PLACEHOLDER, "{raw}");
        }
        assert_eq!(private_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_foreign_host_falls_back_to_media_copy() {
        let (origin, private_hits) = spawn_media_host().await;
        let images = service_for(&origin);

        let resolved = images.resolve(&format!("{origin}/internal/dune.jpg")).await;

        assert_eq!(resolved, format!("{origin}/media/dune.jpg"));
        assert_eq!(private_hits.load(Ordering::SeqCst), 0);
    }
}
