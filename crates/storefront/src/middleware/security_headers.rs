//! Security headers middleware for XSS, clickjacking, and isolation protection.
//!
//! Adds restrictive security headers to all responses. The CSP is locked down
//! except for what the storefront needs: images from the configured media
//! hosts, and Stripe.js on the checkout page.

use axum::{
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue,
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
            X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};
use url::Url;

use crate::config::StorefrontConfig;

/// Stripe.js script and frame host.
const STRIPE_JS: &str = "https://js.stripe.com";
/// Stripe API host used by Stripe.js.
const STRIPE_API: &str = "https://api.stripe.com";
/// Stripe 3-D Secure frames.
const STRIPE_HOOKS: &str = "https://hooks.stripe.com";

/// Precomputed `Content-Security-Policy` header value.
#[derive(Clone)]
pub struct ContentSecurityPolicy(HeaderValue);

impl ContentSecurityPolicy {
    /// Build the policy for this deployment.
    ///
    /// ```text
    /// default-src 'none';
    /// script-src 'self' https://js.stripe.com;
    /// style-src 'self';
    /// font-src 'self';
    /// img-src 'self' data: <media origins>;
    /// connect-src 'self' https://api.stripe.com;
    /// frame-src https://js.stripe.com https://hooks.stripe.com;
    /// object-src 'none';
    /// base-uri 'self';
    /// form-action 'self';
    /// frame-ancestors 'none';
    /// upgrade-insecure-requests   (https deployments only)
    /// ```
    #[must_use]
    pub fn from_config(config: &StorefrontConfig) -> Self {
        let mut img_src = vec!["'self'".to_string(), "data:".to_string()];
        for base in &config.media.bases {
            if let Ok(url) = Url::parse(base.as_str()) {
                let origin = url.origin().ascii_serialization();
                if !img_src.contains(&origin) {
                    img_src.push(origin);
                }
            }
        }

        let mut directives = vec![
            "default-src 'none'".to_string(),
            format!("script-src 'self' {STRIPE_JS}"),
            "style-src 'self'".to_string(),
            "font-src 'self'".to_string(),
            format!("img-src {}", img_src.join(" ")),
            format!("connect-src 'self' {STRIPE_API}"),
            format!("frame-src {STRIPE_JS} {STRIPE_HOOKS}"),
            "object-src 'none'".to_string(),
            "base-uri 'self'".to_string(),
            "form-action 'self'".to_string(),
            "frame-ancestors 'none'".to_string(),
        ];
        if config.is_secure() {
            directives.push("upgrade-insecure-requests".to_string());
        }

        let policy = directives.join("; ");
        Self(
            HeaderValue::from_str(&policy)
                .unwrap_or_else(|_| HeaderValue::from_static("default-src 'self'")),
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.to_str().unwrap_or_default()
    }
}

/// Add security headers to all responses.
///
/// Headers applied:
/// - `X-Frame-Options: DENY` - Prevent clickjacking
/// - `X-Content-Type-Options: nosniff` - Prevent MIME sniffing
/// - `Referrer-Policy: strict-origin-when-cross-origin` - Stripe needs the origin
/// - `Content-Security-Policy` - see [`ContentSecurityPolicy::from_config`]
/// - `Permissions-Policy` - Deny sensitive features except payment for Stripe
/// - `Cache-Control: no-store, max-age=0` - unless the handler set its own
/// - `Cross-Origin-Opener-Policy: same-origin` - Process isolation
/// - `X-DNS-Prefetch-Control: off` - Prevent DNS prefetch leakage
pub async fn security_headers_middleware(
    State(csp): State<ContentSecurityPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(CONTENT_SECURITY_POLICY, csp.0);

    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(
            "accelerometer=(), \
             camera=(), \
             display-capture=(), \
             geolocation=(), \
             gyroscope=(), \
             magnetometer=(), \
             microphone=(), \
             midi=(), \
             payment=(self \"https://js.stripe.com\"), \
             usb=(), \
             xr-spatial-tracking=()",
        ),
    );

    if !headers.contains_key(CACHE_CONTROL) {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, max-age=0"));
    }

    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );

    headers.insert(
        HeaderName::from_static("x-dns-prefetch-control"),
        HeaderValue::from_static("off"),
    );

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(base_url: &str, media: &str) -> StorefrontConfig {
        let vars: HashMap<&str, String> = HashMap::from([
            ("STOREFRONT_DATABASE_URL", "postgres://localhost/bookswap".to_string()),
            ("STOREFRONT_BASE_URL", base_url.to_string()),
            ("BOOKSWAP_API_URL", "https://api.bookswap.example/api/".to_string()),
            ("BOOKSWAP_MEDIA_BASES", media.to_string()),
        ]);
        StorefrontConfig::from_source(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_media_origins_are_allowed_once() {
        let csp = ContentSecurityPolicy::from_config(&config(
            "https://shop.bookswap.example",
            "https://cdn.bookswap.example/media/,https://cdn.bookswap.example/uploads/",
        ));
        assert!(
            csp.as_str()
                .contains("img-src 'self' data: https://cdn.bookswap.example;")
        );
        assert!(csp.as_str().contains("script-src 'self' https://js.stripe.com"));
        assert!(csp.as_str().ends_with("upgrade-insecure-requests"));
    }

    #[test]
    fn test_plain_http_does_not_upgrade() {
        let csp = ContentSecurityPolicy::from_config(&config(
            "http://localhost:3000",
            "http://localhost:8000/media/",
        ));
        assert!(!csp.as_str().contains("upgrade-insecure-requests"));
        assert!(csp.as_str().contains("http://localhost:8000"));
    }
}
