//! Request forwarding to the BookSwap API.
//!
//! `ANY /api/proxy/{*path}` relays method, path, query, headers and body to
//! the configured upstream and streams the answer back. CORS is handled by the
//! layer on the proxy router, so upstream `access-control-*` headers are
//! dropped to avoid duplicates.

use std::collections::HashSet;

use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::api::ApiError;
use crate::middleware::RequestId;
use crate::middleware::request_id::REQUEST_ID_HEADER;
use crate::middleware::session::SESSION_COOKIE_NAME;
use crate::state::AppState;

/// Largest request body relayed upstream.
pub const MAX_PROXY_BODY: usize = 10 * 1024 * 1024;

/// Headers that describe one connection and never cross the proxy.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Forwarding failure.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Path tries to leave the upstream base (`..`).
    #[error("Invalid proxy path")]
    InvalidPath,

    /// Request body could not be read or is too large.
    #[error("Invalid request body: {0}")]
    Body(#[from] axum::Error),

    /// Upstream could not be reached.
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::InvalidPath => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    message: "Invalid path".to_string(),
                    errors: None,
                    status: Some(400),
                    local: false,
                },
            ),
            Self::Body(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ApiError {
                    message: "Request body is too large or unreadable".to_string(),
                    errors: None,
                    status: Some(413),
                    local: false,
                },
            ),
            Self::Upstream(err) => {
                tracing::error!(error = %err, "Proxy upstream failed");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiError {
                        status: Some(502),
                        ..ApiError::network(err)
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Upstream URL for `path` and the original query string.
///
/// # Errors
///
/// Returns `ProxyError::InvalidPath` for `..` segments or a path that does
/// not join onto the upstream.
pub fn upstream_url(base: &Url, path: &str, query: Option<&str>) -> Result<Url, ProxyError> {
    if path
        .split('/')
        .any(|segment| segment == ".." || segment.eq_ignore_ascii_case("%2e%2e"))
    {
        return Err(ProxyError::InvalidPath);
    }

    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    let mut url = base
        .join(path.trim_start_matches('/'))
        .map_err(|_| ProxyError::InvalidPath)?;
    if url.origin() != base.origin() {
        return Err(ProxyError::InvalidPath);
    }
    url.set_query(query.filter(|q| !q.is_empty()));
    Ok(url)
}

/// Copy `headers` without hop-by-hop headers, the headers the `Connection`
/// header names, `host` and `content-length`.
#[must_use]
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let named: HashSet<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lower = name.as_str();
        if HOP_BY_HOP.contains(&lower)
            || named.contains(lower)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Remove the storefront's own session cookie from `Cookie` headers. Headers
/// left without any cookie are dropped; other cookies pass through.
pub fn strip_session_cookie(headers: &mut HeaderMap) {
    let kept: Vec<HeaderValue> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| {
            let pairs: Vec<&str> = value
                .to_str()
                .ok()?
                .split(';')
                .map(str::trim)
                .filter(|pair| !pair.is_empty() && !is_session_pair(pair))
                .collect();
            if pairs.is_empty() {
                return None;
            }
            HeaderValue::from_str(&pairs.join("; ")).ok()
        })
        .collect();

    headers.remove(header::COOKIE);
    for value in kept {
        headers.append(header::COOKIE, value);
    }
}

fn is_session_pair(pair: &str) -> bool {
    pair.split_once('=').map_or(pair, |(name, _)| name).trim() == SESSION_COOKIE_NAME
}

fn is_cors_header(name: &HeaderName) -> bool {
    name.as_str().starts_with("access-control-")
}

/// Relay the request to the upstream API.
#[instrument(skip(state, request_id, request), fields(method = %request.method()))]
pub async fn forward(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response, ProxyError> {
    let url = upstream_url(
        &state.config().api.proxy_upstream,
        &path,
        request.uri().query(),
    )?;

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_PROXY_BODY).await?;

    let mut headers = forwardable_headers(&parts.headers);
    strip_session_cookie(&mut headers);
    if let Some(Extension(RequestId(id))) = request_id
        && let Ok(value) = id.parse()
    {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    tracing::debug!(upstream = %url, "Forwarding request");

    let upstream = state
        .proxy_client()
        .request(parts.method, url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let mut response_headers = forwardable_headers(upstream.headers());
    strip_cors_headers(&mut response_headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

fn strip_cors_headers(headers: &mut HeaderMap) {
    let cors: Vec<HeaderName> = headers.keys().filter(|n| is_cors_header(n)).cloned().collect();
    for name in cors {
        headers.remove(name);
    }
}
