//! Server-side image fallback.
//!
//! `GET /images/resolve?src=<raw reference>` probes the candidate URLs for a
//! stored image path and redirects to the first one that loads, or to the
//! placeholder. Pages use it for clients without JavaScript.

use axum::{
    extract::{Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use crate::state::AppState;

/// Browsers may reuse a resolution for this long.
const RESOLVE_CACHE_CONTROL: &str = "public, max-age=600";

/// Query parameters of the resolve endpoint.
#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    #[serde(default)]
    pub src: Option<String>,
}

/// Redirect to the first loadable candidate for `src`.
#[instrument(skip(state))]
pub async fn resolve(State(state): State<AppState>, Query(query): Query<ResolveQuery>) -> Response {
    let images = state.images();
    let target = match query.src.as_deref().map(str::trim) {
        Some(src) if !src.is_empty() => images.resolve(src).await,
        _ => images.resolver().placeholder().to_string(),
    };

    let mut response = Redirect::temporary(&target).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(RESOLVE_CACHE_CONTROL),
    );
    response
}
