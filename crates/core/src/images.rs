//! Image reference resolution and load-failure fallback.
//!
//! Book images come back from the API in several shapes: absolute URLs,
//! paths relative to one of the media hosts (`books/dune.jpg`,
//! `/media/books/dune.jpg`), bare filenames (`dune.jpg`), and sometimes a host
//! and prefix without a scheme (`api.bookswap.example/media/books/dune.jpg`).
//! Which media host actually serves a given file is not known up front.
//!
//! [`ImageResolver`] turns one reference into a deterministic, finite,
//! de-duplicated list of candidate URLs. [`ImageFallback`] is the state
//! machine an image element drives through that list: every load error moves
//! to the next candidate, and once the list is exhausted the placeholder is
//! shown for good.
//!
//! # Example
//!
//! ```rust
//! use bookswap_core::images::{ImageResolver, MediaBase};
//!
//! let resolver = ImageResolver::new(
//!     vec![
//!         MediaBase::parse("https://api.bookswap.example/media/").unwrap(),
//!         MediaBase::parse("https://cdn.bookswap.example/uploads/").unwrap(),
//!     ],
//!     "/static/img/placeholder.svg",
//! );
//!
//! let candidates = resolver.candidates(Some("books/dune.jpg"));
//! assert_eq!(
//!     candidates.as_slice(),
//!     [
//!         "https://api.bookswap.example/media/books/dune.jpg",
//!         "https://cdn.bookswap.example/uploads/books/dune.jpg",
//!         "https://api.bookswap.example/media/dune.jpg",
//!         "https://cdn.bookswap.example/uploads/dune.jpg",
//!     ]
//! );
//! ```

use std::future::Future;

use thiserror::Error;
use url::Url;

/// Placeholder shown when no candidate loads.
pub const DEFAULT_PLACEHOLDER: &str = "/static/img/placeholder.svg";

/// Errors building a [`MediaBase`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("invalid media base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("media base must use http or https, got '{0}'")]
    UnsupportedScheme(String),
    #[error("media base must have a host")]
    MissingHost,
}

/// A known host plus path prefix under which the backend serves images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBase {
    /// Absolute URL, always ending in `/`.
    url: String,
    /// `host[:port]/path/` without the scheme, used to recognise references
    /// that embed this base.
    authority_path: String,
    /// Path prefix without the leading slash (`media/`), empty for a root base.
    path_prefix: String,
}

impl MediaBase {
    /// Parse a base such as `https://api.bookswap.example/media`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not an absolute http(s) URL with a host.
    pub fn parse(input: &str) -> Result<Self, ImageError> {
        let mut url = Url::parse(input.trim())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ImageError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url.host_str().ok_or(ImageError::MissingHost)?.to_string();
        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let authority = url
            .port()
            .map_or_else(|| host.clone(), |port| format!("{host}:{port}"));
        let path_prefix = url.path().trim_start_matches('/').to_string();

        Ok(Self {
            authority_path: format!("{authority}/{path_prefix}"),
            path_prefix,
            url: url.to_string(),
        })
    }

    /// The base URL, ending in `/`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    fn join(&self, key: &str) -> String {
        format!("{}{}", self.url, key.trim_start_matches('/'))
    }

    /// Strip this base from a scheme-less reference.
    fn strip_embedded<'a>(&self, reference: &'a str) -> Option<&'a str> {
        reference.strip_prefix(self.authority_path.as_str())
    }

    /// Strip this base's path prefix from a relative path.
    fn strip_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.path_prefix.is_empty() {
            return None;
        }
        path.strip_prefix(self.path_prefix.as_str())
    }
}

/// Classified image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// No usable reference (`None`, empty, `"null"`, `"undefined"`).
    Absent,
    /// Absolute `http(s)` URL.
    Absolute(String),
    /// Path below a media base, without a leading slash.
    Relative(String),
    /// Bare filename.
    Filename(String),
}

/// Ordered candidate URLs for one reference.
///
/// Finite and deterministic for the same input and resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Candidates(Vec<String>);

impl Candidates {
    fn push_unique(&mut self, url: String) {
        if !self.0.contains(&url) {
            self.0.push(url);
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

impl IntoIterator for Candidates {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Builds candidate sequences from the configured media bases.
#[derive(Debug, Clone)]
pub struct ImageResolver {
    bases: Vec<MediaBase>,
    placeholder: String,
}

impl ImageResolver {
    /// Create a resolver. Bases are tried in the given order.
    #[must_use]
    pub fn new(bases: Vec<MediaBase>, placeholder: impl Into<String>) -> Self {
        Self {
            bases,
            placeholder: placeholder.into(),
        }
    }

    #[must_use]
    pub fn bases(&self) -> &[MediaBase] {
        &self.bases
    }

    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Classify a raw reference.
    #[must_use]
    pub fn parse(&self, raw: Option<&str>) -> ImageRef {
        let Some(reference) = raw.map(str::trim) else {
            return ImageRef::Absent;
        };
        if is_absent(reference) {
            return ImageRef::Absent;
        }

        if let Some(rest) = reference.strip_prefix("//") {
            return ImageRef::Absolute(format!("https://{rest}"));
        }
        if has_http_scheme(reference) {
            return ImageRef::Absolute(reference.to_string());
        }

        if let Some(rest) = self
            .bases
            .iter()
            .find_map(|base| base.strip_embedded(reference))
        {
            return classify_path(rest);
        }

        let path = reference.trim_start_matches("./").trim_start_matches('/');
        if let Some(rest) = self.bases.iter().find_map(|base| base.strip_prefix(path)) {
            return classify_path(rest);
        }
        classify_path(path)
    }

    /// Candidate URLs for a raw reference.
    ///
    /// Order: the absolute reference itself, then the path below a known base
    /// joined onto every base, then the bare filename joined onto every base.
    /// An absent reference yields no candidates.
    #[must_use]
    pub fn candidates(&self, raw: Option<&str>) -> Candidates {
        let mut out = Candidates::default();
        match self.parse(raw) {
            ImageRef::Absent => {}
            ImageRef::Absolute(url) => {
                let key = self.key_for_absolute(&url);
                out.push_unique(url);
                if let Some(key) = key {
                    self.push_keyed(&mut out, &key);
                }
            }
            ImageRef::Relative(key) => self.push_keyed(&mut out, &key),
            ImageRef::Filename(name) => {
                for base in &self.bases {
                    out.push_unique(base.join(&name));
                }
            }
        }
        out
    }

    /// Fallback state machine for a raw reference.
    #[must_use]
    pub fn fallback(&self, raw: Option<&str>) -> ImageFallback {
        ImageFallback::new(self.candidates(raw), self.placeholder.clone())
    }

    /// Like [`ImageResolver::fallback`], restricted to candidates under a
    /// configured media base.
    ///
    /// Server-side resolution only ever fetches, or redirects to, these.
    #[must_use]
    pub fn media_fallback(&self, raw: Option<&str>) -> ImageFallback {
        let mut media = Candidates::default();
        for url in self.candidates(raw) {
            if let Some(url) = self.media_url(&url) {
                media.push_unique(url);
            }
        }
        ImageFallback::new(media, self.placeholder.clone())
    }

    /// `url` after normalization (dot segments, percent-encoded dots), if it
    /// lies under one of the media bases.
    #[must_use]
    pub fn media_url(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let normalized = parsed.as_str();
        self.bases
            .iter()
            .any(|base| normalized.starts_with(base.as_str()))
            .then(|| normalized.to_string())
    }

    fn push_keyed(&self, out: &mut Candidates, key: &str) {
        for base in &self.bases {
            out.push_unique(base.join(key));
        }
        let name = filename(key);
        if !name.is_empty() {
            for base in &self.bases {
                out.push_unique(base.join(name));
            }
        }
    }

    /// Path of an absolute URL relative to a media base, if it has one.
    fn key_for_absolute(&self, absolute: &str) -> Option<String> {
        let url = Url::parse(absolute).ok()?;
        let without_scheme = absolute.split_once("://").map_or(absolute, |(_, rest)| rest);
        if let Some(rest) = self
            .bases
            .iter()
            .find_map(|base| base.strip_embedded(without_scheme))
        {
            return Some(strip_query(rest).to_string());
        }

        let path = url.path().trim_start_matches('/');
        if path.is_empty() {
            return None;
        }
        let key = self
            .bases
            .iter()
            .find_map(|base| base.strip_prefix(path))
            .unwrap_or(path);
        Some(key.to_string())
    }
}

fn is_absent(reference: &str) -> bool {
    reference.is_empty()
        || reference.eq_ignore_ascii_case("null")
        || reference.eq_ignore_ascii_case("undefined")
}

fn has_http_scheme(reference: &str) -> bool {
    let lower = reference.get(..8).unwrap_or(reference).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn classify_path(path: &str) -> ImageRef {
    let path = strip_query(path.trim_start_matches('/'));
    if path.is_empty() {
        ImageRef::Absent
    } else if path.contains('/') {
        ImageRef::Relative(path.to_string())
    } else {
        ImageRef::Filename(path.to_string())
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

fn filename(path: &str) -> &str {
    strip_query(path).rsplit('/').next().unwrap_or_default()
}

// =============================================================================
// Fallback state machine
// =============================================================================

/// Where an [`ImageFallback`] currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    /// Waiting for the candidate at this index to load.
    Trying(usize),
    /// The candidate at this index loaded.
    Loaded(usize),
    /// All candidates failed (or there were none). Terminal.
    Placeholder,
}

/// Result of feeding a load error into an [`ImageFallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moved on to the next candidate.
    Next,
    /// The last candidate failed; switched to the placeholder.
    Exhausted,
    /// Nothing changed (already loaded or already on the placeholder).
    Unchanged,
}

/// Outcome of [`ImageFallback::resolve_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A candidate loaded.
    Candidate(String),
    /// Nothing loaded; the placeholder should be shown.
    Placeholder(String),
}

impl Resolution {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Candidate(url) | Self::Placeholder(url) => url,
        }
    }
}

/// Checks whether an image URL loads.
pub trait ImageProbe {
    /// Returns `true` if `url` serves an image.
    fn exists(&self, url: &str) -> impl Future<Output = bool> + Send;
}

/// Drives one image element through its candidate sequence.
///
/// The sequence is consumed strictly forward and never restarts.
#[derive(Debug, Clone)]
pub struct ImageFallback {
    candidates: Vec<String>,
    placeholder: String,
    state: FallbackState,
}

impl ImageFallback {
    /// Start at the first candidate, or directly on the placeholder if there
    /// are none.
    #[must_use]
    pub fn new(candidates: Candidates, placeholder: impl Into<String>) -> Self {
        let candidates = candidates.0;
        let state = if candidates.is_empty() {
            FallbackState::Placeholder
        } else {
            FallbackState::Trying(0)
        };
        Self {
            candidates,
            placeholder: placeholder.into(),
            state,
        }
    }

    #[must_use]
    pub const fn state(&self) -> FallbackState {
        self.state
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.state == FallbackState::Placeholder
    }

    /// URL the element should display right now.
    #[must_use]
    pub fn current(&self) -> &str {
        match self.state {
            FallbackState::Trying(i) | FallbackState::Loaded(i) => self
                .candidates
                .get(i)
                .map_or(self.placeholder.as_str(), String::as_str),
            FallbackState::Placeholder => &self.placeholder,
        }
    }

    /// Candidates not yet tried, in order.
    #[must_use]
    pub fn remaining(&self) -> &[String] {
        match self.state {
            FallbackState::Trying(i) => self.candidates.get(i + 1..).unwrap_or_default(),
            FallbackState::Loaded(_) | FallbackState::Placeholder => &[],
        }
    }

    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// The current candidate failed to load.
    pub fn on_error(&mut self) -> Transition {
        match self.state {
            FallbackState::Trying(i) if i + 1 < self.candidates.len() => {
                self.state = FallbackState::Trying(i + 1);
                Transition::Next
            }
            FallbackState::Trying(_) => {
                self.state = FallbackState::Placeholder;
                Transition::Exhausted
            }
            FallbackState::Loaded(_) | FallbackState::Placeholder => Transition::Unchanged,
        }
    }

    /// The current candidate loaded.
    pub fn on_load(&mut self) {
        if let FallbackState::Trying(i) = self.state {
            self.state = FallbackState::Loaded(i);
        }
    }

    /// Walk the sequence with `probe`, one probe per candidate, and return the
    /// first that loads. The placeholder is returned without probing when
    /// there are no candidates.
    pub async fn resolve_with<P>(mut self, probe: &P) -> Resolution
    where
        P: ImageProbe + Sync,
    {
        loop {
            match self.state {
                FallbackState::Trying(_) => {
                    if probe.exists(self.current()).await {
                        self.on_load();
                    } else {
                        self.on_error();
                    }
                }
                FallbackState::Loaded(_) => return Resolution::Candidate(self.current().to_string()),
                FallbackState::Placeholder => return Resolution::Placeholder(self.placeholder),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    const API: &str = "https://api.bookswap.example/media/";
    const CDN: &str = "https://cdn.bookswap.example/uploads/";

    fn resolver() -> ImageResolver {
        ImageResolver::new(
            vec![MediaBase::parse(API).unwrap(), MediaBase::parse(CDN).unwrap()],
            DEFAULT_PLACEHOLDER,
        )
    }

    /// Probe that answers from a fixed set and records every URL it was asked about.
    struct FakeProbe {
        available: Vec<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl FakeProbe {
        fn new(available: Vec<&'static str>) -> Self {
            Self {
                available,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl ImageProbe for FakeProbe {
        async fn exists(&self, url: &str) -> bool {
            self.seen.lock().unwrap().push(url.to_string());
            self.available.contains(&url)
        }
    }

    #[test]
    fn test_media_base_normalizes_trailing_slash() {
        let base = MediaBase::parse("https://api.bookswap.example/media").unwrap();
        assert_eq!(base.as_str(), API);
    }

    #[test]
    fn test_media_base_rejects_other_schemes() {
        assert_eq!(
            MediaBase::parse("ftp://files.bookswap.example/"),
            Err(ImageError::UnsupportedScheme("ftp".to_string()))
        );
        assert!(MediaBase::parse("not a url").is_err());
    }

    #[test]
    fn test_absent_references() {
        let r = resolver();
        for raw in [None, Some(""), Some("   "), Some("null"), Some("NULL"), Some("undefined")] {
            assert_eq!(r.parse(raw), ImageRef::Absent, "{raw:?}");
            assert!(r.candidates(raw).is_empty());
        }
    }

    #[test]
    fn test_parse_classifies_references() {
        let r = resolver();
        assert_eq!(
            r.parse(Some("https://images.example.org/a.jpg")),
            ImageRef::Absolute("https://images.example.org/a.jpg".to_string())
        );
        assert_eq!(
            r.parse(Some("//images.example.org/a.jpg")),
            ImageRef::Absolute("https://images.example.org/a.jpg".to_string())
        );
        assert_eq!(
            r.parse(Some("/media/books/a.jpg")),
            ImageRef::Relative("books/a.jpg".to_string())
        );
        assert_eq!(
            r.parse(Some("api.bookswap.example/media/books/a.jpg")),
            ImageRef::Relative("books/a.jpg".to_string())
        );
        assert_eq!(
            r.parse(Some("a.jpg?v=2")),
            ImageRef::Filename("a.jpg".to_string())
        );
    }

    #[test]
    fn test_filename_tries_every_base_in_order() {
        let c = resolver().candidates(Some("dune.jpg"));
        assert_eq!(c.as_slice(), [format!("{API}dune.jpg"), format!("{CDN}dune.jpg")]);
    }

    #[test]
    fn test_absolute_under_known_base_tries_itself_first() {
        let c = resolver().candidates(Some("https://api.bookswap.example/media/books/dune.jpg"));
        assert_eq!(
            c.as_slice(),
            [
                format!("{API}books/dune.jpg"),
                format!("{CDN}books/dune.jpg"),
                format!("{API}dune.jpg"),
                format!("{CDN}dune.jpg"),
            ]
        );
    }

    #[test]
    fn test_absolute_on_foreign_host_keeps_its_path() {
        let c = resolver().candidates(Some("http://old-host.example/uploads/books/dune.jpg"));
        assert_eq!(c.first(), Some("http://old-host.example/uploads/books/dune.jpg"));
        assert_eq!(c.as_slice()[1], format!("{API}books/dune.jpg"));
        assert!(c.as_slice().contains(&format!("{CDN}dune.jpg")));
    }

    #[test]
    fn test_media_fallback_drops_foreign_hosts() {
        let fb = resolver().media_fallback(Some("http://169.254.169.254/latest/meta-data/iam.png"));
        assert_eq!(fb.current(), format!("{API}latest/meta-data/iam.png"));
        assert!(
            fb.remaining()
                .iter()
                .all(|url| url.starts_with(API) || url.starts_with(CDN))
        );

        let fb = resolver().media_fallback(Some("http://127.0.0.1:8080/"));
        assert!(fb.is_placeholder());
    }

    #[test]
    fn test_media_url_normalizes_before_matching() {
        let r = resolver();
        assert_eq!(
            r.media_url("https://api.bookswap.example/media/books/./dune.jpg").as_deref(),
            Some("https://api.bookswap.example/media/books/dune.jpg")
        );
        assert_eq!(r.media_url("https://api.bookswap.example/media/../admin/x.png"), None);
        assert_eq!(r.media_url("https://api.bookswap.example/media/%2e%2e/admin/x.png"), None);
        assert_eq!(r.media_url("https://api.bookswap.example@evil.example/media/x.png"), None);
        assert_eq!(r.media_url("https://api.bookswap.example.evil.example/media/x.png"), None);
        assert_eq!(r.media_url("not a url"), None);
    }

    #[test]
    fn test_candidates_are_deterministic_and_unique() {
        let r = resolver();
        let raw = Some("/uploads/books/2024/emma.png");
        let first = r.candidates(raw);
        let second = r.candidates(raw);
        assert_eq!(first, second);

        let mut deduped = first.as_slice().to_vec();
        deduped.dedup();
        assert_eq!(deduped.len(), first.len());
    }

    #[test]
    fn test_fallback_walks_forward_then_pins_placeholder() {
        let mut fb = resolver().fallback(Some("dune.jpg"));
        assert_eq!(fb.current(), format!("{API}dune.jpg"));
        assert_eq!(fb.remaining(), [format!("{CDN}dune.jpg")]);

        assert_eq!(fb.on_error(), Transition::Next);
        assert_eq!(fb.current(), format!("{CDN}dune.jpg"));

        assert_eq!(fb.on_error(), Transition::Exhausted);
        assert!(fb.is_placeholder());
        assert_eq!(fb.current(), DEFAULT_PLACEHOLDER);

        for _ in 0..3 {
            assert_eq!(fb.on_error(), Transition::Unchanged);
            assert_eq!(fb.state(), FallbackState::Placeholder);
        }
    }

    #[test]
    fn test_fallback_for_absent_starts_on_placeholder() {
        let mut fb = resolver().fallback(Some("undefined"));
        assert!(fb.is_placeholder());
        assert_eq!(fb.on_error(), Transition::Unchanged);
        assert!(fb.remaining().is_empty());
    }

    #[test]
    fn test_loaded_candidate_is_pinned() {
        let mut fb = resolver().fallback(Some("dune.jpg"));
        fb.on_load();
        assert_eq!(fb.state(), FallbackState::Loaded(0));
        assert_eq!(fb.on_error(), Transition::Unchanged);
        assert_eq!(fb.current(), format!("{API}dune.jpg"));
    }

    #[tokio::test]
    async fn test_resolve_with_stops_at_first_hit() {
        let probe = FakeProbe::new(vec!["https://cdn.bookswap.example/uploads/books/dune.jpg"]);
        let resolution = resolver()
            .fallback(Some("books/dune.jpg"))
            .resolve_with(&probe)
            .await;

        assert_eq!(
            resolution,
            Resolution::Candidate(format!("{CDN}books/dune.jpg"))
        );
        assert_eq!(probe.seen(), [format!("{API}books/dune.jpg"), format!("{CDN}books/dune.jpg")]);
    }

    #[tokio::test]
    async fn test_resolve_with_exhausts_to_placeholder() {
        let probe = FakeProbe::new(vec![]);
        let resolution = resolver().fallback(Some("dune.jpg")).resolve_with(&probe).await;
        assert_eq!(resolution, Resolution::Placeholder(DEFAULT_PLACEHOLDER.to_string()));
        assert_eq!(probe.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_absent_never_probes() {
        let probe = FakeProbe::new(vec![]);
        let resolution = resolver().fallback(Some("null")).resolve_with(&probe).await;
        assert_eq!(resolution.url(), DEFAULT_PLACEHOLDER);
        assert!(probe.seen().is_empty());
    }
}
