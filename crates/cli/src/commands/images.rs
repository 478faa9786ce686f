//! Image resolution diagnostics.
//!
//! Shows how the storefront turns a stored image reference into candidate
//! URLs, and which of them actually load.
//!
//! # Usage
//!
//! ```bash
//! # List candidate URLs in the order they are tried
//! bookswap images candidates books/dune.jpg
//!
//! # Probe every candidate with HEAD and report the winner
//! bookswap images probe books/dune.jpg
//! ```
//!
//! Media bases come from the same environment as the storefront
//! (`BOOKSWAP_MEDIA_BASES`, or the defaults derived from `BOOKSWAP_API_URL`).

use bookswap_core::images::{ImageProbe, ImageRef, ImageResolver, Resolution};
use bookswap_storefront::config::{ConfigError, StorefrontConfig};
use bookswap_storefront::services::images::HttpProbe;
use thiserror::Error;

/// Errors that can occur while inspecting images.
#[derive(Debug, Error)]
pub enum ImagesError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

fn resolver() -> Result<ImageResolver, ImagesError> {
    let config = StorefrontConfig::from_env()?;
    Ok(ImageResolver::new(config.media.bases, config.media.placeholder))
}

/// Human-readable classification of a reference.
fn describe(reference: &ImageRef) -> String {
    match reference {
        ImageRef::Absent => "absent (placeholder only)".to_string(),
        ImageRef::Absolute(url) => format!("absolute URL {url}"),
        ImageRef::Relative(path) => format!("path below a media base: {path}"),
        ImageRef::Filename(name) => format!("bare filename: {name}"),
    }
}

/// Candidate report lines for `reference`, numbered from 1.
fn candidate_lines(resolver: &ImageResolver, reference: &str) -> Vec<String> {
    let mut lines = vec![format!(
        "Reference: {}",
        describe(&resolver.parse(Some(reference)))
    )];
    let candidates = resolver.candidates(Some(reference));
    if candidates.is_empty() {
        lines.push(format!("No candidates; shows {}", resolver.placeholder()));
    }
    lines.extend(
        candidates
            .into_iter()
            .enumerate()
            .map(|(i, url)| format!("{:>3}. {url}", i + 1)),
    );
    lines
}

/// Print the candidate URLs for `reference`.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded.
pub fn candidates(reference: &str) -> Result<(), ImagesError> {
    let resolver = resolver()?;

    #[allow(clippy::print_stdout)]
    for line in candidate_lines(&resolver, reference) {
        println!("{line}");
    }
    Ok(())
}

/// Probe every candidate for `reference` and print the one that loads.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the HTTP client
/// cannot be built.
pub async fn probe(reference: &str) -> Result<(), ImagesError> {
    let resolver = resolver()?;
    let probe = HttpProbe::new()?;

    #[allow(clippy::print_stdout)]
    {
        for url in resolver.candidates(Some(reference)) {
            let status = if probe.exists(&url).await { "ok" } else { "missing" };
            println!("{status:>8}  {url}");
        }

        match resolver.fallback(Some(reference)).resolve_with(&probe).await {
            Resolution::Candidate(url) => println!("Resolved: {url}"),
            Resolution::Placeholder(url) => println!("Nothing loads; placeholder: {url}"),
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use bookswap_core::images::{DEFAULT_PLACEHOLDER, MediaBase};

    use super::*;

    fn resolver() -> ImageResolver {
        ImageResolver::new(
            vec![
                MediaBase::parse("https://api.bookswap.example/media/").unwrap(),
                MediaBase::parse("https://cdn.bookswap.example/uploads/").unwrap(),
            ],
            DEFAULT_PLACEHOLDER,
        )
    }

    #[test]
    fn test_candidate_lines_are_numbered_in_order() {
        let lines = candidate_lines(&resolver(), "dune.jpg");
        assert_eq!(lines[0], "Reference: bare filename: dune.jpg");
        assert_eq!(lines[1], "  1. https://api.bookswap.example/media/dune.jpg");
        assert_eq!(lines[2], "  2. https://cdn.bookswap.example/uploads/dune.jpg");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_absent_reference_mentions_placeholder() {
        let lines = candidate_lines(&resolver(), "null");
        assert_eq!(lines[0], "Reference: absent (placeholder only)");
        assert!(lines[1].contains(DEFAULT_PLACEHOLDER));
    }
}
