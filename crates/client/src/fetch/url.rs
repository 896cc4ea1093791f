//! URL canonicalization and links-file parsing.

use std::collections::BTreeSet;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string for consistent caching.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed.set_host(Some(&host)).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }
    parsed.set_fragment(None);

    Ok(parsed)
}

/// One usable line of a links file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSource {
    /// The trimmed line as written; used as the source id.
    pub source_id: String,
    pub url: url::Url,
}

/// Parse links-file text.
///
/// Blank lines and `#` comments are ignored, repeated lines collapse to the
/// first occurrence, and lines that do not canonicalize are skipped with a
/// warning.
pub fn parse_links(text: &str) -> Vec<LinkSource> {
    let mut seen = BTreeSet::new();
    let mut links = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || !seen.insert(line) {
            continue;
        }
        match canonicalize(line) {
            Ok(url) => links.push(LinkSource { source_id: line.to_string(), url }),
            Err(e) => tracing::warn!(line = lineno + 1, error = %e, "skipping links file entry"),
        }
    }
    links
}
