//! Content digests for change detection and cache keys.
//!
//! Text is canonicalized before hashing so that line-ending and trailing
//! whitespace churn never registers as a content change.

use sha2::{Digest, Sha256};

/// Canonicalize text for hashing.
///
/// - `\r\n` and lone `\r` become `\n`
/// - trailing whitespace is stripped from every line
/// - leading and trailing blank lines are dropped
pub fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.split('\n').map(str::trim_end).collect();

    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.is_empty()).map_or(start, |i| i + 1);

    lines[start..end].join("\n")
}

/// SHA-256 hex digest of the canonicalized text.
pub fn hash_text(text: &str) -> String {
    let normalized = normalize_text(text);
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Disk-cache key for a fetched URL body.
pub fn url_cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}
