//! Plain-text index projection of the cache.
//!
//! The index file is a list of blocks separated by a blank line. Each block
//! is the prefixed source id on the first line followed by its summary.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::model::{CacheState, SourceType};

/// One rendered index block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IndexEntry {
    pub source_id: String,
    pub description: String,
}

/// Build index blocks grouped by `order`, sorted by source id within each group.
///
/// Records with an empty summary are left out. Source types missing from
/// `order` are not rendered.
pub fn build_index_entries(state: &CacheState, order: &[SourceType], prefix: &str) -> Vec<String> {
    let mut entries = Vec::new();
    for source_type in order {
        // BTreeMap iteration is already sorted by source id.
        for (source_id, record) in &state.sources {
            if record.source_type() != *source_type {
                continue;
            }
            let summary = record.summary_text.trim();
            if summary.is_empty() {
                continue;
            }
            let identifier = format!("{prefix}{source_id}");
            entries.push(format!("{}\n{}", identifier.trim(), summary));
        }
    }
    entries
}

pub fn render_index(entries: &[String]) -> String {
    entries
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parse index file text back into entries.
pub fn parse_index(text: &str) -> Vec<IndexEntry> {
    text.trim()
        .split("\n\n")
        .filter_map(|chunk| {
            let mut lines = chunk.trim().lines();
            let source_id = lines.next()?.trim().to_string();
            if source_id.is_empty() {
                return None;
            }
            let description = lines.collect::<Vec<_>>().join("\n").trim().to_string();
            Some(IndexEntry { source_id, description })
        })
        .collect()
}
