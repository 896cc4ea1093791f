//! Persisted cache state.
//!
//! One [`CacheRecord`] per source, keyed by source id. The record's
//! metadata is a sum type tagged by `source_type`, so a `file` record can
//! never carry URL metadata and vice versa.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::clock::format_rfc3339;

/// Compiled-in schema version. A persisted cache with any other version is discarded.
pub const SCHEMA_VERSION: u32 = 1;

/// Kind of source backing a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    File,
    Url,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::File => "file",
            SourceType::Url => "url",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent network check for a URL source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    NotModified,
    Timeout,
    Error,
}

/// Stat snapshot of a file source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub rel_path: String,
    pub size_bytes: u64,
    pub mtime_ns: i64,
}

/// Fetch bookkeeping for a URL source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMeta {
    pub url: String,
    pub last_fetched_at: String,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    pub fetch_status: FetchStatus,
    pub next_check_at: String,
}

/// Source-specific metadata, tagged by `source_type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "lowercase")]
pub enum SourceMeta {
    File { file: FileMeta },
    Url { url: UrlMeta },
}

impl SourceMeta {
    pub fn source_type(&self) -> SourceType {
        match self {
            SourceMeta::File { .. } => SourceType::File,
            SourceMeta::Url { .. } => SourceType::Url,
        }
    }
}

/// Known state of one source.
///
/// `summary_pending == true` means `content_hash` describes the latest
/// captured content while `summary_text` may be stale or empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub summary_text: String,
    #[serde(default)]
    pub last_indexed_at: String,
    #[serde(default)]
    pub summary_pending: bool,
    #[serde(flatten)]
    pub meta: SourceMeta,

    /// In-memory stamp assigned by [`CacheState::insert`]; never persisted.
    #[serde(skip)]
    generation: u64,
}

impl CacheRecord {
    /// A freshly discovered source whose content has been captured but not summarized.
    pub fn pending(content_hash: String, meta: SourceMeta, now: &DateTime<Utc>) -> Self {
        Self {
            content_hash,
            summary_text: String::new(),
            last_indexed_at: format_rfc3339(now),
            summary_pending: true,
            meta,
            generation: 0,
        }
    }

    pub fn source_type(&self) -> SourceType {
        self.meta.source_type()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn file(&self) -> Option<&FileMeta> {
        match &self.meta {
            SourceMeta::File { file } => Some(file),
            SourceMeta::Url { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&UrlMeta> {
        match &self.meta {
            SourceMeta::Url { url } => Some(url),
            SourceMeta::File { .. } => None,
        }
    }

    pub fn url_mut(&mut self) -> Option<&mut UrlMeta> {
        match &mut self.meta {
            SourceMeta::Url { url } => Some(url),
            SourceMeta::File { .. } => None,
        }
    }
}

/// The whole persisted world for one knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheState {
    pub schema_version: u32,
    pub generated_at: String,
    #[serde(default)]
    pub sources: BTreeMap<String, CacheRecord>,

    #[serde(skip)]
    next_generation: u64,
}

impl CacheState {
    pub fn empty(now: &DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: format_rfc3339(now),
            sources: BTreeMap::new(),
            next_generation: 0,
        }
    }

    /// Insert or replace a record, stamping it with a fresh generation.
    pub fn insert(&mut self, source_id: impl Into<String>, mut record: CacheRecord) -> u64 {
        self.next_generation += 1;
        record.generation = self.next_generation;
        self.sources.insert(source_id.into(), record);
        self.next_generation
    }

    pub fn remove(&mut self, source_id: &str) -> Option<CacheRecord> {
        self.sources.remove(source_id)
    }

    pub fn get(&self, source_id: &str) -> Option<&CacheRecord> {
        self.sources.get(source_id)
    }

    pub fn get_mut(&mut self, source_id: &str) -> Option<&mut CacheRecord> {
        self.sources.get_mut(source_id)
    }

    /// Stamp every record after a decode so generations are unique within this state.
    pub(crate) fn restamp(&mut self) {
        for record in self.sources.values_mut() {
            self.next_generation += 1;
            record.generation = self.next_generation;
        }
    }

    /// Ids and generations of all records awaiting summarization.
    pub fn pending(&self) -> Vec<(String, u64)> {
        self.sources
            .iter()
            .filter(|(_, r)| r.summary_pending)
            .map(|(id, r)| (id.clone(), r.generation))
            .collect()
    }
}
