//! Source providers.
//!
//! A provider owns one kind of source. The indexer drives every provider
//! through the same four steps each tick: discover the currently visible
//! sources, build a first record for new ones, refresh metadata for the ones
//! already cached, and load raw text for summarization.

pub mod file_folder;

pub use file_folder::FileFolderProvider;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::Error;
use crate::cache::{CacheRecord, CacheState, SourceType};

/// Current source ids mapped to their type.
pub type Discovered = BTreeMap<String, SourceType>;

/// Capability set every source kind implements.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// The source type this provider renders under in the index file.
    fn source_type(&self) -> SourceType;

    /// Enumerate currently visible sources. Must not touch cache state.
    async fn discover(&self, now: &DateTime<Utc>) -> Result<Discovered, Error>;

    /// Capture baseline content for a newly discovered source.
    ///
    /// The returned record is pending with an empty summary. `None` means the
    /// content could not be captured; the source is retried on a later pass.
    async fn init_record(&self, source_id: &str, now: &DateTime<Utc>) -> Option<CacheRecord>;

    /// Cheaply detect content changes for sources already in `state` and
    /// update their metadata in place. Returns whether anything changed.
    ///
    /// Never summarizes; at most marks records as pending.
    async fn refresh(&self, state: &mut CacheState, now: &DateTime<Utc>) -> Result<bool, Error>;

    /// Current raw text of a source for summarization.
    async fn load_text(&self, source_id: &str) -> Option<String>;

    /// Map a loosely written id from a consumer onto this provider's id form.
    fn normalize_id(&self, source_id: &str) -> String {
        source_id.trim().to_string()
    }
}
