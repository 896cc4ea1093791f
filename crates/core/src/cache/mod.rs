//! JSON-backed knowledge cache.
//!
//! This module provides the persisted per-source state and its plain-text
//! index projection:
//!
//! - Content hashing over canonicalized text (SHA-256)
//! - RFC3339 UTC timestamps
//! - Schema-versioned JSON cache with atomic writes
//! - Deterministic index rendering grouped by source type

pub mod clock;
pub mod hash;
pub mod index;
pub mod model;
pub mod store;

pub use index::{IndexEntry, build_index_entries, parse_index};
pub use model::{CacheRecord, CacheState, FetchStatus, FileMeta, SCHEMA_VERSION, SourceMeta, SourceType, UrlMeta};
