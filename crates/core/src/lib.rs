//! Core types and engine for kcache.
//!
//! This crate provides:
//! - The JSON source cache and the plain-text index derived from it
//! - The [`SourceProvider`] seam and the file folder provider
//! - The [`Indexer`] tick engine and its background [`RefreshLoop`]
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod enrich;
pub mod error;
pub mod indexer;
pub mod provider;

pub use cache::{CacheRecord, CacheState, FetchStatus, IndexEntry, SourceMeta, SourceType, UrlMeta};
pub use config::{AppConfig, ConfigError};
pub use enrich::{Enricher, compose_system_prompt};
pub use error::Error;
pub use indexer::{Indexer, IndexerConfig, RefreshLoop, TickReport};
pub use provider::{Discovered, FileFolderProvider, SourceProvider};
