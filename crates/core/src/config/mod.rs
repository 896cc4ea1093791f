//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (KCACHE_*)
//! 2. TOML config file (if KCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::indexer::IndexerConfig;

mod validation;

pub use validation::ConfigError;

const DEFAULT_SUMMARIZATION_PROMPT: &str = "Summarize the following document in two or three sentences. \
Describe what questions it can answer so a retrieval step can decide whether to read it in full. \
Reply with the summary only.";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (KCACHE_*)
/// 2. TOML config file (if KCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory of file sources for the main knowledge base.
    #[serde(default = "default_sources_dir")]
    pub sources_dir: PathBuf,

    /// Newline-separated list of URL sources.
    #[serde(default = "default_links_file")]
    pub links_file: PathBuf,

    /// JSON cache file of the main knowledge base.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Plain-text index file of the main knowledge base.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Topic files captured from team Q&A. The team knowledge base is
    /// disabled when unset.
    #[serde(default)]
    pub team_topics_dir: Option<PathBuf>,

    #[serde(default = "default_team_cache_path")]
    pub team_cache_path: PathBuf,

    #[serde(default = "default_team_index_path")]
    pub team_index_path: PathBuf,

    #[serde(default = "default_team_index_prefix")]
    pub team_index_prefix: String,

    /// Disk cache of cleaned page bodies, keyed by URL digest.
    #[serde(default = "default_web_cache_dir")]
    pub web_cache_dir: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via KCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for URL fetches and conditional requests in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum raw response size per request.
    #[serde(default = "default_max_fetch_bytes")]
    pub max_fetch_bytes: usize,

    /// Maximum cleaned page size; larger pages are treated as failed fetches.
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,

    /// Whether pages are rendered in a headless browser before cleaning.
    #[serde(default)]
    pub render_enabled: bool,

    /// Quiet period after navigation before the rendered DOM is read.
    #[serde(default = "default_render_settle_ms")]
    pub render_settle_ms: u64,

    /// How long a successfully checked URL waits before its next check.
    #[serde(default = "default_url_refresh_interval_secs")]
    pub url_refresh_interval_secs: u64,

    /// Cadence of background ticks; also the retry delay for failed URL checks.
    #[serde(default = "default_refresh_tick_secs")]
    pub refresh_tick_secs: u64,

    #[serde(default = "default_url_download_concurrency")]
    pub url_download_concurrency: usize,

    #[serde(default = "default_summarization_concurrency")]
    pub summarization_concurrency: usize,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    #[serde(default)]
    pub llm_api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: u64,

    #[serde(default = "default_summarization_prompt")]
    pub summarization_prompt: String,

    #[serde(default)]
    pub project_introduction: String,
}

fn default_sources_dir() -> PathBuf {
    PathBuf::from("data/knowledge-base/sources")
}

fn default_links_file() -> PathBuf {
    PathBuf::from("data/knowledge-base/links.txt")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data/knowledge-base/index-cache.json")
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/knowledge-base/index.txt")
}

fn default_index_prefix() -> String {
    "kb:".into()
}

fn default_team_cache_path() -> PathBuf {
    PathBuf::from("data/team-knowledge/index-cache.json")
}

fn default_team_index_path() -> PathBuf {
    PathBuf::from("data/team-knowledge/index.txt")
}

fn default_team_index_prefix() -> String {
    "team:".into()
}

fn default_web_cache_dir() -> PathBuf {
    PathBuf::from("data/knowledge-base/web-cache")
}

fn default_user_agent() -> String {
    "kcache/0.1".into()
}

fn default_fetch_timeout_ms() -> u64 {
    20_000
}

fn default_max_fetch_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_max_source_bytes() -> usize {
    1_048_576
}

fn default_render_settle_ms() -> u64 {
    1_500
}

fn default_url_refresh_interval_secs() -> u64 {
    86_400
}

fn default_refresh_tick_secs() -> u64 {
    300
}

fn default_url_download_concurrency() -> usize {
    4
}

fn default_summarization_concurrency() -> usize {
    2
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".into()
}

fn default_llm_model() -> String {
    "llama3.1".into()
}

fn default_llm_timeout_ms() -> u64 {
    120_000
}

fn default_summarization_prompt() -> String {
    DEFAULT_SUMMARIZATION_PROMPT.into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources_dir: default_sources_dir(),
            links_file: default_links_file(),
            cache_path: default_cache_path(),
            index_path: default_index_path(),
            index_prefix: default_index_prefix(),
            team_topics_dir: None,
            team_cache_path: default_team_cache_path(),
            team_index_path: default_team_index_path(),
            team_index_prefix: default_team_index_prefix(),
            web_cache_dir: default_web_cache_dir(),
            user_agent: default_user_agent(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_fetch_bytes: default_max_fetch_bytes(),
            max_source_bytes: default_max_source_bytes(),
            render_enabled: false,
            render_settle_ms: default_render_settle_ms(),
            url_refresh_interval_secs: default_url_refresh_interval_secs(),
            refresh_tick_secs: default_refresh_tick_secs(),
            url_download_concurrency: default_url_download_concurrency(),
            summarization_concurrency: default_summarization_concurrency(),
            llm_base_url: default_llm_base_url(),
            llm_api_key: None,
            llm_model: default_llm_model(),
            llm_timeout_ms: default_llm_timeout_ms(),
            summarization_prompt: default_summarization_prompt(),
            project_introduction: String::new(),
        }
    }
}

impl AppConfig {
    /// Fetch timeout as Duration for use with reqwest/tokio.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn url_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.url_refresh_interval_secs)
    }

    pub fn refresh_tick(&self) -> Duration {
        Duration::from_secs(self.refresh_tick_secs)
    }

    /// Indexer settings for the main knowledge base.
    pub fn kb_indexer(&self) -> IndexerConfig {
        IndexerConfig {
            cache_path: self.cache_path.clone(),
            index_path: self.index_path.clone(),
            index_prefix: self.index_prefix.clone(),
            summarization_prompt: self.summarization_prompt.clone(),
            project_introduction: self.project_introduction.clone(),
            summarization_concurrency: self.summarization_concurrency,
        }
    }

    /// Indexer settings for the team knowledge base, if enabled.
    pub fn team_indexer(&self) -> Option<IndexerConfig> {
        self.team_topics_dir.as_ref().map(|_| IndexerConfig {
            cache_path: self.team_cache_path.clone(),
            index_path: self.team_index_path.clone(),
            index_prefix: self.team_index_prefix.clone(),
            summarization_prompt: self.summarization_prompt.clone(),
            project_introduction: self.project_introduction.clone(),
            summarization_concurrency: self.summarization_concurrency,
        })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `KCACHE_`
    /// 2. TOML file from `KCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("KCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("KCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
