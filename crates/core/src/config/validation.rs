//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_fetch_bytes` is 0 or exceeds 50MB
    /// - `max_source_bytes` is 0 or exceeds `max_fetch_bytes`
    /// - `fetch_timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - a concurrency limit or tick interval is 0
    /// - `user_agent` or an index prefix is empty, or both indexes share a prefix
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_fetch_bytes == 0 {
            return Err(invalid("max_fetch_bytes", "must be greater than 0"));
        }
        if self.max_fetch_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_fetch_bytes", "must not exceed 50MB"));
        }
        if self.max_source_bytes == 0 {
            return Err(invalid("max_source_bytes", "must be greater than 0"));
        }
        if self.max_source_bytes > self.max_fetch_bytes {
            return Err(invalid("max_source_bytes", "must not exceed max_fetch_bytes"));
        }

        if self.fetch_timeout_ms < 100 {
            return Err(invalid("fetch_timeout_ms", "must be at least 100ms"));
        }
        if self.fetch_timeout_ms > 300_000 {
            return Err(invalid("fetch_timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }
        if self.llm_timeout_ms == 0 {
            return Err(invalid("llm_timeout_ms", "must be greater than 0"));
        }

        if self.refresh_tick_secs == 0 {
            return Err(invalid("refresh_tick_secs", "must be greater than 0"));
        }
        if self.url_download_concurrency == 0 {
            return Err(invalid("url_download_concurrency", "must be greater than 0"));
        }
        if self.summarization_concurrency == 0 {
            return Err(invalid("summarization_concurrency", "must be greater than 0"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.index_prefix.trim().is_empty() {
            return Err(invalid("index_prefix", "must not be empty"));
        }
        if self.team_topics_dir.is_some() {
            if self.team_index_prefix.trim().is_empty() {
                return Err(invalid("team_index_prefix", "must not be empty"));
            }
            if self.team_index_prefix == self.index_prefix {
                return Err(invalid("team_index_prefix", "must differ from index_prefix"));
            }
            if self.team_cache_path == self.cache_path {
                return Err(invalid("team_cache_path", "must differ from cache_path"));
            }
        }

        if self.render_enabled && self.render_settle_ms > 60_000 {
            tracing::warn!(render_settle_ms = self.render_settle_ms, "render settle delay is over a minute");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn field_of(result: Result<(), ConfigError>) -> Option<String> {
        match result {
            Err(ConfigError::Invalid { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_fetch_bytes_zero() {
        let config = AppConfig { max_fetch_bytes: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("max_fetch_bytes"));
    }

    #[test]
    fn test_validate_max_fetch_bytes_exceeds_limit() {
        let config = AppConfig { max_fetch_bytes: 51 * 1024 * 1024, ..Default::default() }; // 51MB
        assert_eq!(field_of(config.validate()).as_deref(), Some("max_fetch_bytes"));
    }

    #[test]
    fn test_validate_source_larger_than_fetch() {
        let config = AppConfig { max_fetch_bytes: 1024, max_source_bytes: 2048, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("max_source_bytes"));
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let config = AppConfig { fetch_timeout_ms: 50, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("fetch_timeout_ms"));

        let config = AppConfig { fetch_timeout_ms: 301_000, ..Default::default() }; // 5min 1sec
        assert_eq!(field_of(config.validate()).as_deref(), Some("fetch_timeout_ms"));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let config = AppConfig { url_download_concurrency: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("url_download_concurrency"));

        let config = AppConfig { summarization_concurrency: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("summarization_concurrency"));
    }

    #[test]
    fn test_validate_zero_tick() {
        let config = AppConfig { refresh_tick_secs: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("refresh_tick_secs"));
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("user_agent"));
    }

    #[test]
    fn test_validate_team_prefix_collision() {
        let config = AppConfig {
            team_topics_dir: Some(PathBuf::from("topics")),
            team_index_prefix: "kb:".into(),
            ..Default::default()
        };
        assert_eq!(field_of(config.validate()).as_deref(), Some("team_index_prefix"));
    }

    #[test]
    fn test_validate_team_prefix_ignored_when_disabled() {
        let config = AppConfig { team_index_prefix: "kb:".into(), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig {
            max_fetch_bytes: 1,
            max_source_bytes: 1,
            fetch_timeout_ms: 100,
            ..Default::default()
        }; // minimum valid values
        assert!(config.validate().is_ok());
    }
}
