//! URL sources listed in a links file.
//!
//! Each eligible URL (its `next_check_at` has passed or cannot be parsed) is
//! checked with a conditional GET. A `304` only pushes the next check out; a
//! `200` re-fetches and re-hashes the page; anything else reschedules the
//! check after the shorter retry delay. Every network operation holds a
//! permit from the download semaphore.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::join_all;
use tokio::sync::{RwLock, Semaphore};
use url::Url;

use kcache_core::cache::clock::{format_rfc3339, parse_rfc3339};
use kcache_core::cache::hash::hash_text;
use kcache_core::{
    AppConfig, CacheRecord, CacheState, Discovered, Error, FetchStatus, SourceMeta, SourceProvider, SourceType, UrlMeta,
};

use crate::fetch::{Validation, canonicalize, parse_links};
use crate::web_fetcher::WebFetcher;

/// Scheduling and concurrency knobs for [`UrlLinksProvider`].
#[derive(Debug, Clone)]
pub struct UrlLinksConfig {
    pub links_file: PathBuf,
    /// Delay before a successfully checked URL is checked again.
    pub refresh_interval: Duration,
    /// Delay before a failed check is retried.
    pub retry_delay: Duration,
    pub download_concurrency: usize,
}

impl From<&AppConfig> for UrlLinksConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            links_file: config.links_file.clone(),
            refresh_interval: config.url_refresh_interval(),
            retry_delay: config.refresh_tick(),
            download_concurrency: config.url_download_concurrency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CheckOutcome {
    NotModified,
    Updated { content_hash: String, etag: Option<String>, last_modified: Option<String> },
    Failed(FetchStatus),
}

pub struct UrlLinksProvider {
    name: String,
    config: UrlLinksConfig,
    fetcher: Arc<WebFetcher>,
    downloads: Semaphore,
    urls: RwLock<BTreeMap<String, Url>>,
}

fn after(now: &DateTime<Utc>, delay: Duration) -> String {
    let delta = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
    format_rfc3339(&now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC))
}

fn is_due(meta: &UrlMeta, now: &DateTime<Utc>) -> bool {
    parse_rfc3339(&meta.next_check_at).is_none_or(|next| next <= *now)
}

fn failure_status(err: &Error) -> FetchStatus {
    if err.is_timeout() { FetchStatus::Timeout } else { FetchStatus::Error }
}

impl UrlLinksProvider {
    pub fn new(name: impl Into<String>, config: UrlLinksConfig, fetcher: Arc<WebFetcher>) -> Self {
        let permits = config.download_concurrency.max(1);
        Self { name: name.into(), config, fetcher, downloads: Semaphore::new(permits), urls: RwLock::new(BTreeMap::new()) }
    }

    async fn fetch_limited(&self, url: &Url, force_refresh: bool) -> Result<String, Error> {
        let _permit = self.downloads.acquire().await.map_err(|e| Error::HttpError(e.to_string()))?;
        self.fetcher.fetch(url, force_refresh).await
    }

    async fn conditional_limited(
        &self, url: &Url, etag: Option<&str>, last_modified: Option<&str>,
    ) -> Result<Validation, Error> {
        let _permit = self.downloads.acquire().await.map_err(|e| Error::HttpError(e.to_string()))?;
        self.fetcher.client().conditional_get(url, etag, last_modified).await
    }

    /// Validators from an unconditional probe, so the first refresh can be conditional.
    async fn probe_validators(&self, url: &Url) -> (Option<String>, Option<String>) {
        match self.conditional_limited(url, None, None).await {
            Ok(v) if v.is_ok() => (v.etag, v.last_modified),
            Ok(v) => {
                tracing::debug!(url = %url, status = v.status, "validator probe returned no validators");
                (None, None)
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "validator probe failed");
                (None, None)
            }
        }
    }

    async fn check(
        &self, source_id: &str, url: &Url, etag: Option<&str>, last_modified: Option<&str>,
    ) -> CheckOutcome {
        let validation = match self.conditional_limited(url, etag, last_modified).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(source_id, url = %url, error = %e, "URL refresh request failed");
                return CheckOutcome::Failed(failure_status(&e));
            }
        };

        if validation.is_not_modified() {
            return CheckOutcome::NotModified;
        }
        if !validation.is_ok() {
            tracing::warn!(source_id, url = %url, status = validation.status, "unexpected URL refresh status");
            return CheckOutcome::Failed(FetchStatus::Error);
        }

        match self.fetch_limited(url, true).await {
            Ok(text) => CheckOutcome::Updated {
                content_hash: hash_text(&text),
                etag: validation.etag,
                last_modified: validation.last_modified,
            },
            Err(e) => {
                tracing::warn!(source_id, url = %url, error = %e, "failed to fetch URL content during refresh");
                CheckOutcome::Failed(failure_status(&e))
            }
        }
    }

    fn apply(&self, record: &mut CacheRecord, outcome: CheckOutcome, now: &DateTime<Utc>) {
        let resummarize = match &outcome {
            CheckOutcome::Updated { content_hash, .. } => {
                *content_hash != record.content_hash
                    || record.summary_pending
                    || record.summary_text.trim().is_empty()
            }
            _ => false,
        };

        let Some(meta) = record.url_mut() else {
            return;
        };
        match outcome {
            CheckOutcome::NotModified => {
                meta.fetch_status = FetchStatus::NotModified;
                meta.last_fetched_at = format_rfc3339(now);
                meta.next_check_at = after(now, self.config.refresh_interval);
            }
            CheckOutcome::Updated { content_hash, etag, last_modified } => {
                meta.etag = etag;
                meta.last_modified = last_modified;
                meta.fetch_status = FetchStatus::Success;
                meta.last_fetched_at = format_rfc3339(now);
                meta.next_check_at = after(now, self.config.refresh_interval);
                record.content_hash = content_hash;
                if resummarize {
                    record.summary_pending = true;
                }
            }
            CheckOutcome::Failed(status) => {
                meta.fetch_status = status;
                meta.next_check_at = after(now, self.config.retry_delay);
            }
        }
    }
}

#[async_trait::async_trait]
impl SourceProvider for UrlLinksProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Url
    }

    async fn discover(&self, _now: &DateTime<Utc>) -> Result<Discovered, Error> {
        let text = match tokio::fs::read_to_string(&self.config.links_file).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let urls: BTreeMap<String, Url> = parse_links(&text).into_iter().map(|l| (l.source_id, l.url)).collect();
        let discovered = urls.keys().map(|id| (id.clone(), SourceType::Url)).collect();
        *self.urls.write().await = urls;
        Ok(discovered)
    }

    async fn init_record(&self, source_id: &str, now: &DateTime<Utc>) -> Option<CacheRecord> {
        let url = self.urls.read().await.get(source_id).cloned()?;

        let text = match self.fetch_limited(&url, true).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(source_id, url = %url, error = %e, "failed to fetch URL content for new source");
                return None;
            }
        };
        let (etag, last_modified) = self.probe_validators(&url).await;

        let meta = UrlMeta {
            url: url.to_string(),
            last_fetched_at: format_rfc3339(now),
            etag,
            last_modified,
            fetch_status: FetchStatus::Success,
            next_check_at: after(now, self.config.refresh_interval),
        };
        Some(CacheRecord::pending(hash_text(&text), SourceMeta::Url { url: meta }, now))
    }

    async fn refresh(&self, state: &mut CacheState, now: &DateTime<Utc>) -> Result<bool, Error> {
        let urls = self.urls.read().await.clone();

        let due: Vec<(String, Url, Option<String>, Option<String>)> = state
            .sources
            .iter()
            .filter_map(|(source_id, record)| {
                let meta = record.url()?;
                let url = urls.get(source_id)?;
                is_due(meta, now).then(|| (source_id.clone(), url.clone(), meta.etag.clone(), meta.last_modified.clone()))
            })
            .collect();
        if due.is_empty() {
            return Ok(false);
        }

        tracing::debug!(provider = %self.name, count = due.len(), "checking URL sources");
        let outcomes = join_all(
            due.iter()
                .map(|(source_id, url, etag, last_modified)| self.check(source_id, url, etag.as_deref(), last_modified.as_deref())),
        )
        .await;

        for ((source_id, ..), outcome) in due.iter().zip(outcomes) {
            if let Some(record) = state.get_mut(source_id) {
                self.apply(record, outcome, now);
            }
        }
        Ok(true)
    }

    async fn load_text(&self, source_id: &str) -> Option<String> {
        let url = match self.urls.read().await.get(source_id) {
            Some(url) => url.clone(),
            None => canonicalize(source_id).ok()?,
        };

        if let Some(text) = self.fetcher.cached_content(&url).await {
            return Some(text);
        }
        match self.fetch_limited(&url, false).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(source_id, url = %url, error = %e, "failed to load URL content");
                None
            }
        }
    }
}
