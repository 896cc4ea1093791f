//! Remote content fetcher with a disk cache.
//!
//! Pages are fetched (rendered in a headless browser when a renderer is
//! configured, plain HTTP otherwise), cleaned, size-checked and written to
//! `cache_dir/<sha256(url)>`. Failed fetches are never cached, so the next
//! attempt goes back to the network.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use kcache_core::cache::hash::url_cache_key;
use kcache_core::cache::store::atomic_write;
use kcache_core::{AppConfig, Error};

use crate::extract::clean_html;
use crate::fetch::{FetchClient, FetchConfig};
use crate::render::{RenderOptions, Renderer};

pub struct WebFetcher {
    client: FetchClient,
    renderer: Option<Arc<dyn Renderer>>,
    render_options: RenderOptions,
    cache_dir: PathBuf,
    max_source_bytes: usize,
}

impl WebFetcher {
    pub fn new(client: FetchClient, cache_dir: impl Into<PathBuf>, max_source_bytes: usize) -> Self {
        Self {
            client,
            renderer: None,
            render_options: RenderOptions::default(),
            cache_dir: cache_dir.into(),
            max_source_bytes,
        }
    }

    /// Build a plain-HTTP fetcher from application config.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let client = FetchClient::new(FetchConfig::from(config))?;
        Ok(Self::new(client, &config.web_cache_dir, config.max_source_bytes)
            .with_render_options(RenderOptions::from(config)))
    }

    /// Render pages through `renderer` instead of plain HTTP.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render_options = options;
        self
    }

    pub fn client(&self) -> &FetchClient {
        &self.client
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, url: &Url) -> PathBuf {
        self.cache_dir.join(url_cache_key(url.as_str()))
    }

    /// Previously fetched content for `url`, without touching the network.
    pub async fn cached_content(&self, url: &Url) -> Option<String> {
        let path = self.cache_path(url);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(url = %url, path = %path.display(), error = %e, "failed to read web cache entry");
                None
            }
        }
    }

    /// Cleaned content of `url`.
    ///
    /// Served from the disk cache unless `force_refresh` is set. A cleaned
    /// page larger than `max_source_bytes` is an error, not a truncation.
    pub async fn fetch(&self, url: &Url, force_refresh: bool) -> Result<String, Error> {
        if !force_refresh && let Some(text) = self.cached_content(url).await {
            tracing::debug!(url = %url, "web cache hit");
            return Ok(text);
        }

        let raw = match &self.renderer {
            Some(renderer) => renderer.render(url, &self.render_options).await?.body_html,
            None => self.client.fetch(url).await?.text(),
        };

        let content = clean_html(&raw);
        tracing::debug!(url = %url, raw_len = raw.len(), cleaned_len = content.len(), "page cleaned");

        if content.is_empty() {
            return Err(Error::HttpError(format!("{url}: no content after cleaning")));
        }
        if content.len() > self.max_source_bytes {
            tracing::warn!(url = %url, size = content.len(), limit = self.max_source_bytes, "page too large");
            return Err(Error::FetchTooLarge(format!(
                "{url}: {} bytes exceeds {}",
                content.len(),
                self.max_source_bytes
            )));
        }

        atomic_write(&self.cache_path(url), content.as_bytes()).await?;
        Ok(content)
    }
}
