//! Headless browser rendering for JS-heavy pages.
//!
//! The [`Renderer`] trait is always available; the chromiumoxide-backed
//! [`HeadlessRenderer`] is compiled with the `render` feature. The browser is
//! launched on first use and shared by every render after that.

use std::time::Duration;
use thiserror::Error;
use url::Url;

use kcache_core::{AppConfig, Error};

/// Errors that can occur during page rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Failed to navigate to URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Failed to get page content.
    #[error("content retrieval failed: {0}")]
    ContentRetrieval(String),

    /// Timeout waiting for page to load.
    #[error("render timeout after {0}ms")]
    Timeout(u64),
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Timeout(ms) => Error::FetchTimeout(format!("render timeout after {ms}ms")),
            other => Error::RenderFailed(other.to_string()),
        }
    }
}

/// Options for rendering a page.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Navigation timeout in milliseconds (default: 20000).
    pub timeout_ms: u64,

    /// Quiet period after navigation so late network activity can settle (default: 1500).
    pub settle_ms: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { timeout_ms: 20000, settle_ms: 1500 }
    }
}

impl From<&AppConfig> for RenderOptions {
    fn from(config: &AppConfig) -> Self {
        Self { timeout_ms: config.fetch_timeout_ms, settle_ms: config.render_settle_ms }
    }
}

impl RenderOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Result of rendering a page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Inner HTML of the rendered `<body>`.
    pub body_html: String,

    /// Final URL after redirects.
    pub final_url: Url,

    /// Time taken to render in milliseconds.
    pub render_time_ms: u64,
}

/// Renderer trait for headless browser page rendering.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Render a URL and return its body markup.
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError>;
}

#[cfg(feature = "render")]
pub use headless::HeadlessRenderer;

#[cfg(feature = "render")]
mod headless {
    use super::*;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use futures_util::StreamExt;
    use tokio::sync::OnceCell;

    const BODY_SCRIPT: &str = "document.body ? document.body.innerHTML : ''";

    /// Headless Chrome/Chromium renderer using chromiumoxide.
    #[derive(Default)]
    pub struct HeadlessRenderer {
        browser: OnceCell<Browser>,
    }

    impl HeadlessRenderer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Launch the browser on first use. The CDP event handler runs on a
        /// background task for the lifetime of the browser.
        async fn browser(&self) -> Result<&Browser, RenderError> {
            self.browser
                .get_or_try_init(|| async {
                    let config = BrowserConfig::builder().build().map_err(RenderError::BrowserLaunch)?;
                    let (browser, mut handler) =
                        Browser::launch(config).await.map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;

                    tokio::spawn(async move {
                        while let Some(event) = handler.next().await {
                            if let Err(e) = event {
                                tracing::debug!(error = %e, "browser handler event error");
                                break;
                            }
                        }
                    });
                    tracing::info!("headless browser launched");
                    Ok(browser)
                })
                .await
        }
    }

    #[async_trait::async_trait]
    impl Renderer for HeadlessRenderer {
        async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
            let browser = self.browser().await?;
            let start = std::time::Instant::now();

            let page = tokio::time::timeout(opts.timeout(), async {
                let page = browser
                    .new_page(url.as_str())
                    .await
                    .map_err(|e| RenderError::Navigation(e.to_string()))?;
                page.wait_for_navigation()
                    .await
                    .map_err(|e| RenderError::Navigation(e.to_string()))?;
                Ok::<_, RenderError>(page)
            })
            .await
            .map_err(|_| RenderError::Timeout(opts.timeout_ms))??;

            tokio::time::sleep(opts.settle()).await;

            let result = async {
                let body_html: String = page
                    .evaluate(BODY_SCRIPT)
                    .await
                    .map_err(|e| RenderError::ContentRetrieval(e.to_string()))?
                    .into_value()
                    .map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;

                let page_url = page.url().await.map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;
                let final_url = page_url
                    .as_deref()
                    .and_then(|u| Url::parse(u).ok())
                    .unwrap_or_else(|| url.clone());

                Ok(RenderedPage { body_html, final_url, render_time_ms: start.elapsed().as_millis() as u64 })
            }
            .await;

            page.close().await.ok();
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_options_from_config() {
        let config = AppConfig { fetch_timeout_ms: 5000, render_settle_ms: 250, ..Default::default() };
        let opts = RenderOptions::from(&config);
        assert_eq!(opts.timeout(), Duration::from_millis(5000));
        assert_eq!(opts.settle(), Duration::from_millis(250));
    }

    #[test]
    fn test_render_error_into_core_error() {
        assert!(matches!(Error::from(RenderError::Timeout(100)), Error::FetchTimeout(_)));
        assert!(matches!(Error::from(RenderError::Navigation("dns".into())), Error::RenderFailed(_)));
    }

    #[cfg(feature = "render")]
    #[tokio::test]
    #[ignore = "requires network and Chrome/Chromium"]
    async fn test_render_simple_page() {
        let renderer = HeadlessRenderer::new();
        let url = Url::parse("https://example.com").unwrap();
        let opts = RenderOptions { settle_ms: 100, ..Default::default() };

        let page = renderer.render(&url, &opts).await.unwrap();
        assert!(page.body_html.contains("Example Domain"));
        assert_eq!(page.final_url.as_str(), "https://example.com/");
    }
}
