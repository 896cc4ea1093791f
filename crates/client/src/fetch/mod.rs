//! HTTP fetch pipeline for URL sources.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Requests
//! - Plain GET with a byte ceiling on the raw body
//! - Conditional GET (`If-None-Match` / `If-Modified-Since`) that reports the
//!   status and validators without reading the body
//! - Timeouts surface as [`Error::FetchTimeout`], everything else as
//!   [`Error::HttpError`]

pub mod url;

use bytes::{Bytes, BytesMut};
use reqwest::{Client, StatusCode, Url, header};
use std::time::{Duration, Instant};

pub use url::{LinkSource, UrlError, canonicalize, parse_links};

use kcache_core::{AppConfig, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "kcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "kcache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_fetch_bytes,
            timeout: config.fetch_timeout(),
            ..Default::default()
        }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Outcome of a conditional request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validation {
    pub fn is_not_modified(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED.as_u16()
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK.as_u16()
    }
}

fn request_error(url: &Url, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::FetchTimeout(format!("{url}: {e}"))
    } else {
        Error::HttpError(format!("network error: {e}"))
    }
}

fn header_string(headers: &header::HeaderMap, name: header::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

/// HTTP fetch client shared by the page fetcher and the URL provider.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Fetch a URL, returning raw bytes and metadata.
    ///
    /// Non-success statuses and bodies over `max_bytes` are errors.
    pub async fn fetch(&self, url: &Url) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let mut response = self
            .http
            .get(url.as_str())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!("status {}", status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let content_type = header_string(response.headers(), header::CONTENT_TYPE);

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| request_error(url, e))? {
            if body.len() + chunk.len() > self.config.max_bytes {
                return Err(Error::FetchTooLarge(format!("body exceeds {} bytes", self.config.max_bytes)));
            }
            body.extend_from_slice(&chunk);
        }
        let bytes = body.freeze();

        let fetch_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(url = %url, final_url = %final_url, fetch_ms, bytes = bytes.len(), "fetched");

        Ok(FetchResponse { final_url, status, content_type, bytes, fetch_ms })
    }

    /// Issue a conditional GET and report the status and returned validators.
    ///
    /// Any status is returned as-is; only transport failures are errors. The
    /// body is never read.
    pub async fn conditional_get(
        &self, url: &Url, etag: Option<&str>, last_modified: Option<&str>,
    ) -> Result<Validation, Error> {
        let mut request = self.http.get(url.as_str());
        if let Some(etag) = etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await.map_err(|e| request_error(url, e))?;
        let headers = response.headers();
        let validation = Validation {
            status: response.status().as_u16(),
            etag: header_string(headers, header::ETAG),
            last_modified: header_string(headers, header::LAST_MODIFIED),
        };

        tracing::debug!(url = %url, status = validation.status, "conditional request");
        Ok(validation)
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::io::Write;

    fn client() -> FetchClient {
        FetchClient::new(FetchConfig::default()).unwrap()
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "kcache/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "docs-bot/2".into(), fetch_timeout_ms: 1500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "docs-bot/2");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.max_bytes, app.max_fetch_bytes);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/page")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<p>hi</p>")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/page", server.url())).unwrap();
        let response = client().fetch(&url).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type.as_deref(), Some("text/html"));
        assert_eq!(response.text(), "<p>hi</p>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/gone").with_status(404).create_async().await;

        let url = Url::parse(&format!("{}/gone", server.url())).unwrap();
        let result = client().fetch(&url).await;
        assert!(matches!(result, Err(Error::HttpError(msg)) if msg.contains("404")));
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/big").with_status(200).with_body("x".repeat(64)).create_async().await;

        let client = FetchClient::new(FetchConfig { max_bytes: 16, ..Default::default() }).unwrap();
        let url = Url::parse(&format!("{}/big", server.url())).unwrap();
        assert!(matches!(client.fetch(&url).await, Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_fetch_too_large_without_content_length() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/stream")
            .with_status(200)
            .with_chunked_body(|w| {
                for _ in 0..8 {
                    w.write_all(b"xxxxxxxx")?;
                }
                Ok(())
            })
            .create_async()
            .await;

        let client = FetchClient::new(FetchConfig { max_bytes: 16, ..Default::default() }).unwrap();
        let url = Url::parse(&format!("{}/stream", server.url())).unwrap();
        assert!(matches!(client.fetch(&url).await, Err(Error::FetchTooLarge(msg)) if msg.contains("16")));
    }

    #[tokio::test]
    async fn test_conditional_get_sends_validators() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/doc")
            .match_header("if-none-match", "\"v1\"")
            .match_header("if-modified-since", "Wed, 21 Oct 2015 07:28:00 GMT")
            .with_status(304)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/doc", server.url())).unwrap();
        let validation = client()
            .conditional_get(&url, Some("\"v1\""), Some("Wed, 21 Oct 2015 07:28:00 GMT"))
            .await
            .unwrap();
        assert!(validation.is_not_modified());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_conditional_get_without_validators() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/doc")
            .match_header("if-none-match", Matcher::Missing)
            .with_status(200)
            .with_header("etag", "\"v2\"")
            .with_header("last-modified", "Thu, 22 Oct 2015 07:28:00 GMT")
            .with_body("fresh")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/doc", server.url())).unwrap();
        let validation = client().conditional_get(&url, None, None).await.unwrap();
        assert!(validation.is_ok());
        assert_eq!(validation.etag.as_deref(), Some("\"v2\""));
        assert_eq!(validation.last_modified.as_deref(), Some("Thu, 22 Oct 2015 07:28:00 GMT"));
    }

    #[tokio::test]
    async fn test_conditional_get_reports_error_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/boom").with_status(503).create_async().await;

        let url = Url::parse(&format!("{}/boom", server.url())).unwrap();
        let validation = client().conditional_get(&url, None, None).await.unwrap();
        assert_eq!(validation.status, 503);
        assert!(!validation.is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let result = client().conditional_get(&url, None, None).await;
        assert!(matches!(result, Err(Error::HttpError(_))));
    }
}
