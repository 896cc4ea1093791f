//! Network-facing pieces of kcache.
//!
//! This crate provides the HTTP fetch pipeline, headless rendering, HTML
//! cleaning, the disk-cached page fetcher, the URL-links source provider and
//! the chat-completions enrichment client used by the server.

pub mod enrich;
pub mod extract;
pub mod fetch;
pub mod render;
pub mod url_links;
pub mod web_fetcher;

pub use enrich::ChatEnricher;
pub use extract::clean_html;
pub use fetch::{FetchClient, FetchConfig, FetchResponse, Validation};
#[cfg(feature = "render")]
pub use render::HeadlessRenderer;
pub use render::{RenderError, RenderOptions, RenderedPage, Renderer};
pub use url_links::{UrlLinksConfig, UrlLinksProvider};
pub use web_fetcher::WebFetcher;
