//! Content extraction from fetched pages.

pub mod clean;

pub use clean::clean_html;
