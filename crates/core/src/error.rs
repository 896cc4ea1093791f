//! Unified error types for the knowledge cache.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Unified error type for the knowledge cache engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Filesystem operation failed.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// Cache file could not be encoded or decoded.
    #[error("CACHE_DECODE: {0}")]
    CacheDecode(#[from] serde_json::Error),

    /// Two providers claimed the same source id.
    #[error("DUPLICATE_SOURCE: {source_id} claimed by more than one provider")]
    DuplicateSource { source_id: String },

    /// No provider owns the requested source.
    #[error("SOURCE_NOT_FOUND: {0}")]
    SourceNotFound(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetched content exceeds the configured byte limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// HTTP or network error.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Render mode is disabled.
    #[error("RENDER_DISABLED")]
    RenderDisabled,

    /// Render failed.
    #[error("RENDER_FAILED: {0}")]
    RenderFailed(String),

    /// Enrichment client call failed.
    #[error("ENRICH_FAILED: {0}")]
    Enrich(String),
}

impl Error {
    /// Whether the failure came from a timeout rather than any other network fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::FetchTimeout(_))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::SourceNotFound(msg) => (-32001, msg.clone()),
            Error::Io(e) => (-32002, e.to_string()),
            Error::CacheDecode(e) => (-32002, e.to_string()),
            Error::DuplicateSource { .. } => (-32003, err.to_string()),
            Error::InvalidUrl(msg) => (-32004, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::HttpError(msg) => (-32008, msg.clone()),
            Error::RenderDisabled => (-32011, "Render mode is disabled".to_string()),
            Error::RenderFailed(msg) => (-32012, msg.clone()),
            Error::Enrich(msg) => (-32013, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DuplicateSource { source_id: "a.txt".to_string() };
        assert!(err.to_string().contains("DUPLICATE_SOURCE"));
        assert!(err.to_string().contains("a.txt"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::SourceNotFound("kb:missing.md".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::FetchTimeout("x".into()).is_timeout());
        assert!(!Error::HttpError("x".into()).is_timeout());
    }
}
