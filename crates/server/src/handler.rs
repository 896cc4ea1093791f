//! MCP server handler implementation.
//!
//! Routes tool calls to the knowledge base tools.
use crate::tools::kb_index::{KbIndexParams, kb_index_impl};
use crate::tools::kb_refresh::{KbRefreshParams, kb_refresh_impl};
use crate::tools::kb_source::{KbSourceParams, kb_source_impl};
use crate::tools::KnowledgeBases;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The MCP server handler for kcache.
#[derive(Clone)]
pub struct KcacheServer {
    bases: KnowledgeBases,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl KcacheServer {
    pub fn new(bases: KnowledgeBases) -> Self {
        Self { bases, tool_router: Self::tool_router() }
    }

    #[tool(description = "List the index of a knowledge base (\"main\" or \"team\"): one entry per source with its prefixed id and summary.")]
    async fn kb_index(&self, params: Parameters<KbIndexParams>) -> Result<CallToolResult, McpError> {
        kb_index_impl(&self.bases, params.0).await
    }

    /// Full text of a source by its prefixed id.
    #[tool(description = "Return the full text of a knowledge base source, by the prefixed id listed in kb_index.")]
    async fn kb_source(&self, params: Parameters<KbSourceParams>) -> Result<CallToolResult, McpError> {
        kb_source_impl(&self.bases, params.0).await
    }

    /// Out-of-band tick; blocks until it finishes.
    #[tool(description = "Re-scan a knowledge base now and return what changed. Use after adding or editing a source.")]
    async fn kb_refresh(&self, params: Parameters<KbRefreshParams>) -> Result<CallToolResult, McpError> {
        kb_refresh_impl(&self.bases, params.0).await
    }
}

impl ServerHandler for KcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "kcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
