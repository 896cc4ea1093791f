//! kb_source tool implementation.
//!
//! Returns the full text of one source, routed to a knowledge base by the
//! source id's index prefix.

use kcache_core::Error;
use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{KnowledgeBase, KnowledgeBases, json_result};

/// Input parameters for kb_source tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KbSourceParams {
    /// Source id as listed by kb_index, e.g. "kb:guide.md".
    pub source_id: String,
}

/// Output structure for kb_source tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KbSourceOutput {
    pub base: KnowledgeBase,
    pub source_id: String,
    pub text: String,
}

pub async fn read_source(kbs: &KnowledgeBases, params: KbSourceParams) -> Result<KbSourceOutput, Error> {
    if params.source_id.trim().is_empty() {
        return Err(Error::InvalidInput("source_id must not be empty".into()));
    }

    let (base, indexer) = kbs.route(&params.source_id);
    let text = indexer.load_source(&params.source_id).await?;
    Ok(KbSourceOutput { base, source_id: params.source_id, text })
}

pub async fn kb_source_impl(kbs: &KnowledgeBases, params: KbSourceParams) -> Result<CallToolResult, McpError> {
    json_result(&read_source(kbs, params).await?)
}
