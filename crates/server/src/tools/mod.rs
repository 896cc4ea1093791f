//! MCP tool implementations.
//!
//! Consumers get a read-only view of both knowledge bases plus one trigger
//! for out-of-band refreshes.

pub mod kb_index;
pub mod kb_refresh;
pub mod kb_source;

use std::sync::Arc;

use kcache_core::{Error, Indexer};
use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which knowledge base a tool call targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeBase {
    /// Curated files and links.
    #[default]
    Main,
    /// Team Q&A topics.
    Team,
}

/// The indexers behind the tools.
#[derive(Clone)]
pub struct KnowledgeBases {
    main: Arc<Indexer>,
    team: Option<Arc<Indexer>>,
}

impl KnowledgeBases {
    pub fn new(main: Arc<Indexer>, team: Option<Arc<Indexer>>) -> Self {
        Self { main, team }
    }

    pub fn get(&self, base: KnowledgeBase) -> Result<&Arc<Indexer>, Error> {
        match base {
            KnowledgeBase::Main => Ok(&self.main),
            KnowledgeBase::Team => {
                self.team.as_ref().ok_or_else(|| Error::InvalidInput("team knowledge base is not configured".into()))
            }
        }
    }

    /// Pick the base whose index prefix a source id carries. Ids without a
    /// recognised prefix belong to the main base.
    pub fn route(&self, source_id: &str) -> (KnowledgeBase, &Arc<Indexer>) {
        let id = source_id.trim();
        if let Some(team) = &self.team
            && !team.config().index_prefix.is_empty()
            && id.starts_with(team.config().index_prefix.as_str())
        {
            return (KnowledgeBase::Team, team);
        }
        (KnowledgeBase::Main, &self.main)
    }
}

pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
