//! kb_index tool implementation.
//!
//! Lists the entries of a knowledge base's index file.

use kcache_core::{Error, IndexEntry};
use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{KnowledgeBase, KnowledgeBases, json_result};

/// Input parameters for kb_index tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct KbIndexParams {
    /// Knowledge base to list: "main" (default) or "team".
    #[serde(default)]
    pub base: KnowledgeBase,
}

/// Output structure for kb_index tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KbIndexOutput {
    pub base: KnowledgeBase,
    /// Prefixed source ids with their summaries, in index order.
    pub entries: Vec<IndexEntry>,
}

pub async fn list_entries(kbs: &KnowledgeBases, params: KbIndexParams) -> Result<KbIndexOutput, Error> {
    let entries = kbs.get(params.base)?.load_index_entries().await?;
    tracing::debug!(base = ?params.base, count = entries.len(), "kb_index");
    Ok(KbIndexOutput { base: params.base, entries })
}

pub async fn kb_index_impl(kbs: &KnowledgeBases, params: KbIndexParams) -> Result<CallToolResult, McpError> {
    json_result(&list_entries(kbs, params).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{bases, write_source};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_before_first_tick() {
        let dir = TempDir::new().unwrap();
        let kbs = bases(dir.path(), false);

        let output = list_entries(&kbs, KbIndexParams::default()).await.unwrap();
        assert_eq!(output.base, KnowledgeBase::Main);
        assert!(output.entries.is_empty());
    }

    #[tokio::test]
    async fn test_lists_team_entries() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "team", "topics/login.txt", "Reset the password");
        let kbs = bases(dir.path(), true);
        kbs.get(KnowledgeBase::Team).unwrap().run_once().await.unwrap();

        let output = list_entries(&kbs, KbIndexParams { base: KnowledgeBase::Team }).await.unwrap();
        assert_eq!(
            output.entries,
            vec![IndexEntry {
                source_id: "team:topics/login.txt".into(),
                description: "About Reset the password".into()
            }]
        );
        assert!(list_entries(&kbs, KbIndexParams::default()).await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn test_team_not_configured() {
        let dir = TempDir::new().unwrap();
        let kbs = bases(dir.path(), false);

        let result = kb_index_impl(&kbs, KbIndexParams { base: KnowledgeBase::Team }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_impl_returns_success() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "kb", "guide.md", "Install steps");
        let kbs = bases(dir.path(), false);
        kbs.get(KnowledgeBase::Main).unwrap().run_once().await.unwrap();

        let call_result = kb_index_impl(&kbs, KbIndexParams::default()).await.unwrap();
        assert!(!call_result.is_error.unwrap_or(false));
    }
}
