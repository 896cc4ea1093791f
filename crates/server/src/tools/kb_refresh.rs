//! kb_refresh tool implementation.
//!
//! Requests an out-of-band tick, e.g. after a topic file was written.

use kcache_core::{Error, TickReport};
use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{KnowledgeBase, KnowledgeBases, json_result};

/// Input parameters for kb_refresh tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct KbRefreshParams {
    /// Knowledge base to refresh: "main" (default) or "team".
    #[serde(default)]
    pub base: KnowledgeBase,

    /// Id of the source that changed, if known. Only used for logging; the
    /// tick always re-scans every source.
    #[serde(default)]
    pub source_id: Option<String>,
}

/// Output structure for kb_refresh tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct KbRefreshOutput {
    pub base: KnowledgeBase,
    pub report: TickReport,
}

pub async fn refresh(kbs: &KnowledgeBases, params: KbRefreshParams) -> Result<KbRefreshOutput, Error> {
    let indexer = kbs.get(params.base)?;
    let source_id = params.source_id.as_deref().unwrap_or("*");
    let report = indexer.notify_changed(source_id).await?;
    tracing::info!(
        base = ?params.base,
        source_id,
        added = report.added,
        removed = report.removed,
        summarized = report.summarized,
        "kb_refresh tick finished"
    );
    Ok(KbRefreshOutput { base: params.base, report })
}

pub async fn kb_refresh_impl(kbs: &KnowledgeBases, params: KbRefreshParams) -> Result<CallToolResult, McpError> {
    json_result(&refresh(kbs, params).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{bases, write_source};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_refresh_picks_up_new_topic() {
        let dir = TempDir::new().unwrap();
        let kbs = bases(dir.path(), true);
        let first = refresh(&kbs, KbRefreshParams { base: KnowledgeBase::Team, source_id: None }).await.unwrap();
        assert_eq!(first.report.discovered, 0);

        write_source(dir.path(), "team", "topics/login.txt", "Reset the password");
        let params = KbRefreshParams { base: KnowledgeBase::Team, source_id: Some("topics/login.txt".into()) };
        let output = refresh(&kbs, params).await.unwrap();

        assert_eq!(output.base, KnowledgeBase::Team);
        assert_eq!(output.report.added, 1);
        assert_eq!(output.report.summarized, 1);
        let index = std::fs::read_to_string(dir.path().join("team/index.txt")).unwrap();
        assert_eq!(index, "team:topics/login.txt\nAbout Reset the password");
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "kb", "guide.md", "Install steps");
        let kbs = bases(dir.path(), false);

        refresh(&kbs, KbRefreshParams::default()).await.unwrap();
        let again = refresh(&kbs, KbRefreshParams::default()).await.unwrap();
        assert_eq!(again.report.added, 0);
        assert_eq!(again.report.summarized, 0);
        assert!(!again.report.persisted);
    }

    #[tokio::test]
    async fn test_refresh_team_not_configured() {
        let dir = TempDir::new().unwrap();
        let kbs = bases(dir.path(), false);
        let result = kb_refresh_impl(&kbs, KbRefreshParams { base: KnowledgeBase::Team, source_id: None }).await;
        assert!(result.is_err());
    }
}
