//! Enrichment client seam.
//!
//! The indexer turns raw source text into a short description through an
//! [`Enricher`]. Any failure is treated the same way: the record stays
//! pending and is retried on the next tick.

use crate::Error;

#[async_trait::async_trait]
pub trait Enricher: Send + Sync {
    async fn invoke(&self, system_prompt: &str, user_content: &str) -> Result<String, Error>;
}

/// Append the project introduction to a base prompt, dropping empty parts.
pub fn compose_system_prompt(base_prompt: &str, project_introduction: &str) -> String {
    let mut parts = Vec::new();
    if !base_prompt.trim().is_empty() {
        parts.push(base_prompt.trim().to_string());
    }
    if !project_introduction.trim().is_empty() {
        parts.push(format!("Project introduction:\n{}", project_introduction.trim()));
    }
    parts.join("\n\n")
}
