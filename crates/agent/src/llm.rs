use anyhow::Result;
use async_trait::async_trait;

/// Seam for an external language-model provider. The built-in heuristic
/// proposer does not need one; a provider-backed proposer plugs in here.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
