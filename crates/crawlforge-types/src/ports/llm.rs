//! LLM capability (§6): an abstract completion endpoint. The core never
//! vendors a concrete provider SDK — provider selection is a collaborator
//! concern (§1 Non-goals, §9 design notes).

use async_trait::async_trait;

use crate::error::CrawlError;

#[derive(Debug, Clone, Default)]
pub struct LlmOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// JSON schema the completion must conform to, when structured output
    /// is requested.
    pub schema: Option<serde_json::Value>,
}

#[async_trait]
pub trait Llm: Send + Sync {
    async fn complete(&self, prompt: &str, opts: &LlmOptions) -> Result<String, CrawlError>;
}
