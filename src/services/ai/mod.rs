pub mod openai;

use async_trait::async_trait;

use crate::models::ChatMessage;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> anyhow::Result<String>;
}
