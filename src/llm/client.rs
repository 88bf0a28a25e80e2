use async_trait::async_trait;

use super::error::LlmError;
use super::types::{ChatRequest, ChatResponse};

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_id(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}
