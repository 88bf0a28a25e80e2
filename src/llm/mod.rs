pub mod bedrock;
pub mod client;
pub mod error;
pub mod types;

pub use bedrock::BedrockClient;
pub use client::LlmClient;
pub use types::{ChatRequest, ContentBlock, Message, StopReason, ToolSpec, Usage};
