//! Bedrock-hosted Claude models.
//!
//! Requests go through `InvokeModel` with the Anthropic Messages body.
//! Credentials come from the default AWS chain (environment, shared
//! profile, SSO, container or instance metadata).

use async_trait::async_trait;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use tokio::sync::OnceCell;
use tracing::{debug, error};

use super::client::LlmClient;
use super::error::LlmError;
use super::types::{ChatRequest, ChatResponse};
use crate::config::ModelConfig;

/// `anthropic_version` expected in the body by Bedrock.
const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

pub struct BedrockClient {
    config: ModelConfig,
    client: OnceCell<Client>,
}

impl BedrockClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(aws_config::Region::new(self.config.region.clone()));

                if let Some(ref profile) = self.config.profile {
                    loader = loader.profile_name(profile);
                }

                let sdk_config = loader.load().await;

                match self.config.endpoint_override {
                    Some(ref endpoint) => {
                        let conf = aws_sdk_bedrockruntime::config::Builder::from(&sdk_config)
                            .endpoint_url(endpoint)
                            .build();
                        Client::from_conf(conf)
                    }
                    None => Client::new(&sdk_config),
                }
            })
            .await
    }
}

/// Turn a chat request into the JSON body Bedrock expects.
pub fn to_bedrock_body(request: &ChatRequest) -> Result<serde_json::Value, LlmError> {
    let mut body = serde_json::to_value(request)?;

    if let serde_json::Value::Object(ref mut map) = body {
        map.insert(
            "anthropic_version".to_string(),
            serde_json::Value::String(BEDROCK_ANTHROPIC_VERSION.to_string()),
        );
    }

    Ok(body)
}

pub fn parse_bedrock_response(bytes: &[u8]) -> Result<ChatResponse, LlmError> {
    let response: ChatResponse = serde_json::from_slice(bytes).map_err(|e| {
        LlmError::InvalidResponse(format!("failed to parse Bedrock response: {}", e))
    })?;

    if response.content.is_empty() && response.stop_reason.is_none() {
        return Err(LlmError::EmptyResponse);
    }

    Ok(response)
}

fn map_bedrock_error(err: impl Into<aws_sdk_bedrockruntime::Error>) -> LlmError {
    use aws_sdk_bedrockruntime::Error as BedrockError;

    let err = err.into();
    let message = err.to_string();

    match err {
        BedrockError::ThrottlingException(_) | BedrockError::ServiceQuotaExceededException(_) => {
            LlmError::RateLimited(message)
        }
        BedrockError::AccessDeniedException(_) => LlmError::AccessDenied(message),
        BedrockError::ValidationException(_) => LlmError::Validation(message),
        BedrockError::ResourceNotFoundException(_) => LlmError::ModelNotFound(message),
        _ => LlmError::Service(message),
    }
}

#[async_trait]
impl LlmClient for BedrockClient {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = serde_json::to_vec(&to_bedrock_body(&request)?)?;

        debug!(
            "Sending {} messages and {} tools to {}",
            request.messages.len(),
            request.tools.len(),
            self.config.model_id
        );

        let response = self
            .client()
            .await
            .invoke_model()
            .model_id(&self.config.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                let mapped = map_bedrock_error(e);
                error!("Bedrock invocation failed: {}", mapped);
                mapped
            })?;

        parse_bedrock_response(response.body().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{Message, StopReason, ToolSpec};
    use serde_json::json;

    #[test]
    fn test_body_has_version_and_no_model() {
        let request = ChatRequest::new(vec![Message::user("Hello")], 256)
            .with_system("You are terse.")
            .with_temperature(0.7);

        let body = to_bedrock_body(&request).unwrap();

        assert_eq!(body["anthropic_version"], BEDROCK_ANTHROPIC_VERSION);
        assert!(body.get("model").is_none());
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["system"], "You are terse.");
    }

    #[test]
    fn test_body_carries_tools() {
        let request = ChatRequest::new(vec![Message::user("Hello")], 256).with_tools(vec![
            ToolSpec {
                name: "shell".into(),
                description: "Run a command".into(),
                input_schema: json!({"type": "object"}),
            },
        ]);

        let body = to_bedrock_body(&request).unwrap();
        assert_eq!(body["tools"][0]["name"], "shell");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_parse_response() {
        let raw = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Done."}],
            "model": "claude",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 25, "output_tokens": 3}
        });

        let response = parse_bedrock_response(raw.to_string().as_bytes()).unwrap();
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.usage.input_tokens, 25);
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        let empty = json!({"content": []}).to_string();
        assert!(matches!(
            parse_bedrock_response(empty.as_bytes()),
            Err(LlmError::EmptyResponse)
        ));

        assert!(matches!(
            parse_bedrock_response(b"not json"),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_error_mapping() {
        let throttled = aws_sdk_bedrockruntime::Error::ThrottlingException(
            aws_sdk_bedrockruntime::types::error::ThrottlingException::builder()
                .message("Rate exceeded")
                .build(),
        );
        assert!(matches!(
            map_bedrock_error(throttled),
            LlmError::RateLimited(_)
        ));

        let missing = aws_sdk_bedrockruntime::Error::ResourceNotFoundException(
            aws_sdk_bedrockruntime::types::error::ResourceNotFoundException::builder()
                .message("Model not found")
                .build(),
        );
        assert!(matches!(
            map_bedrock_error(missing),
            LlmError::ModelNotFound(_)
        ));

        let denied = aws_sdk_bedrockruntime::Error::AccessDeniedException(
            aws_sdk_bedrockruntime::types::error::AccessDeniedException::builder()
                .message("Not authorized")
                .build(),
        );
        assert!(map_bedrock_error(denied).to_string().contains("Access denied"));
    }

    #[test]
    fn test_client_uses_configured_model() {
        let client = BedrockClient::new(ModelConfig::default());
        assert_eq!(client.model_id(), crate::config::DEFAULT_MODEL_ID);
    }
}
