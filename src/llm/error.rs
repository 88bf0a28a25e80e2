use thiserror::Error;

/// Failures talking to the hosted model.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited by the model endpoint: {0}")]
    RateLimited(String),

    #[error("Access denied (check IAM permissions for bedrock:InvokeModel): {0}")]
    AccessDenied(String),

    #[error("Request rejected by the model endpoint: {0}")]
    Validation(String),

    #[error("Model not found (check model ID and region): {0}")]
    ModelNotFound(String),

    #[error("Model endpoint error: {0}")]
    Service(String),

    #[error("Failed to encode request: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}
