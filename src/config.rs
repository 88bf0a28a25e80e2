use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::mcp::McpServerConfig;

pub const DEFAULT_MODEL_ID: &str = "us.anthropic.claude-3-5-sonnet-20241022-v2:0";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: usize = 4096;
pub const DEFAULT_MAX_TURNS: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub model_id: String,
    pub region: String,
    pub profile: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Custom Bedrock runtime endpoint (VPC endpoint or local stub)
    pub endpoint_override: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let region = std::env::var("AWS_REGION")
            .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|_| "us-east-1".to_string());

        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            region,
            profile: std::env::var("AWS_PROFILE").ok(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            endpoint_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub model: ModelConfig,
    pub servers: Vec<McpServerConfig>,
    pub system_prompt: Option<String>,
    pub max_turns: usize,
    pub working_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            servers: default_servers(),
            system_prompt: None,
            max_turns: DEFAULT_MAX_TURNS,
            working_dir: ".".to_string(),
        }
    }
}

/// AWS documentation lookup and Bedrock Data Automation, both launched through `uvx`.
pub fn default_servers() -> Vec<McpServerConfig> {
    vec![
        McpServerConfig::uvx("aws-bda", "awslabs.aws-bedrock-data-automation-mcp-server@latest"),
        McpServerConfig::uvx("aws-docs", "awslabs.aws-documentation-mcp-server@latest"),
    ]
}

impl AgentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from {:?}", path);

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml(&raw).with_context(|| format!("Invalid config file: {:?}", path))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(raw)?;
        Ok(config)
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(crate::prompts::SYSTEM_PROMPT)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.model.temperature) {
            anyhow::bail!(
                "temperature must be between 0.0 and 1.0, got {}",
                self.model.temperature
            );
        }
        if self.model.max_tokens == 0 {
            anyhow::bail!("max_tokens must be greater than zero");
        }
        if self.max_turns == 0 {
            anyhow::bail!("max_turns must be greater than zero");
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.command.trim().is_empty() {
                anyhow::bail!("MCP server '{}' has an empty command", server.name);
            }
            if !seen.insert(server.name.as_str()) {
                anyhow::bail!("Duplicate MCP server name: {}", server.name);
            }
        }

        Ok(())
    }
}
