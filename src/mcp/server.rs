use anyhow::{Context, Result};
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::llm::ToolSpec;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpServerConfig {
    /// A server published as a Python package and run through `uvx`.
    pub fn uvx(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: "uvx".to_string(),
            args: vec![package.into()],
            env: HashMap::new(),
        }
    }
}

/// Result of one tool call, flattened to what the model needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

pub struct McpServer {
    config: McpServerConfig,
    working_dir: Option<PathBuf>,
    service: Option<RunningService<RoleClient, ()>>,
    tools: Vec<Tool>,
}

impl McpServer {
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            working_dir: None,
            service: None,
            tools: Vec::new(),
        }
    }

    /// Spawn the server process in `dir` instead of the current directory.
    pub fn in_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub async fn start(&mut self) -> Result<()> {
        info!(
            "Starting MCP server: {} ({} {})",
            self.config.name,
            self.config.command,
            self.config.args.join(" ")
        );

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args).envs(&self.config.env);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let transport = TokioChildProcess::new(cmd).with_context(|| {
            format!(
                "Failed to spawn MCP server '{}' ({})",
                self.config.name, self.config.command
            )
        })?;

        let service = ()
            .serve(transport)
            .await
            .with_context(|| format!("MCP handshake with '{}' failed", self.config.name))?;

        if let Some(peer) = service.peer_info() {
            debug!("{} server info: {:?}", self.config.name, peer.server_info);
        }

        self.tools = service
            .list_all_tools()
            .await
            .with_context(|| format!("Failed to list tools of '{}'", self.config.name))?;
        self.service = Some(service);

        info!(
            "MCP server {} started with {} tools",
            self.config.name,
            self.tools.len()
        );

        Ok(())
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolOutput> {
        let service = self
            .service
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("MCP server '{}' is not running", self.config.name))?;

        let params = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(arguments),
        };

        let result = service
            .call_tool(params)
            .await
            .with_context(|| format!("Tool '{}' on '{}' failed", name, self.config.name))?;

        Ok(render_result(&result))
    }

    pub fn get_tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(service) = self.service.take() {
            info!("Stopping MCP server: {}", self.config.name);
            if let Err(e) = service.cancel().await {
                warn!("MCP server {} did not shut down cleanly: {}", self.config.name, e);
            }
        }
        Ok(())
    }
}

/// Text content joined in order; structured content is used when no text came back.
fn render_result(result: &CallToolResult) -> ToolOutput {
    let mut text = result
        .content
        .iter()
        .filter_map(|content| content.raw.as_text().map(|t| t.text.clone()))
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        if let Some(ref structured) = result.structured_content {
            text = structured.to_string();
        } else if !result.content.is_empty() {
            text = "<non-text tool result omitted>".to_string();
        }
    }

    ToolOutput {
        text,
        is_error: result.is_error.unwrap_or(false),
    }
}

/// Describe an MCP tool the way the model expects it.
pub fn to_tool_spec(tool: &Tool) -> ToolSpec {
    ToolSpec {
        name: tool.name.to_string(),
        description: tool
            .description
            .as_deref()
            .unwrap_or_default()
            .to_string(),
        input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::test_support::stub_server;
    use rmcp::model::Content;
    use serde_json::json;

    #[test]
    fn test_uvx_config() {
        let config = McpServerConfig::uvx("docs", "awslabs.aws-documentation-mcp-server@latest");
        assert_eq!(config.command, "uvx");
        assert_eq!(config.args, vec!["awslabs.aws-documentation-mcp-server@latest"]);
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_render_text_result() {
        let result = CallToolResult::success(vec![Content::text("one"), Content::text("two")]);
        let output = render_result(&result);
        assert_eq!(output.text, "one\ntwo");
        assert!(!output.is_error);

        let failed = CallToolResult::error(vec![Content::text("bucket missing")]);
        let output = render_result(&failed);
        assert!(output.is_error);
        assert_eq!(output.text, "bucket missing");
    }

    #[test]
    fn test_tool_spec_from_mcp_tool() {
        let schema = json!({
            "type": "object",
            "properties": {"uri": {"type": "string"}},
            "required": ["uri"]
        });
        let schema = match schema {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let tool = Tool::new("invoke_project", "Run a Data Automation project", schema);

        let spec = to_tool_spec(&tool);
        assert_eq!(spec.name, "invoke_project");
        assert_eq!(spec.description, "Run a Data Automation project");
        assert_eq!(spec.input_schema["required"][0], "uri");
    }

    #[tokio::test]
    async fn test_start_missing_binary_fails() {
        let mut server = McpServer::new(McpServerConfig {
            name: "ghost".into(),
            command: "definitely-not-a-real-mcp-binary".into(),
            args: vec![],
            env: HashMap::new(),
        });

        assert!(server.start().await.is_err());
        assert!(server.get_tools().is_empty());
    }

    #[tokio::test]
    async fn test_missing_working_dir_fails_to_spawn() {
        let mut server = McpServer::new(stub_server("docs", &["lookup"]))
            .in_dir(Some(PathBuf::from("/definitely/not/a/real/dir")));

        let err = server.start().await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }

    #[tokio::test]
    async fn test_stub_server_lists_and_calls_tools() {
        let mut server = McpServer::new(stub_server("docs", &["lookup", "read_page"]));
        server.start().await.unwrap();

        assert!(server.has_tool("read_page"));
        assert_eq!(server.get_tools().len(), 2);

        let output = server.call_tool("lookup", serde_json::Map::new()).await.unwrap();
        assert!(!output.is_error);
        assert!(output.text.starts_with("docs "));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_call_on_stopped_server_fails() {
        let mut server = McpServer::new(McpServerConfig::uvx("idle", "pkg"));
        server.stop().await.unwrap();

        let err = server
            .call_tool("anything", serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not running"));
    }
}
