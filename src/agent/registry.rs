use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::ToolSpec;
use crate::mcp::{to_tool_spec, McpClient, ToolOutput};
use crate::tools::builtin;
use crate::tools::ToolExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSource {
    Builtin,
    Mcp,
}

/// Every tool the model may call, and where each call is routed.
pub struct ToolRegistry {
    mcp: Arc<McpClient>,
    executor: Arc<ToolExecutor>,
    specs: Vec<ToolSpec>,
    mcp_tools: HashSet<String>,
}

impl ToolRegistry {
    /// Built-in tools first, then each server's tools in registration order.
    /// A name that is already taken keeps its first owner.
    pub async fn build(mcp: Arc<McpClient>, executor: Arc<ToolExecutor>) -> Self {
        let mut specs = builtin::specs();
        let mut mcp_tools = HashSet::new();

        for (server, tools) in mcp.list_all_tools().await {
            for tool in &tools {
                let name = tool.name.to_string();
                if builtin::is_builtin(&name) || mcp_tools.contains(&name) {
                    warn!("Skipping duplicate tool '{}' from '{}'", name, server);
                    continue;
                }
                specs.push(to_tool_spec(tool));
                mcp_tools.insert(name);
            }
        }

        debug!("Tool registry holds {} tools", specs.len());

        Self {
            mcp,
            executor,
            specs,
            mcp_tools,
        }
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn source(&self, name: &str) -> Option<ToolSource> {
        if builtin::is_builtin(name) {
            Some(ToolSource::Builtin)
        } else if self.mcp_tools.contains(name) {
            Some(ToolSource::Mcp)
        } else {
            None
        }
    }

    /// Run one tool call. Failures are returned as error output, never raised.
    pub async fn call(&self, name: &str, input: &serde_json::Value) -> ToolOutput {
        match self.source(name) {
            Some(ToolSource::Builtin) => builtin::dispatch(&self.executor, name, input).await,
            Some(ToolSource::Mcp) => {
                let arguments = match input {
                    serde_json::Value::Object(map) => map.clone(),
                    serde_json::Value::Null => serde_json::Map::new(),
                    other => {
                        return ToolOutput {
                            text: format!("Error: tool input must be a JSON object, got {}", other),
                            is_error: true,
                        }
                    }
                };

                match self.mcp.call_tool(name, arguments).await {
                    Ok(output) => output,
                    Err(e) => ToolOutput {
                        text: format!("Error: {:#}", e),
                        is_error: true,
                    },
                }
            }
            None => ToolOutput {
                text: format!("Error: unknown tool '{}'", name),
                is_error: true,
            },
        }
    }
}
