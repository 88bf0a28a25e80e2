use anyhow::Result;
use rmcp::model::Tool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::server::{McpServer, McpServerConfig, ToolOutput};

/// Running tool servers, kept in registration order.
///
/// When two servers expose the same tool name the first registered one owns it.
pub struct McpClient {
    servers: Arc<RwLock<Vec<McpServer>>>,
    working_dir: Option<PathBuf>,
}

impl McpClient {
    pub fn new() -> Self {
        Self {
            servers: Arc::new(RwLock::new(Vec::new())),
            working_dir: None,
        }
    }

    /// Servers started from now on run in `dir`, so relative paths agree
    /// with the built-in file tools.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub async fn register_server(&self, config: McpServerConfig) -> Result<()> {
        let name = config.name.clone();
        info!("Registering MCP server: {}", name);

        if self.servers.read().await.iter().any(|s| s.name() == name) {
            anyhow::bail!("MCP server '{}' is already registered", name);
        }

        let mut server = McpServer::new(config).in_dir(self.working_dir.clone());
        server.start().await?;

        let mut servers = self.servers.write().await;
        for tool in server.get_tools() {
            if let Some(owner) = servers.iter().find(|s| s.has_tool(&tool.name)) {
                warn!(
                    "Tool '{}' from '{}' is shadowed by '{}'",
                    tool.name,
                    name,
                    owner.name()
                );
            }
        }
        servers.push(server);

        Ok(())
    }

    /// Start `configs` in order. On a failure the servers already running are
    /// stopped, unless `skip_unavailable` is set.
    pub async fn start_all(
        &self,
        configs: &[McpServerConfig],
        skip_unavailable: bool,
    ) -> Result<()> {
        for config in configs {
            if let Err(e) = self.register_server(config.clone()).await {
                if skip_unavailable {
                    warn!("Skipping MCP server {}: {:#}", config.name, e);
                    continue;
                }
                self.stop_all().await?;
                return Err(e);
            }
        }

        info!("{} MCP servers running", self.get_server_count().await);
        Ok(())
    }

    pub async fn list_all_tools(&self) -> Vec<(String, Vec<Tool>)> {
        let servers = self.servers.read().await;
        servers
            .iter()
            .map(|s| (s.name().to_string(), s.get_tools().to_vec()))
            .collect()
    }

    /// Name of the server that owns `tool_name`.
    pub async fn find_tool(&self, tool_name: &str) -> Option<String> {
        let servers = self.servers.read().await;
        servers
            .iter()
            .find(|s| s.has_tool(tool_name))
            .map(|s| s.name().to_string())
    }

    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolOutput> {
        let server_name = self
            .find_tool(tool_name)
            .await
            .ok_or_else(|| anyhow::anyhow!("Tool '{}' not found", tool_name))?;

        debug!("Calling tool '{}' on server '{}'", tool_name, server_name);

        let servers = self.servers.read().await;
        let server = servers
            .iter()
            .find(|s| s.name() == server_name)
            .ok_or_else(|| anyhow::anyhow!("Server '{}' not found", server_name))?;

        server.call_tool(tool_name, arguments).await
    }

    pub async fn stop_all(&self) -> Result<()> {
        let mut servers = self.servers.write().await;

        for server in servers.iter_mut() {
            server.stop().await?;
        }

        servers.clear();
        Ok(())
    }

    pub async fn get_server_count(&self) -> usize {
        self.servers.read().await.len()
    }
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new()
    }
}
