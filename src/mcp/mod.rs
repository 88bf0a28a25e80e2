pub mod client;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::McpClient;
pub use server::{to_tool_spec, McpServerConfig, ToolOutput};
