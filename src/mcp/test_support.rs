use std::collections::HashMap;

use super::server::McpServerConfig;

/// A stdio server from `tests/fixtures` exposing `tools`. Every call answers
/// with the server name and its working directory.
pub(crate) fn stub_server(name: &str, tools: &[&str]) -> McpServerConfig {
    let mut args = vec![
        concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/stub_mcp_server.sh").to_string(),
        name.to_string(),
    ];
    args.extend(tools.iter().map(|t| t.to_string()));

    McpServerConfig {
        name: name.to_string(),
        command: "sh".to_string(),
        args,
        env: HashMap::new(),
    }
}
