//! Local helper tools offered to the model next to the MCP tools:
//! `file_read`, `file_write` and `shell`.

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::executor::ToolExecutor;
use crate::llm::ToolSpec;
use crate::mcp::ToolOutput;

pub const FILE_READ: &str = "file_read";
pub const FILE_WRITE: &str = "file_write";
pub const SHELL: &str = "shell";

pub fn is_builtin(name: &str) -> bool {
    matches!(name, FILE_READ | FILE_WRITE | SHELL)
}

pub fn specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: FILE_READ.to_string(),
            description: "Read files. Modes: 'view' returns the whole file, 'lines' a line range, \
                          'find' lists files matching a glob pattern, 'search' finds text with \
                          surrounding context, 'stats' reports size and line count."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File or directory path, or a glob pattern in 'find' mode"},
                    "mode": {"type": "string", "enum": ["view", "lines", "find", "search", "stats"], "default": "view"},
                    "start_line": {"type": "integer", "description": "First line (1-based) for 'lines' mode"},
                    "end_line": {"type": "integer", "description": "Last line (inclusive) for 'lines' mode"},
                    "search_pattern": {"type": "string", "description": "Text to look for in 'search' mode"},
                    "context_lines": {"type": "integer", "default": 2}
                },
                "required": ["path"]
            }),
        },
        ToolSpec {
            name: FILE_WRITE.to_string(),
            description: "Write content to a file, creating parent directories as needed."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }),
        },
        ToolSpec {
            name: SHELL.to_string(),
            description: "Run shell commands. A list of commands runs in order and stops at the \
                          first failure unless ignore_errors is set."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "oneOf": [
                            {"type": "string"},
                            {"type": "array", "items": {"type": "string"}}
                        ]
                    },
                    "work_dir": {"type": "string"},
                    "timeout": {"type": "integer", "description": "Seconds per command", "default": 900},
                    "ignore_errors": {"type": "boolean", "default": false}
                },
                "required": ["command"]
            }),
        },
    ]
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum ReadMode {
    #[default]
    View,
    Lines,
    Find,
    Search,
    Stats,
}

#[derive(Debug, Deserialize)]
struct FileReadInput {
    path: String,
    #[serde(default)]
    mode: ReadMode,
    start_line: Option<usize>,
    end_line: Option<usize>,
    search_pattern: Option<String>,
    #[serde(default = "default_context_lines")]
    context_lines: usize,
}

fn default_context_lines() -> usize {
    2
}

#[derive(Debug, Deserialize)]
struct FileWriteInput {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Commands {
    One(String),
    Many(Vec<String>),
}

impl Commands {
    fn into_vec(self) -> Vec<String> {
        match self {
            Commands::One(c) => vec![c],
            Commands::Many(cs) => cs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShellInput {
    command: Commands,
    work_dir: Option<String>,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default)]
    ignore_errors: bool,
}

fn default_timeout() -> u64 {
    900
}

/// Run a built-in tool. Bad input and denied operations come back as error
/// output so the model can react to them.
pub async fn dispatch(
    executor: &ToolExecutor,
    name: &str,
    input: &serde_json::Value,
) -> ToolOutput {
    let result = match name {
        FILE_READ => file_read(executor, input).await,
        FILE_WRITE => file_write(executor, input).await,
        SHELL => shell(executor, input).await,
        other => Err(anyhow::anyhow!("Unknown built-in tool: {}", other)),
    };

    match result {
        Ok(output) => output,
        Err(e) => ToolOutput {
            text: format!("Error: {:#}", e),
            is_error: true,
        },
    }
}

fn ok(text: impl Into<String>) -> Result<ToolOutput> {
    Ok(ToolOutput {
        text: text.into(),
        is_error: false,
    })
}

async fn file_read(executor: &ToolExecutor, input: &serde_json::Value) -> Result<ToolOutput> {
    let input: FileReadInput = serde_json::from_value(input.clone())?;

    match input.mode {
        ReadMode::View => ok(executor.read_file(&input.path).await?),
        ReadMode::Lines => ok(executor
            .read_lines(&input.path, input.start_line, input.end_line)
            .await?),
        ReadMode::Find => {
            let found = executor.find_files(&input.path).await?;
            if found.is_empty() {
                ok(format!("No files match {}", input.path))
            } else {
                ok(found.join("\n"))
            }
        }
        ReadMode::Search => {
            let pattern = input
                .search_pattern
                .ok_or_else(|| anyhow::anyhow!("search mode requires search_pattern"))?;
            let matches = executor
                .search_files(&input.path, &pattern, input.context_lines)
                .await?;
            if matches.is_empty() {
                ok(format!("No matches for '{}'", pattern))
            } else {
                ok(matches.join("\n--\n"))
            }
        }
        ReadMode::Stats => ok(executor.file_stats(&input.path).await?),
    }
}

async fn file_write(executor: &ToolExecutor, input: &serde_json::Value) -> Result<ToolOutput> {
    let input: FileWriteInput = serde_json::from_value(input.clone())?;
    executor.write_file(&input.path, &input.content).await?;
    ok(format!(
        "Wrote {} bytes to {}",
        input.content.len(),
        input.path
    ))
}

async fn shell(executor: &ToolExecutor, input: &serde_json::Value) -> Result<ToolOutput> {
    let input: ShellInput = serde_json::from_value(input.clone())?;
    let work_dir = input.work_dir.as_deref().unwrap_or(".");
    let timeout = Duration::from_secs(input.timeout);

    let mut sections = Vec::new();
    let mut failed = false;

    for command in input.command.into_vec() {
        let output = executor
            .execute_shell(&command, work_dir, Some(timeout))
            .await?;
        sections.push(format!("$ {}\n{}", command, output.render()));

        if !output.success() {
            failed = true;
            if !input.ignore_errors {
                break;
            }
        }
    }

    Ok(ToolOutput {
        text: sections.join("\n"),
        is_error: failed && !input.ignore_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_specs_are_objects() {
        let specs = specs();
        assert_eq!(specs.len(), 3);
        for spec in &specs {
            assert!(is_builtin(&spec.name));
            assert_eq!(spec.input_schema["type"], "object");
        }
        assert!(!is_builtin("invoke_project"));
    }

    #[tokio::test]
    async fn test_write_then_view() {
        let dir = tempdir().unwrap();
        let executor = ToolExecutor::new(dir.path());

        let written = dispatch(
            &executor,
            FILE_WRITE,
            &json!({"path": "data/output/fig1.csv", "content": "x,y\n1,2\n"}),
        )
        .await;
        assert!(!written.is_error, "{}", written.text);

        let read = dispatch(&executor, FILE_READ, &json!({"path": "data/output/fig1.csv"})).await;
        assert_eq!(read.text, "x,y\n1,2\n");
    }

    #[tokio::test]
    async fn test_bad_input_is_error_output() {
        let dir = tempdir().unwrap();
        let executor = ToolExecutor::new(dir.path());

        let output = dispatch(&executor, FILE_WRITE, &json!({"path": "a.txt"})).await;
        assert!(output.is_error);

        let output = dispatch(&executor, FILE_READ, &json!({"path": "missing.txt"})).await;
        assert!(output.is_error);

        let output = dispatch(
            &executor,
            FILE_READ,
            &json!({"path": ".", "mode": "search"}),
        )
        .await;
        assert!(output.is_error);
        assert!(output.text.contains("search_pattern"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_sequence_stops_on_failure() {
        let dir = tempdir().unwrap();
        let executor = ToolExecutor::new(dir.path());

        let output = dispatch(
            &executor,
            SHELL,
            &json!({"command": ["echo first", "false", "echo never"]}),
        )
        .await;
        assert!(output.is_error);
        assert!(output.text.contains("first"));
        assert!(!output.text.contains("never"));

        let output = dispatch(
            &executor,
            SHELL,
            &json!({"command": ["false", "echo after"], "ignore_errors": true}),
        )
        .await;
        assert!(!output.is_error);
        assert!(output.text.contains("after"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_single_command() {
        let dir = tempdir().unwrap();
        let executor = ToolExecutor::new(dir.path());

        let output = dispatch(&executor, SHELL, &json!({"command": "echo hello"})).await;
        assert!(!output.is_error);
        assert!(output.text.contains("hello"));
    }
}
