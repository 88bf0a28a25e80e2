use anyhow::{Context, Result};
use globset::Glob;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::permissions::PermissionManager;

/// Upper bound on matches returned by `find_files` and `search_files`.
const MAX_MATCHES: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct ShellOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn render(&self) -> String {
        if self.timed_out {
            return format!("Command timed out: {}", self.command);
        }
        if self.success() {
            return self.stdout.clone();
        }
        format!(
            "Command failed (exit code {}):\nStdout: {}\nStderr: {}",
            self.exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.stdout,
            self.stderr
        )
    }
}

pub struct ToolExecutor {
    base_path: PathBuf,
    permission_manager: Option<Arc<PermissionManager>>,
}

impl ToolExecutor {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            permission_manager: None,
        }
    }

    pub fn with_permissions(mut self, permission_manager: Arc<PermissionManager>) -> Self {
        self.permission_manager = Some(permission_manager);
        self
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    pub async fn read_file(&self, path: &str) -> Result<String> {
        let full_path = self.resolve_path(path);
        debug!("Reading file: {:?}", full_path);

        fs::read_to_string(&full_path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", full_path))
    }

    /// Lines `start..=end` (1-based), each prefixed with its number.
    pub async fn read_lines(
        &self,
        path: &str,
        start: Option<usize>,
        end: Option<usize>,
    ) -> Result<String> {
        let content = self.read_file(path).await?;
        let start = start.unwrap_or(1).max(1);
        let end = end.unwrap_or(usize::MAX);

        if start > end {
            anyhow::bail!("start_line {} is after end_line {}", start, end);
        }

        let selected = content
            .lines()
            .enumerate()
            .skip(start - 1)
            .take_while(|(i, _)| i + 1 <= end)
            .map(|(i, line)| format!("{:>6} | {}", i + 1, line))
            .collect::<Vec<_>>();

        Ok(selected.join("\n"))
    }

    /// Files under the working directory whose relative path matches `pattern`.
    pub async fn find_files(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = Glob::new(pattern)
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?
            .compile_matcher();
        let base = self.base_path.clone();
        debug!("Finding '{}' under {:?}", pattern, base);

        let matches = tokio::task::spawn_blocking(move || {
            WalkDir::new(&base)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| {
                    let relative = e.path().strip_prefix(&base).ok()?;
                    matcher
                        .is_match(relative)
                        .then(|| relative.to_string_lossy().to_string())
                })
                .take(MAX_MATCHES)
                .collect::<Vec<_>>()
        })
        .await?;

        Ok(matches)
    }

    /// Lines containing `pattern` under `base_path`, with `context_lines` of surrounding text.
    pub async fn search_files(
        &self,
        base_path: &str,
        pattern: &str,
        context_lines: usize,
    ) -> Result<Vec<String>> {
        let full_path = self.resolve_path(base_path);
        let pattern = pattern.to_string();
        debug!("Searching for pattern '{}' in: {:?}", pattern, full_path);

        let matches = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();

            for entry in WalkDir::new(&full_path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let Ok(content) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };

                let lines: Vec<&str> = content.lines().collect();
                for (i, line) in lines.iter().enumerate() {
                    if !line.contains(pattern.as_str()) {
                        continue;
                    }
                    let from = i.saturating_sub(context_lines);
                    let to = (i + context_lines).min(lines.len() - 1);
                    let snippet = (from..=to)
                        .map(|j| format!("{}:{}: {}", entry.path().display(), j + 1, lines[j]))
                        .collect::<Vec<_>>()
                        .join("\n");
                    matches.push(snippet);

                    if matches.len() >= MAX_MATCHES {
                        return matches;
                    }
                }
            }

            matches
        })
        .await?;

        Ok(matches)
    }

    pub async fn file_stats(&self, path: &str) -> Result<String> {
        let full_path = self.resolve_path(path);
        let metadata = fs::metadata(&full_path)
            .await
            .with_context(|| format!("Failed to stat: {:?}", full_path))?;

        if metadata.is_dir() {
            let mut entries = fs::read_dir(&full_path).await?;
            let mut count = 0usize;
            while entries.next_entry().await?.is_some() {
                count += 1;
            }
            return Ok(format!("{}: directory, {} entries", path, count));
        }

        let lines = match fs::read_to_string(&full_path).await {
            Ok(content) => content.lines().count().to_string(),
            Err(_) => "n/a (binary)".to_string(),
        };

        Ok(format!(
            "{}: file, {} bytes, {} lines",
            path,
            metadata.len(),
            lines
        ))
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let full_path = self.resolve_path(path);

        if let Some(ref pm) = self.permission_manager {
            if !pm.request_file_write(path, content) {
                warn!("File write denied by user: {:?}", full_path);
                anyhow::bail!("File write permission denied by user");
            }
        }

        debug!("Writing file: {:?}", full_path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&full_path, content)
            .await
            .with_context(|| format!("Failed to write file: {:?}", full_path))
    }

    pub async fn execute_shell(
        &self,
        command: &str,
        working_dir: &str,
        timeout: Option<Duration>,
    ) -> Result<ShellOutput> {
        let full_working_dir = self.resolve_path(working_dir);

        if let Some(ref pm) = self.permission_manager {
            if !pm.request_shell_execution(command) {
                warn!("Shell execution denied by user: {}", command);
                anyhow::bail!("Shell execution permission denied by user");
            }
        }

        info!(
            "Executing shell command: {} in {:?}",
            command, full_working_dir
        );

        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        };
        cmd.current_dir(&full_working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let run = cmd.output();
        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(output) => output?,
                Err(_) => {
                    warn!("Shell command timed out after {:?}: {}", limit, command);
                    return Ok(ShellOutput {
                        command: command.to_string(),
                        stdout: String::new(),
                        stderr: String::new(),
                        exit_code: None,
                        timed_out: true,
                    });
                }
            },
            None => run.await?,
        };

        Ok(ShellOutput {
            command: command.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            timed_out: false,
        })
    }
}
