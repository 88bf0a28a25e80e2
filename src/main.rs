mod agent;
mod config;
mod llm;
mod mcp;
mod permissions;
mod prompts;
mod tools;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use agent::{Agent, AgentSettings, ToolRegistry};
use config::AgentConfig;
use llm::{BedrockClient, LlmClient};
use mcp::McpClient;
use permissions::{PermissionManager, PermissionMode};
use tools::ToolExecutor;

#[derive(Parser)]
#[command(name = "poster-agent")]
#[command(
    about = "Extract poster text and figure data with a Bedrock-hosted agent",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, help = "TOML config file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Bedrock model ID")]
    model: Option<String>,

    #[arg(long, help = "AWS region")]
    region: Option<String>,

    #[arg(long, help = "AWS named profile")]
    profile: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long, help = "Maximum model round-trips per instruction")]
    max_turns: Option<usize>,

    #[arg(short, long)]
    working_dir: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(
        long,
        help = "Allow all file writes and shell commands without prompting (USE WITH CAUTION)"
    )]
    allow_all: bool,

    #[arg(long, help = "Continue when a tool server fails to start")]
    skip_unavailable: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text and figure data from a poster PDF
    Extract {
        #[arg(long, default_value = prompts::DEFAULT_POSTER_PDF)]
        pdf: String,

        #[arg(long, default_value = prompts::DEFAULT_OUTPUT_DIR)]
        output_dir: String,
    },
    /// Send a free-form instruction to the agent
    Run { instruction: String },
    /// List the tools exposed by the configured servers
    Tools,
    /// Send follow-up instructions to one agent session
    Interactive,
}

impl Cli {
    fn agent_config(&self) -> Result<AgentConfig> {
        let mut config = match self.config {
            Some(ref path) => AgentConfig::load(path)?,
            None => AgentConfig::default(),
        };

        if let Some(ref model) = self.model {
            config.model.model_id = model.clone();
        }
        if let Some(ref region) = self.region {
            config.model.region = region.clone();
        }
        if let Some(ref profile) = self.profile {
            config.model.profile = Some(profile.clone());
        }
        if let Some(temperature) = self.temperature {
            config.model.temperature = temperature;
        }
        if let Some(max_turns) = self.max_turns {
            config.max_turns = max_turns;
        }
        if let Some(ref dir) = self.working_dir {
            config.working_dir = dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("poster_agent=debug,warn")
        } else {
            EnvFilter::new("poster_agent=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn build_agent(
    config: &AgentConfig,
    mcp: Arc<McpClient>,
    permission_manager: Arc<PermissionManager>,
) -> Agent {
    let executor = Arc::new(
        ToolExecutor::new(config.working_dir.clone()).with_permissions(permission_manager),
    );
    let registry = ToolRegistry::build(mcp, executor).await;
    info!("Agent tools: {}", registry.names().join(", "));
    let llm: Arc<dyn LlmClient> = Arc::new(BedrockClient::new(config.model.clone()));

    Agent::new(
        llm,
        registry,
        config.system_prompt(),
        AgentSettings::from(config),
    )
}

async fn print_tools(mcp: &McpClient) {
    println!("builtin:");
    for spec in tools::builtin::specs() {
        println!("  - {}", spec.name);
    }

    for (server, tools) in mcp.list_all_tools().await {
        println!("{}:", server);
        for tool in tools {
            println!(
                "  - {}: {}",
                tool.name,
                tool.description.as_deref().unwrap_or("No description")
            );
        }
    }
}

async fn run_once(agent: &mut Agent, instruction: &str) -> Result<()> {
    let response = agent.run(instruction).await?;
    debug!("Conversation holds {} messages", agent.messages().len());
    info!(
        "Stop reason: {:?}, tools called: {}",
        response.stop_reason,
        response.tool_calls.len()
    );
    println!("{}", response);
    Ok(())
}

async fn interactive(agent: &mut Agent) -> Result<()> {
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    eprintln!("Interactive mode - type 'exit' to quit");

    let mut rl = DefaultEditor::new()?;

    let history_path = std::env::var("HOME")
        .map(|h| format!("{}/.poster-agent-history.txt", h))
        .unwrap_or_else(|_| ".poster-agent-history.txt".to_string());

    let _ = rl.load_history(&history_path);

    loop {
        match rl.readline("\n> ") {
            Ok(line) => {
                let instruction = line.trim();

                if instruction.is_empty() {
                    continue;
                }

                if instruction == "exit" || instruction == "quit" {
                    break;
                }

                let _ = rl.add_history_entry(instruction);

                if let Err(e) = run_once(agent, instruction).await {
                    eprintln!("\nFailed to run instruction: {:#}", e);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

async fn dispatch(
    command: Commands,
    config: &AgentConfig,
    mcp: Arc<McpClient>,
    permission_manager: Arc<PermissionManager>,
) -> Result<()> {
    match command {
        Commands::Tools => {
            print_tools(&mcp).await;
            Ok(())
        }
        Commands::Extract { pdf, output_dir } => {
            let mut agent = build_agent(config, mcp, permission_manager).await;
            run_once(
                &mut agent,
                &prompts::extraction_instruction(&pdf, &output_dir),
            )
            .await
        }
        Commands::Run { instruction } => {
            let mut agent = build_agent(config, mcp, permission_manager).await;
            run_once(&mut agent, &instruction).await
        }
        Commands::Interactive => {
            let mut agent = build_agent(config, mcp, permission_manager).await;
            interactive(&mut agent).await
        }
    }
}

/// The poster must exist before any server is started.
fn poster_path(config: &AgentConfig, pdf: &str) -> Result<PathBuf> {
    let path = Path::new(&config.working_dir).join(pdf);
    if !path.is_file() {
        anyhow::bail!("Poster PDF not found: {}", path.display());
    }
    Ok(path)
}

/// Run `task` unless `interrupt` fires first, so the caller still gets to
/// shut its servers down.
async fn until_interrupted<T, I>(task: T, interrupt: I) -> Result<()>
where
    T: Future<Output = Result<()>>,
    I: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = task => result,
        signal = interrupt => {
            signal.context("Failed to listen for Ctrl-C")?;
            warn!("Interrupted, stopping MCP servers");
            anyhow::bail!("Interrupted")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.agent_config()?;

    if let Commands::Extract { ref pdf, .. } = cli.command {
        let path = poster_path(&config, pdf)?;
        debug!("Poster PDF: {}", path.display());
    }

    let permission_manager = Arc::new(PermissionManager::new(PermissionMode::resolve(
        cli.allow_all,
    )));
    if permission_manager.is_allow_all() {
        warn!("Running with blanket permissions: file writes and shell commands are not confirmed");
    }

    let mcp = Arc::new(McpClient::new().with_working_dir(&config.working_dir));
    mcp.start_all(&config.servers, cli.skip_unavailable)
        .await
        .context("Failed to start MCP servers")?;

    let result = until_interrupted(
        dispatch(cli.command, &config, mcp.clone(), permission_manager),
        tokio::signal::ctrl_c(),
    )
    .await;

    mcp.stop_all().await?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &Path) -> AgentConfig {
        AgentConfig {
            working_dir: dir.to_string_lossy().to_string(),
            ..AgentConfig::default()
        }
    }

    #[test]
    fn test_poster_path_requires_existing_file() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let err = poster_path(&config, prompts::DEFAULT_POSTER_PDF).unwrap_err();
        assert!(err.to_string().contains("Poster PDF not found"));

        let pdf = dir.path().join(prompts::DEFAULT_POSTER_PDF);
        std::fs::create_dir_all(pdf.parent().unwrap()).unwrap();
        std::fs::write(&pdf, b"%PDF-1.7").unwrap();
        assert_eq!(poster_path(&config, prompts::DEFAULT_POSTER_PDF).unwrap(), pdf);
    }

    #[test]
    fn test_poster_path_rejects_directory() {
        let dir = tempdir().unwrap();
        assert!(poster_path(&config_in(dir.path()), ".").is_err());
    }

    #[tokio::test]
    async fn test_interrupt_cancels_running_task() {
        let err = until_interrupted(std::future::pending(), async { Ok(()) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Interrupted"));
    }

    #[tokio::test]
    async fn test_finished_task_result_is_returned() {
        let result = until_interrupted(
            async { Err(anyhow::anyhow!("model call failed")) },
            std::future::pending(),
        )
        .await;
        assert!(result.unwrap_err().to_string().contains("model call failed"));

        assert!(until_interrupted(async { Ok(()) }, std::future::pending())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_interrupted_run_still_stops_servers() {
        let dir = tempdir().unwrap();
        let mcp = Arc::new(McpClient::new().with_working_dir(dir.path()));
        mcp.start_all(&[crate::mcp::test_support::stub_server("bda", &["invoke_project"])], false)
            .await
            .unwrap();

        let result = until_interrupted(std::future::pending(), async { Ok(()) }).await;
        mcp.stop_all().await.unwrap();

        assert!(result.is_err());
        assert_eq!(mcp.get_server_count().await, 0);
    }
}
