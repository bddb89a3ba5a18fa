//! Tool-calling peer agent
//!
//! Wraps an MCP tool server in a decision loop and serves it over A2A, or
//! answers a single question locally with `--question`.

use clap::Parser;
use financial_a2a_orchestrator::{
    api::{peer_card, start_server, ApiState},
    completion::GeminiCompletion,
    models::AgentSkill,
    transport::{McpToolTransport, ToolBinding},
    AgentConfig, ToolAgent,
};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(
    name = "peer-agent",
    about = "Serve a tool-calling finance agent over A2A",
    version
)]
struct Cli {
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value_t = 9999)]
    port: u16,

    /// Environment file with API keys and limits
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// MCP tool server endpoint (HTTP+SSE)
    #[arg(long)]
    mcp_url: Option<String>,

    /// MCP tool server command and its arguments, run as a subprocess
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    mcp_cmd: Option<Vec<String>>,

    #[arg(long, default_value = "Financial Balance Sheet Agent")]
    name: String,

    #[arg(
        long,
        default_value = "Answers questions about the balance sheets of listed companies"
    )]
    description: String,

    /// Skill advertised on the agent card
    #[arg(long, default_value = "Balance Sheet Analysis")]
    skill: String,

    /// Example question for the skill (repeatable)
    #[arg(long = "example")]
    examples: Vec<String>,

    /// Answer this question locally instead of serving
    #[arg(short, long)]
    question: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = dotenv::from_path(&cli.env_file) {
        debug!(path = %cli.env_file.display(), "No env file loaded: {}", e);
    }

    let config = AgentConfig::from_env()?;
    let binding = ToolBinding::from_parts(cli.mcp_url, cli.mcp_cmd)?;
    info!(binding = ?binding, max_tool_iterations = config.max_tool_iterations, "Starting peer agent");

    let completion = Arc::new(GeminiCompletion::from_config(&config)?);
    let transport = Arc::new(McpToolTransport::new(binding)?);
    let agent = ToolAgent::with_tools(completion, transport, &config);

    if let Some(question) = cli.question {
        let mut chunks = agent.stream(question);
        let mut stdout = std::io::stdout();
        while let Some(chunk) = chunks.next().await {
            if chunk.is_task_complete {
                break;
            }
            write!(stdout, "{}", chunk.content)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
        return Ok(());
    }

    let skill = AgentSkill {
        id: cli.skill.to_lowercase().replace(' ', "_"),
        name: cli.skill,
        description: cli.description.clone(),
        tags: vec!["finance".to_string()],
        examples: cli.examples,
    };
    let card = peer_card(
        cli.name,
        cli.description,
        format!("http://{}:{}/", cli.host, cli.port),
        vec![skill],
    );

    start_server(ApiState::new(agent, card), &cli.host, cli.port).await?;
    Ok(())
}
