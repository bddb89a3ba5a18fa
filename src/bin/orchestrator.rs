//! Multi-agent orchestrator CLI
//!
//! Resolves peer agents, runs the orchestration loop for one question and
//! renders the answer as it streams in.

use clap::{Parser, ValueEnum};
use financial_a2a_orchestrator::{
    completion::GeminiCompletion,
    tags::{Section, SectionTracker},
    transport::A2aTransport,
    AgentConfig, Orchestrator,
};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Print each section as it streams
    Streaming,
    /// Print the whole output once the run finishes
    Completion,
}

#[derive(Parser)]
#[command(
    name = "orchestrator",
    about = "Answer a finance question by consulting peer agents",
    version
)]
struct Cli {
    /// Question to answer
    #[arg(short, long)]
    question: String,

    /// Host of the default peer agent
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port of the default peer agent
    #[arg(long, default_value_t = 9999)]
    port: u16,

    /// Peer agent base URL (repeatable); defaults to http://{host}:{port}/
    #[arg(long = "agent-url")]
    agent_urls: Vec<String>,

    #[arg(long, value_enum, default_value_t = Mode::Streaming)]
    mode: Mode,

    /// Environment file with API keys and limits
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Prints only the text of each section that has not been printed yet
#[derive(Default)]
struct SectionPrinter {
    tracker: SectionTracker,
    printed: usize,
}

impl SectionPrinter {
    fn push(&mut self, content: &str, out: &mut impl Write) -> std::io::Result<()> {
        let updates = self.tracker.push(content);
        if updates.is_empty() {
            write!(out, "{}", content)?;
        }

        for update in updates {
            if update.opened {
                self.printed = 0;
                match &update.section {
                    Section::Main => writeln!(out, "\n[main agent]")?,
                    Section::Peer(name) => writeln!(out, "\n[{}]", name)?,
                    Section::Other(tag) => writeln!(out, "\n[{}]", tag)?,
                }
            }

            if let Some(fresh) = update.content.get(self.printed..) {
                write!(out, "{}", fresh)?;
            }
            self.printed = update.content.len();
        }
        out.flush()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // stdout carries the answer, logs go to stderr
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
    let agent_urls = if cli.agent_urls.is_empty() {
        vec![format!("http://{}:{}/", cli.host, cli.port)]
    } else {
        cli.agent_urls
    };

    info!(agents = ?agent_urls, max_agent_calls = config.max_agent_calls, "Starting orchestrator");

    let completion = Arc::new(GeminiCompletion::from_config(&config)?);
    let transport = Arc::new(A2aTransport::new(agent_urls)?);
    let orchestrator = Orchestrator::with_peers(completion, transport, &config);

    let mut chunks = orchestrator.stream(cli.question);
    let mut stdout = std::io::stdout();

    match cli.mode {
        Mode::Streaming => {
            let mut printer = SectionPrinter::default();
            while let Some(chunk) = chunks.next().await {
                if chunk.is_task_complete {
                    break;
                }
                printer.push(&chunk.content, &mut stdout)?;
            }
            writeln!(stdout)?;
        }
        Mode::Completion => {
            let mut output = String::new();
            while let Some(chunk) = chunks.next().await {
                if chunk.is_task_complete {
                    break;
                }
                output.push_str(&chunk.content);
            }
            writeln!(stdout, "{}", output)?;
        }
    }

    Ok(())
}
