//! AlzAssist CLI — the main entry point.
//!
//! Commands:
//! - `ask`      — Answer one question with citations
//! - `chat`     — Interactive session that carries history between turns
//! - `tools`    — Print the tool specs offered to the reasoner
//! - `onboard`  — Write the default config
//! - `doctor`   — Diagnose configuration and providers

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "alzassist",
    about = "AlzAssist — citation-grounded Alzheimer's research assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single research question
    Ask {
        /// The question
        query: String,

        /// Override orchestrator.max_iterations
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Comma-separated tool subset for this session
        #[arg(long, value_delimiter = ',')]
        tools: Option<Vec<String>>,

        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive chat; each turn continues the previous history
    Chat {
        /// Override orchestrator.max_iterations
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Print the registered tool specs as JSON
    Tools,

    /// Initialize configuration
    Onboard,

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries answers only.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask {
            query,
            max_iterations,
            tools,
            json,
        } => commands::ask::run(query, max_iterations, tools, json).await?,
        Commands::Chat { max_iterations } => commands::chat::run(max_iterations).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
