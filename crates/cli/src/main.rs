//! ragline CLI
//!
//! Thin front end over the chat engine: ask one question, chat
//! interactively, or load a document into a namespace.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, LoadCommand};
use ragline_core::config::{AppConfig, STATE_DIR};
use ragline_core::{logging, AppResult};
use std::path::PathBuf;
use tracing::Instrument;

/// ragline - streaming answers grounded in your documents
#[derive(Parser, Debug)]
#[command(name = "ragline")]
#[command(about = "Streaming retrieval-augmented answers per namespace", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGLINE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, openai, groq)
    #[arg(short, long, global = true, env = "RAGLINE_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "RAGLINE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask one question and stream the answer
    Ask(AskCommand),

    /// Interactive session over stdin
    Chat(ChatCommand),

    /// Load a text file into a namespace
    Load(LoadCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;

    // An explicit --config, or the config file of a --workspace other than
    // the one load() looked at
    let config_path = cli.config.clone().or_else(|| {
        cli.workspace
            .as_ref()
            .map(|w| w.join(STATE_DIR).join("config.yaml"))
            .filter(|p| p.exists())
    });
    if let Some(path) = config_path {
        if config.config_file.as_deref() != Some(path.as_path()) {
            config = config.with_config_file(&path)?;
        }
    }

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)?;

    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_state_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Load(_) => "load",
    };
    let span = tracing::info_span!("command", name = command_name);

    let result = async {
        match cli.command {
            Commands::Ask(cmd) => {
                config.validate()?;
                cmd.execute(&config).await
            }
            Commands::Chat(cmd) => {
                config.validate()?;
                cmd.execute(&config).await
            }
            Commands::Load(cmd) => cmd.execute(&config).await,
        }
    }
    .instrument(span)
    .await;

    match &result {
        Ok(_) => tracing::debug!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
