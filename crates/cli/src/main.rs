//! Skiff CLI: the main entry point.
//!
//! Commands:
//! - `run`   : Run the agent on one prompt, streaming events as JSON lines
//! - `config`: Show, locate, or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "skiff",
    about = "Skiff: an autonomous tool-calling agent for your working directory",
    version
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
    /// Run the agent on a prompt
    Run {
        /// The prompt to send
        #[arg(short, long)]
        message: String,

        /// Working directory the tools are confined to (default: current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Session ID (default: a new session)
        #[arg(long, conflicts_with = "resume")]
        session: Option<String>,

        /// Continue the most recent session
        #[arg(long)]
        resume: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings with secrets redacted (default)
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // stdout carries the event stream, so logs go to stderr
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
        Commands::Run {
            message,
            cwd,
            session,
            resume,
        } => {
            commands::run::run(commands::run::RunArgs {
                message,
                cwd,
                session,
                resume,
            })
            .await?
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
        },
    }

    Ok(())
}
