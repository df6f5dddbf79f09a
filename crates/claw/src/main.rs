//! claw - autonomous coding agent

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{chat_command, init_command, run_command, status_command, telegram_command};

/// claw - an autonomous coding agent for your projects
#[derive(Parser)]
#[command(name = "claw")]
#[command(about = "◆ An autonomous coding agent for your projects")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive setup wizard
    Init,
    /// Run one task and exit
    Run {
        /// What the agent should do
        #[arg(required = true, num_args = 1..)]
        task: Vec<String>,
        /// Project directory (defaults to the configured root)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },
    /// Chat with the agent
    Chat {
        /// Project directory (defaults to the configured root)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },
    /// Serve the agent over a Telegram bot
    Telegram {
        /// Project directory (defaults to the configured root)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },
    /// Show configuration status
    Status,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => init_command().await.map(|_| true),
        Commands::Run { task, project } => run_command(task.join(" "), project).await,
        Commands::Chat { project } => chat_command(project).await.map(|_| true),
        Commands::Telegram { project } => telegram_command(project).await.map(|_| true),
        Commands::Status => status_command().await.map(|_| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("✗ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
