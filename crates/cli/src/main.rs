use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kiln_core::target_manager::{TargetManager, TargetManagerConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

/// Kiln - run-once build automation
#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Run build targets whose dependencies execute at most once")]
#[command(version)]
struct Cli {
    /// Path to the target configuration file
    #[arg(short, long, default_value = "kiln.yml")]
    file: PathBuf,

    /// Show debug logs (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured targets
    List,
    /// Run a target
    Run {
        /// Target name, e.g. "test:unit"
        target: String,
        /// Positional arguments, exported to commands as KILN_ARG_0, KILN_ARG_1, ...
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print the JSON schema of the configuration file
    Schema,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_manager(file: PathBuf) -> Result<TargetManager> {
    tracing::debug!(config = %file.display(), "loading targets");
    TargetManager::new(TargetManagerConfig { config_path: file })
        .map_err(|e| anyhow::anyhow!("Failed to load targets: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::List => commands::list::execute(&load_manager(cli.file)?),
        Commands::Run { target, args } => {
            commands::run::execute(&load_manager(cli.file)?, &target, args).await
        }
        Commands::Schema => commands::schema::execute(),
    }
}
