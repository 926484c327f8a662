//! Kiln - buildpack layer cache restorer
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use kiln::cli::{Cli, Commands};
use kiln::config::ConfigManager;
use kiln::error::KilnResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let phase = cli.command.phase();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::from(e.exit_code(phase))
        }
    }
}

async fn run(cli: Cli) -> KilnResult<()> {
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // 0 = info, 1 = debug, 2+ = trace
    let filter = match cli.verbose {
        0 => EnvFilter::new("kiln=info"),
        1 => EnvFilter::new("kiln=debug"),
        _ => EnvFilter::new("kiln=trace"),
    };

    if config.general.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Restore(args) => kiln::cli::commands::restore(args, &config).await,
        Commands::ValidateStack(args) => kiln::cli::commands::validate_stack(args, &config).await,
    }
}
