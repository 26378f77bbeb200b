//! nodepack - Node.js buildpack staging
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use nodepack::cli::{Cli, Commands};
use nodepack::config::ConfigManager;
use nodepack::error::NodepackResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> NodepackResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("nodepack=warn"),
        1 => EnvFilter::new("nodepack=info"),
        _ => EnvFilter::new("nodepack=debug"),
    };

    // Buildpack log lines own stdout; diagnostics go to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    match cli.command {
        Commands::Stage(args) => nodepack::cli::commands::stage(args, &config).await,
        Commands::Resolve(args) => nodepack::cli::commands::resolve(args, &config).await,
        Commands::Cache(args) => nodepack::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            nodepack::cli::commands::config(args, &config_manager, &config).await
        }
    }
}
