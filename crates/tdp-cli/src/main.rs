//! TDP CLI - Main entry point

use clap::Parser;
use std::process;
use tdp_cli::{client::ApiClient, commands, Cli, Commands};
use tdp_common::logging::{init_logging, LogConfig, LogLevel};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag and environment
    let mut log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_file_prefix("tdp-cli");
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }

    // CLI should keep working even when logging cannot initialize
    let _ = init_logging(&log_config);

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> tdp_cli::Result<()> {
    let client = ApiClient::new(
        &cli.server_url,
        cli.ingest_token.clone(),
        cli.task_token.clone(),
    );

    match &cli.command {
        Commands::Submit { dataset, file, source } => {
            commands::submit::run(&client, dataset, file, source.as_deref()).await
        },

        Commands::Watch { dataset, dir, poll_seconds } => {
            commands::watch::run(&client, dataset, dir, *poll_seconds).await
        },

        Commands::Contract { path } => commands::contract::run(path).await,

        Commands::Replay { ingestion_id } => commands::replay::run(&client, *ingestion_id).await,

        Commands::Reclaim { older_than_seconds, limit } => {
            commands::reclaim::run(&client, *older_than_seconds, *limit).await
        },

        Commands::Status { dataset, status, limit } => {
            commands::status::run(&client, dataset.as_deref(), status.as_deref(), *limit).await
        },
    }
}
