//! TDP CLI Library
//!
//! Operator tooling for the tabular data platform: submit files, watch a drop
//! directory, validate contracts locally, and trigger replay/reclaim against
//! a running server.

pub mod client;
pub mod commands;
pub mod error;

pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// Default server URL for local development.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// TDP command-line interface
#[derive(Debug, Parser)]
#[command(name = "tdp", about = "Tabular data platform operator CLI", version)]
pub struct Cli {
    /// Server base URL
    #[arg(long, global = true, env = "TDP_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub server_url: String,

    /// Shared-secret ingest token (sent as X-Ingest-Token)
    #[arg(long, global = true, env = "INGEST_TOKEN")]
    pub ingest_token: Option<String>,

    /// Shared-secret ops token (sent as X-Task-Token)
    #[arg(long, global = true, env = "TASK_TOKEN")]
    pub task_token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit one tabular file for ingestion
    Submit {
        /// Target dataset name
        dataset: String,
        /// Path to the CSV/XLSX file
        file: PathBuf,
        /// Optional source label recorded on the ingestion
        #[arg(long)]
        source: Option<String>,
    },

    /// Watch a directory and submit new files as they appear
    Watch {
        /// Target dataset name
        dataset: String,
        /// Directory to poll for incoming files
        dir: PathBuf,
        /// Poll interval in seconds
        #[arg(long, default_value_t = 3)]
        poll_seconds: u64,
    },

    /// Validate a contract document locally
    Contract {
        /// Path to the contract YAML file
        path: PathBuf,
    },

    /// Replay a terminal ingestion (creates a new record)
    Replay {
        /// The ingestion id to replay
        ingestion_id: Uuid,
    },

    /// Reclaim ingestions stuck in PROCESSING
    Reclaim {
        /// Override the heartbeat TTL in seconds
        #[arg(long)]
        older_than_seconds: Option<i64>,
        /// Maximum records to reclaim
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show recent ingestions
    Status {
        /// Filter by dataset
        #[arg(long)]
        dataset: Option<String>,
        /// Filter by status group (received|processing|success|failed) or raw status
        #[arg(long)]
        status: Option<String>,
        /// Maximum records to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}
