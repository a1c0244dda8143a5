//! CLI error types

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Tdp(#[from] tdp_common::TdpError),

    #[error("Contract error: {0}")]
    Contract(#[from] tdp_ingest::contracts::ContractError),

    #[error("{0}")]
    Usage(String),
}
