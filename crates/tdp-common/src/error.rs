//! Error types for TDP

use thiserror::Error;

/// Result type alias for TDP operations
pub type Result<T> = std::result::Result<T, TdpError>;

/// Main error type for TDP
#[derive(Error, Debug)]
pub enum TdpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Invalid dataset name: {0}")]
    InvalidDataset(String),

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("File too large: {size_bytes} bytes exceeds limit of {max_bytes} bytes")]
    FileTooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
