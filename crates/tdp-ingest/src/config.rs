//! Ingestion engine configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::contracts::DriftPolicy;

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default root of the immutable raw landing zone.
pub const DEFAULT_RAW_DATA_DIR: &str = "/data/raw";

/// Default directory holding per-dataset contract documents.
pub const DEFAULT_CONTRACTS_DIR: &str = "/data/contracts";

/// Default maximum raw file size in megabytes.
pub const DEFAULT_MAX_FILE_MB: u64 = 50;

/// Default heartbeat TTL before a PROCESSING ingestion counts as stuck.
pub const DEFAULT_PROCESSING_TTL_SECS: i64 = 900;

/// Default cap on rows reclaimed per sweep, so a sweep cannot become a
/// long-running lock contender.
pub const DEFAULT_RECLAIM_MAX_PER_RUN: i64 = 50;

/// Default cap on how many times one ingestion may be claimed. Safety valve
/// for pathological inputs that always fail, so the queue cannot churn
/// forever.
pub const DEFAULT_MAX_PROCESSING_ATTEMPTS: i32 = 5;

/// Default number of rows per curated insert batch. One batch is the
/// atomicity unit of the underlying store, so this also bounds how much work
/// a transaction rollback discards.
pub const DEFAULT_LOAD_BATCH_SIZE: usize = 500;

/// File extensions accepted into the raw landing zone.
pub const ALLOWED_FILE_EXTS: &[&str] = &[".csv", ".xlsx", ".xls"];

/// Ingestion engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Root of the immutable raw landing zone
    pub raw_data_dir: PathBuf,
    /// Directory holding `<dataset>.yaml` contract documents
    pub contracts_dir: PathBuf,
    /// Maximum accepted raw file size in megabytes
    pub max_file_mb: u64,
    /// Drift policy applied when a contract does not declare one
    pub drift_policy_default: DriftPolicy,
    /// Heartbeat TTL in seconds before a PROCESSING ingestion is reclaimable
    pub processing_ttl_secs: i64,
    /// Maximum ingestions reclaimed per sweep
    pub reclaim_max_per_run: i64,
    /// Maximum processing attempts before FAILED_MAX_ATTEMPTS
    pub max_processing_attempts: i32,
    /// Rows per curated insert batch
    pub load_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            raw_data_dir: PathBuf::from(DEFAULT_RAW_DATA_DIR),
            contracts_dir: PathBuf::from(DEFAULT_CONTRACTS_DIR),
            max_file_mb: DEFAULT_MAX_FILE_MB,
            drift_policy_default: DriftPolicy::Warn,
            processing_ttl_secs: DEFAULT_PROCESSING_TTL_SECS,
            reclaim_max_per_run: DEFAULT_RECLAIM_MAX_PER_RUN,
            max_processing_attempts: DEFAULT_MAX_PROCESSING_ATTEMPTS,
            load_batch_size: DEFAULT_LOAD_BATCH_SIZE,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `RAW_DATA_DIR`, `CONTRACTS_DIR`
    /// - `MAX_FILE_MB`
    /// - `DRIFT_POLICY_DEFAULT` (warn|fail|allow)
    /// - `PROCESSING_TTL_SECONDS`, `RECLAIM_MAX_PER_RUN`
    /// - `MAX_PROCESSING_ATTEMPTS`
    /// - `LOAD_BATCH_SIZE`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("RAW_DATA_DIR") {
            config.raw_data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CONTRACTS_DIR") {
            config.contracts_dir = PathBuf::from(dir);
        }
        if let Some(v) = env_parse("MAX_FILE_MB") {
            config.max_file_mb = v;
        }
        if let Ok(policy) = std::env::var("DRIFT_POLICY_DEFAULT") {
            if let Ok(p) = policy.parse() {
                config.drift_policy_default = p;
            }
        }
        if let Some(v) = env_parse("PROCESSING_TTL_SECONDS") {
            config.processing_ttl_secs = v;
        }
        if let Some(v) = env_parse("RECLAIM_MAX_PER_RUN") {
            config.reclaim_max_per_run = v;
        }
        if let Some(v) = env_parse::<i32>("MAX_PROCESSING_ATTEMPTS") {
            config.max_processing_attempts = v.max(1);
        }
        if let Some(v) = env_parse("LOAD_BATCH_SIZE") {
            config.load_batch_size = v;
        }

        config
    }

    /// Maximum accepted raw file size in bytes.
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb * 1024 * 1024
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
