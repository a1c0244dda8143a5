//! Raw landing zone
//!
//! Raw files are immutable and content-addressed: stored once under
//! `<raw_dir>/<dataset>/<yyyy-mm-dd>/<sha256><ext>` and never overwritten.
//! The processing pipeline treats a [`RawFileReference`] as opaque and
//! re-fetchable; fetching re-verifies the recorded digest so silent
//! corruption surfaces as a retryable failure instead of bad curated data.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tdp_common::checksum::{sha256_bytes, sha256_file, verify_sha256};
use tdp_common::naming::normalize_dataset_name;
use tdp_common::{Result, TdpError};
use tracing::debug;

use crate::config::{IngestConfig, ALLOWED_FILE_EXTS};

/// A stable reference to a raw artifact, as recorded on the ingestion record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFileReference {
    pub path: String,
    pub sha256: String,
    pub generation: Option<i64>,
}

/// Result of landing a file in the raw zone.
#[derive(Debug, Clone)]
pub struct StoredRaw {
    pub filename: String,
    pub file_ext: String,
    pub sha256: String,
    pub raw_path: PathBuf,
}

/// Extract and validate the lowercased extension of an incoming filename.
pub fn validated_extension(filename: &str) -> Result<String> {
    let ext = Path::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default();
    if ALLOWED_FILE_EXTS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(TdpError::UnsupportedFileType(format!(
            "{ext:?} (allowed: {})",
            ALLOWED_FILE_EXTS.join(", ")
        )))
    }
}

/// Copy a local file into the raw landing zone.
pub fn store_raw_file(config: &IngestConfig, dataset: &str, src: &Path) -> Result<StoredRaw> {
    let filename = src
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .ok_or_else(|| TdpError::Parse(format!("not a file path: {}", src.display())))?;
    let ext = validated_extension(&filename)?;

    let size = std::fs::metadata(src)?.len();
    check_size(config, size)?;

    let sha = sha256_file(src)?;
    let raw_path = destination(config, dataset, &sha, &ext)?;

    if !raw_path.exists() {
        std::fs::copy(src, &raw_path)?;
    }

    debug!(%dataset, sha256 = %sha, raw_path = %raw_path.display(), "raw file landed");
    Ok(StoredRaw { filename, file_ext: ext, sha256: sha, raw_path })
}

/// Write an uploaded byte buffer into the raw landing zone.
pub fn store_raw_bytes(
    config: &IngestConfig,
    dataset: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<StoredRaw> {
    let ext = validated_extension(filename)?;
    check_size(config, bytes.len() as u64)?;

    let sha = sha256_bytes(bytes);
    let raw_path = destination(config, dataset, &sha, &ext)?;

    if !raw_path.exists() {
        std::fs::write(&raw_path, bytes)?;
    }

    debug!(%dataset, sha256 = %sha, raw_path = %raw_path.display(), "raw upload landed");
    Ok(StoredRaw {
        filename: filename.to_string(),
        file_ext: ext,
        sha256: sha,
        raw_path,
    })
}

/// Resolve a raw reference to a readable local path, verifying its digest.
pub fn fetch(reference: &RawFileReference) -> Result<PathBuf> {
    let path = PathBuf::from(&reference.path);
    if !path.exists() {
        return Err(TdpError::Parse(format!("raw artifact missing: {}", path.display())));
    }
    verify_sha256(&path, &reference.sha256)?;
    Ok(path)
}

fn check_size(config: &IngestConfig, size_bytes: u64) -> Result<()> {
    let max_bytes = config.max_file_bytes();
    if size_bytes > max_bytes {
        return Err(TdpError::FileTooLarge { size_bytes, max_bytes });
    }
    Ok(())
}

fn destination(config: &IngestConfig, dataset: &str, sha: &str, ext: &str) -> Result<PathBuf> {
    let dataset = normalize_dataset_name(dataset)?;
    let day = Utc::now().format("%Y-%m-%d").to_string();
    let dir = config.raw_data_dir.join(dataset).join(day);
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(format!("{sha}{ext}")))
}
