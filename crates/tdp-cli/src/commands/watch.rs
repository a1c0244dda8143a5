//! Watch a drop directory and submit new files
//!
//! Polls a directory for files with an accepted extension, submits each to
//! the server, and moves successes into an `archived/` subdirectory so they
//! are not submitted twice. Failures stay in place and are retried on the
//! next pass.

use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use tdp_ingest::raw::validated_extension;

use crate::client::ApiClient;
use crate::error::{CliError, Result};

pub async fn run(client: &ApiClient, dataset: &str, dir: &Path, poll_seconds: u64) -> Result<()> {
    if !dir.is_dir() {
        return Err(CliError::Usage(format!("not a directory: {}", dir.display())));
    }
    let archive_dir = dir.join("archived");
    std::fs::create_dir_all(&archive_dir)?;

    println!(
        "watching {} for {dataset} files every {poll_seconds}s (Ctrl+C to stop)",
        dir.display()
    );

    loop {
        sweep_once(client, dataset, dir, &archive_dir).await?;
        tokio::time::sleep(Duration::from_secs(poll_seconds.max(1))).await;
    }
}

async fn sweep_once(
    client: &ApiClient,
    dataset: &str,
    dir: &Path,
    archive_dir: &Path,
) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().map(|f| f.to_string_lossy().to_string()) else {
            continue;
        };
        if validated_extension(&filename).is_err() {
            continue;
        }

        match client.submit(dataset, &path, Some("watcher")).await {
            Ok(ack) => {
                info!(
                    file = %path.display(),
                    ingestion_id = ack["ingestion_id"].as_str().unwrap_or("?"),
                    "file submitted"
                );
                println!(
                    "submitted {} -> {}",
                    filename,
                    ack["ingestion_id"].as_str().unwrap_or("?")
                );
                std::fs::rename(&path, archive_dir.join(&filename))?;
            },
            Err(e) => {
                warn!(file = %path.display(), error = %e, "submission failed; will retry");
            },
        }
    }
    Ok(())
}
