//! Submit a single file for ingestion

use std::path::Path;
use tracing::debug;

use crate::client::ApiClient;
use crate::Result;

pub async fn run(
    client: &ApiClient,
    dataset: &str,
    file: &Path,
    source: Option<&str>,
) -> Result<()> {
    debug!(%dataset, file = %file.display(), "submitting file");
    let ack = client.submit(dataset, file, source).await?;

    println!(
        "submitted {} -> ingestion {} ({})",
        file.display(),
        ack["ingestion_id"].as_str().unwrap_or("?"),
        ack["status"].as_str().unwrap_or("?"),
    );
    Ok(())
}
