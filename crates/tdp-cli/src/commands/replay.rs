//! Replay a terminal ingestion

use uuid::Uuid;

use crate::client::ApiClient;
use crate::Result;

pub async fn run(client: &ApiClient, ingestion_id: Uuid) -> Result<()> {
    let ack = client.replay(ingestion_id).await?;
    println!(
        "replayed {ingestion_id} -> new ingestion {}",
        ack["ingestion_id"].as_str().unwrap_or("?")
    );
    Ok(())
}
