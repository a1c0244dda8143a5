//! Trigger a reclaim sweep for stuck ingestions

use crate::client::ApiClient;
use crate::Result;

pub async fn run(
    client: &ApiClient,
    older_than_seconds: Option<i64>,
    limit: Option<i64>,
) -> Result<()> {
    let outcome = client.reclaim(older_than_seconds, limit).await?;
    let count = outcome["reclaimed"].as_u64().unwrap_or(0);
    if count == 0 {
        println!("nothing stuck");
    } else {
        println!("reclaimed {count} ingestion(s):");
        if let Some(ids) = outcome["ingestion_ids"].as_array() {
            for id in ids {
                println!("  {}", id.as_str().unwrap_or("?"));
            }
        }
    }
    Ok(())
}
