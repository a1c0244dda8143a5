//! Show recent ingestions

use crate::client::ApiClient;
use crate::Result;

pub async fn run(
    client: &ApiClient,
    dataset: Option<&str>,
    status: Option<&str>,
    limit: i64,
) -> Result<()> {
    let body = client.list_ingestions(dataset, status, limit).await?;
    let Some(records) = body["ingestions"].as_array() else {
        println!("no ingestions");
        return Ok(());
    };
    if records.is_empty() {
        println!("no ingestions");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {:<20}  {:<20}  attempts={}  {}",
            record["id"].as_str().unwrap_or("?"),
            record["dataset"].as_str().unwrap_or("?"),
            record["status"].as_str().unwrap_or("?"),
            record["processing_attempts"],
            record["error"].as_str().unwrap_or(""),
        );
    }
    Ok(())
}
