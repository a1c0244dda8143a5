//! Validate a contract document locally

use std::path::Path;

use tdp_ingest::contracts::{fingerprint, parse_contract_yaml};

use crate::error::{CliError, Result};

pub async fn run(path: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(path).await?;
    let contract = parse_contract_yaml(&raw)?;
    let fp = fingerprint(&contract)
        .map_err(|e| CliError::Usage(format!("failed to fingerprint contract: {e}")))?;

    println!("contract ok: dataset={}", contract.dataset);
    println!("  columns: {}", contract.columns.len());
    if let Some(pk) = &contract.primary_key {
        println!("  primary_key: {pk}");
    }
    if let Some(policy) = contract.drift_policy {
        println!("  drift_policy: {policy}");
    }
    println!("  fingerprint: {fp}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_valid_contract_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.yaml");
        std::fs::write(&path, "dataset: parcels\ncolumns:\n  id: { type: string }\n").unwrap();
        assert!(run(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_contract_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.yaml");
        std::fs::write(&path, "dataset: parcels\ncolumns: {}\n").unwrap();
        assert!(matches!(run(&path).await, Err(CliError::Contract(_))));
    }
}
