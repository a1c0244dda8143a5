//! Thin HTTP client for the TDP server API

use reqwest::multipart;
use serde_json::Value as JsonValue;
use std::path::Path;
use uuid::Uuid;

use crate::error::{CliError, Result};

/// API client carrying the base URL and optional shared-secret tokens.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    ingest_token: Option<String>,
    task_token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, ingest_token: Option<String>, task_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ingest_token,
            task_token,
            http: reqwest::Client::new(),
        }
    }

    /// Upload a file for ingestion. Returns the server's acknowledgment.
    pub async fn submit(
        &self,
        dataset: &str,
        file: &Path,
        source: Option<&str>,
    ) -> Result<JsonValue> {
        let filename = file
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .ok_or_else(|| CliError::Usage(format!("not a file path: {}", file.display())))?;
        let bytes = tokio::fs::read(file).await?;

        let mut form = multipart::Form::new()
            .text("dataset", dataset.to_string())
            .part("file", multipart::Part::bytes(bytes).file_name(filename));
        if let Some(source) = source {
            form = form.text("source", source.to_string());
        }

        let mut request = self
            .http
            .post(format!("{}/api/ingest/upload", self.base_url))
            .multipart(form);
        if let Some(ref token) = self.ingest_token {
            request = request.header("x-ingest-token", token);
        }

        Self::into_json(request.send().await?).await
    }

    /// Replay an ingestion.
    pub async fn replay(&self, ingestion_id: Uuid) -> Result<JsonValue> {
        let mut request = self
            .http
            .post(format!("{}/api/ingestions/{ingestion_id}/replay", self.base_url));
        if let Some(ref token) = self.ingest_token {
            request = request.header("x-ingest-token", token);
        }
        Self::into_json(request.send().await?).await
    }

    /// Trigger a reclaim sweep.
    pub async fn reclaim(
        &self,
        older_than_seconds: Option<i64>,
        limit: Option<i64>,
    ) -> Result<JsonValue> {
        let mut request = self
            .http
            .post(format!("{}/api/ops/reclaim", self.base_url))
            .json(&serde_json::json!({
                "older_than_seconds": older_than_seconds,
                "limit": limit,
            }));
        if let Some(ref token) = self.task_token {
            request = request.header("x-task-token", token);
        }
        Self::into_json(request.send().await?).await
    }

    /// List recent ingestions.
    pub async fn list_ingestions(
        &self,
        dataset: Option<&str>,
        status: Option<&str>,
        limit: i64,
    ) -> Result<JsonValue> {
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(dataset) = dataset {
            query.push(("dataset", dataset.to_string()));
        }
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }

        let request = self
            .http
            .get(format!("{}/api/ingestions", self.base_url))
            .query(&query);
        Self::into_json(request.send().await?).await
    }

    async fn into_json(response: reqwest::Response) -> Result<JsonValue> {
        let status = response.status();
        let body: JsonValue = response.json().await.unwrap_or(JsonValue::Null);
        if status.is_success() {
            Ok(body)
        } else {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown server error")
                .to_string();
            Err(CliError::Api { status: status.as_u16(), message })
        }
    }
}
