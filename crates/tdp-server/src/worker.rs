//! Job definitions and worker for ingestion processing
//!
//! Defines the apalis job payload and the worker function that drives the
//! ingestion engine. The payload carries only the ingestion id - all other
//! state is re-read from the registry at claim time, which avoids
//! stale-payload bugs from messages that sat in the queue.

use apalis::prelude::*;
use apalis_postgres::PostgresStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use tdp_ingest::processor::{self, ProcessOutcome};
use tdp_ingest::IngestConfig;

/// "Process ingestion X" message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessIngestionJob {
    pub ingestion_id: Uuid,
    /// Timestamp when the job was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl ProcessIngestionJob {
    pub fn new(ingestion_id: Uuid) -> Self {
        Self { ingestion_id, enqueued_at: Utc::now() }
    }
}

/// Postgres-backed queue handle for ingestion jobs.
pub type JobQueue = PostgresStorage<ProcessIngestionJob>;

/// Shared context injected into worker jobs.
#[derive(Clone)]
pub struct WorkerContext {
    pub db: PgPool,
    pub ingest: IngestConfig,
}

/// Enqueue a processing job for an ingestion.
pub async fn enqueue(queue: &JobQueue, ingestion_id: Uuid) -> anyhow::Result<()> {
    let mut queue = queue.clone();
    queue.push(ProcessIngestionJob::new(ingestion_id)).await?;
    info!(%ingestion_id, "ingestion job enqueued");
    Ok(())
}

/// Process one queued ingestion job.
///
/// Delivery is at-least-once; the engine's claim makes redundant deliveries
/// no-ops, so every outcome except a registry outage maps to `Ok` here. A
/// registry outage propagates as `Err`, letting the queue redeliver later.
pub async fn process_ingestion_job(
    job: ProcessIngestionJob,
    ctx: Data<WorkerContext>,
) -> anyhow::Result<()> {
    let outcome = processor::process_ingestion(&ctx.db, &ctx.ingest, job.ingestion_id).await?;

    match &outcome {
        ProcessOutcome::Loaded { rows_loaded } => {
            info!(ingestion_id = %job.ingestion_id, rows_loaded, "ingestion job loaded");
        },
        other => {
            info!(ingestion_id = %job.ingestion_id, outcome = ?other, "ingestion job finished");
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_payload_round_trips() {
        let job = ProcessIngestionJob::new(Uuid::new_v4());
        let json = serde_json::to_string(&job).unwrap();
        let back: ProcessIngestionJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ingestion_id, job.ingestion_id);
    }
}
