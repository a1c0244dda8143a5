//! Worker and sweep scheduling
//!
//! Runs the apalis monitor with two workers:
//!
//! 1. the ingestion worker consuming [`ProcessIngestionJob`]s from the
//!    Postgres-backed queue
//! 2. a cron-driven reclaim sweep that returns stuck PROCESSING ingestions to
//!    RECEIVED and re-enqueues them
//!
//! The sweep is the only recovery path for a worker that died mid-ingestion;
//! there is no per-call deadline, only the heartbeat TTL.

use anyhow::Result;
use apalis::prelude::*;
use apalis_cron::{CronStream, Tick};
use cron::Schedule;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use tokio::task::JoinHandle;
use tracing::info;

use tdp_ingest::audit::{self, AuditEventType, NewAuditEvent};
use tdp_ingest::{reclaim, IngestConfig};

use crate::worker::{self, process_ingestion_job, JobQueue, WorkerContext};

/// Job scheduler
pub struct JobScheduler {
    db: PgPool,
    ingest: IngestConfig,
    queue: JobQueue,
    reclaim_cron: String,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(db: PgPool, ingest: IngestConfig, queue: JobQueue, reclaim_cron: String) -> Self {
        Self { db, ingest, queue, reclaim_cron }
    }

    /// Start the ingestion worker and the reclaim sweep.
    pub fn start(self) -> Result<JoinHandle<()>> {
        let schedule = Schedule::from_str(&self.reclaim_cron)?;
        info!(cron = %self.reclaim_cron, "starting job scheduler");

        let worker_ctx = WorkerContext { db: self.db.clone(), ingest: self.ingest.clone() };
        let sweep_ctx = SweepContext {
            db: self.db,
            ingest: self.ingest,
            queue: self.queue.clone(),
        };
        let queue = self.queue;

        let handle = tokio::spawn(async move {
            info!("job workers started");
            if let Err(e) = Monitor::new()
                .register(move |_index| {
                    WorkerBuilder::new("tdp-ingest-worker")
                        .backend(queue.clone())
                        .data(worker_ctx.clone())
                        .build(process_ingestion_job)
                })
                .register(move |_index| {
                    WorkerBuilder::new("tdp-reclaim-sweep")
                        .backend(CronStream::new(schedule.clone()))
                        .data(sweep_ctx.clone())
                        .build(run_reclaim_sweep)
                })
                .run()
                .await
            {
                tracing::error!("job worker error: {:?}", e);
            }
            info!("job workers stopped");
        });

        Ok(handle)
    }
}

/// Context for the reclaim sweep.
#[derive(Clone)]
pub struct SweepContext {
    pub db: PgPool,
    pub ingest: IngestConfig,
    pub queue: JobQueue,
}

/// Cron tick for the reclaim sweep.
#[derive(Debug, Clone, Default)]
pub struct ReclaimTick(pub DateTime<Utc>);

impl From<DateTime<Utc>> for ReclaimTick {
    fn from(t: DateTime<Utc>) -> Self {
        Self(t)
    }
}

/// One reclaim sweep: move stale PROCESSING rows back to RECEIVED and
/// re-enqueue them, since the queue's own redeliveries for those ids have
/// long since been consumed as no-ops.
pub async fn run_reclaim_sweep(_tick: Tick, ctx: Data<SweepContext>) -> Result<()> {
    let reclaimed = reclaim::reclaim_stuck(
        &ctx.db,
        ctx.ingest.processing_ttl_secs,
        ctx.ingest.reclaim_max_per_run,
    )
    .await?;

    for ingestion_id in reclaimed {
        audit::record_event_best_effort(
            &ctx.db,
            NewAuditEvent::new(AuditEventType::IngestionReclaimed)
                .actor("scheduler")
                .ingestion(ingestion_id),
        )
        .await;
        worker::enqueue(&ctx.queue, ingestion_id).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reclaim_schedule_parses() {
        assert!(Schedule::from_str(crate::config::DEFAULT_RECLAIM_CRON).is_ok());
    }
}
