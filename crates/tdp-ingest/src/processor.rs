//! Ingestion processing orchestrator
//!
//! Drives one ingestion record through claim -> read -> infer -> drift ->
//! validate -> load -> finalize. Every path out of this module ends in
//! exactly one of the registry's terminal or retryable states; there is no
//! bare re-raise that leans on the queue transport's retry policy.
//!
//! Failure taxonomy:
//!
//! - transient/infrastructure errors finalize FAILED_EXCEPTION (retryable up
//!   to the attempt cap)
//! - contract violations finalize FAILED_QUALITY (the input is wrong;
//!   retrying without a new file changes nothing)
//! - breaking drift under policy `fail` finalizes FAILED_DRIFT
//! - attempt exhaustion finalizes FAILED_MAX_ATTEMPTS at claim time
//!
//! Claim losses are not failures: a duplicate queue delivery for a record
//! someone else owns is a silent no-op.

use anyhow::Context;
use sqlx::PgPool;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::audit::{self, AuditEventType, NewAuditEvent};
use crate::config::IngestConfig;
use crate::contracts;
use crate::drift;
use crate::lineage::{self, ContractProvenance, LineageArtifact, RawProvenance};
use crate::loader;
use crate::quality;
use crate::raw::{self, RawFileReference};
use crate::registry::{self, ClaimOutcome, IngestionRecord, IngestionStatus};
use crate::schema;
use crate::tabular;

/// Actor label written on worker-originated audit events.
const WORKER_ACTOR: &str = "worker";

/// Cap on error/warning entries embedded in audit event details.
const AUDIT_DETAIL_CAP: usize = 20;

/// Outcome of one processing run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The job referenced an ingestion that does not exist. No state change.
    NotFound,
    /// Another worker owns the record, or it is already terminal.
    Skipped,
    /// Attempts were exhausted; the record is now FAILED_MAX_ATTEMPTS.
    MaxAttempts,
    Loaded { rows_loaded: u64 },
    FailedQuality,
    FailedDrift,
    FailedException { error: String },
}

/// Process one ingestion end to end.
///
/// Returns `Err` only when the registry itself is unreachable (claim or
/// finalize failed); the record is then either untouched or PROCESSING, and
/// redelivery plus the reclaimer cover both cases.
#[instrument(skip(pool, config))]
pub async fn process_ingestion(
    pool: &PgPool,
    config: &IngestConfig,
    ingestion_id: Uuid,
) -> sqlx::Result<ProcessOutcome> {
    let Some(record) = registry::get(pool, ingestion_id).await? else {
        warn!(%ingestion_id, "job referenced unknown ingestion");
        return Ok(ProcessOutcome::NotFound);
    };

    match registry::claim(pool, ingestion_id, config.max_processing_attempts).await? {
        ClaimOutcome::Claimed => {},
        ClaimOutcome::MaxAttempts => {
            audit::record_event_best_effort(
                pool,
                NewAuditEvent::new(AuditEventType::IngestionMaxAttempts)
                    .actor(WORKER_ACTOR)
                    .dataset(&record.dataset)
                    .ingestion(ingestion_id)
                    .details(serde_json::json!({
                        "processing_attempts": record.processing_attempts,
                        "max_attempts": config.max_processing_attempts,
                    })),
            )
            .await;
            return Ok(ProcessOutcome::MaxAttempts);
        },
        ClaimOutcome::Skipped => {
            info!(%ingestion_id, "claim lost or record terminal; skipping");
            return Ok(ProcessOutcome::Skipped);
        },
    }

    audit::record_event_best_effort(
        pool,
        NewAuditEvent::new(AuditEventType::IngestionProcessingStarted)
            .actor(WORKER_ACTOR)
            .dataset(&record.dataset)
            .ingestion(ingestion_id)
            .details(serde_json::json!({
                "raw_path": &record.raw_path,
                "sha256": &record.sha256,
                "file_ext": &record.file_ext,
            })),
    )
    .await;

    match run_pipeline(pool, config, &record).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            let message = format!("{e:#}");
            error!(%ingestion_id, error = %message, "ingestion processing failed");

            registry::finalize(pool, ingestion_id, IngestionStatus::FailedException, Some(&message))
                .await?;

            audit::record_event_best_effort(
                pool,
                NewAuditEvent::new(AuditEventType::IngestionFailedException)
                    .actor(WORKER_ACTOR)
                    .dataset(&record.dataset)
                    .ingestion(ingestion_id)
                    .details(serde_json::json!({ "exception": &message })),
            )
            .await;

            // Best-effort diagnostics; the terminal status above is already
            // durable and must not be masked by report/lineage failures.
            let failure_doc = serde_json::json!({
                "dataset": &record.dataset,
                "raw_path": &record.raw_path,
                "sha256": &record.sha256,
                "exception": &message,
            });
            if let Err(persist) = quality::store_report(pool, ingestion_id, false, &failure_doc).await {
                warn!(%ingestion_id, error = %persist, "failed to persist exception report");
            }
            let artifact = LineageArtifact {
                ingestion_id,
                dataset: record.dataset.clone(),
                raw: raw_provenance(&record),
                contract: None,
                observed_schema_hash: None,
                drift: None,
                quality: None,
                load: None,
                error: Some(message.clone()),
            };
            if let Err(persist) = lineage::write_lineage(pool, ingestion_id, &artifact).await {
                warn!(%ingestion_id, error = %persist, "failed to persist exception lineage");
            }

            Ok(ProcessOutcome::FailedException { error: message })
        },
    }
}

async fn run_pipeline(
    pool: &PgPool,
    config: &IngestConfig,
    record: &IngestionRecord,
) -> anyhow::Result<ProcessOutcome> {
    let id = record.id;
    let dataset = record.dataset.as_str();

    let handle = contracts::load(&config.contracts_dir, dataset)?;
    touch(pool, id).await;

    let reference = RawFileReference {
        path: record.raw_path.clone(),
        sha256: record.sha256.clone(),
        generation: record.raw_generation,
    };
    let local_path = raw::fetch(&reference)?;
    touch(pool, id).await;

    let file_ext = record.file_ext.clone().unwrap_or_default();
    let table = tabular::read_table(&local_path, &file_ext)?;
    touch(pool, id).await;

    let observed = schema::infer(&table);
    let observed_hash = schema::schema_hash(&observed);

    // Read the previous schema before recording this observation, or drift
    // would always compare a schema against itself.
    let previous = match schema::latest_schema(pool, dataset).await? {
        Some(stored) => Some(stored.observed().context("stored schema document is corrupt")?),
        None => None,
    };
    let drift_report = drift::detect(previous.as_ref(), &observed);
    schema::record_observation(pool, dataset, &observed_hash, &observed).await?;
    touch(pool, id).await;

    let policy = handle.contract.effective_drift_policy(config.drift_policy_default);
    let report = quality::validate(&table, &handle.contract, &drift_report, policy);
    touch(pool, id).await;

    let contract_provenance = ContractProvenance {
        path: handle.path.to_string_lossy().to_string(),
        fingerprint: handle.fingerprint.clone(),
    };
    let mut artifact = LineageArtifact {
        ingestion_id: id,
        dataset: record.dataset.clone(),
        raw: raw_provenance(record),
        contract: Some(contract_provenance.clone()),
        observed_schema_hash: Some(observed_hash.clone()),
        drift: Some(drift_report.clone()),
        quality: Some(report.clone()),
        load: None,
        error: None,
    };
    let mut report_doc = serde_json::json!({
        "dataset": &record.dataset,
        "source": &record.source,
        "raw_path": &record.raw_path,
        "sha256": &record.sha256,
        "contract": &contract_provenance,
        "observed_schema_hash": &observed_hash,
        "quality": &report,
    });

    if report.drift_rejected {
        quality::store_report(pool, id, false, &report_doc).await?;
        registry::finalize(
            pool,
            id,
            IngestionStatus::FailedDrift,
            Some("breaking schema drift rejected by drift policy"),
        )
        .await?;
        audit::record_event_best_effort(
            pool,
            NewAuditEvent::new(AuditEventType::IngestionFailedDrift)
                .actor(WORKER_ACTOR)
                .dataset(dataset)
                .ingestion(id)
                .details(serde_json::json!({
                    "policy": policy,
                    "drift": &report.drift,
                    "observed_schema_hash": &observed_hash,
                })),
        )
        .await;
        lineage::write_lineage(pool, id, &artifact).await?;
        info!(%id, %dataset, "ingestion rejected by drift policy");
        return Ok(ProcessOutcome::FailedDrift);
    }

    if !report.ok {
        quality::store_report(pool, id, false, &report_doc).await?;
        registry::finalize(pool, id, IngestionStatus::FailedQuality, Some("quality gate failed"))
            .await?;
        audit::record_event_best_effort(
            pool,
            NewAuditEvent::new(AuditEventType::IngestionFailedQuality)
                .actor(WORKER_ACTOR)
                .dataset(dataset)
                .ingestion(id)
                .details(serde_json::json!({
                    "errors": report.errors.iter().take(AUDIT_DETAIL_CAP).collect::<Vec<_>>(),
                    "warnings": report.warnings.iter().take(AUDIT_DETAIL_CAP).collect::<Vec<_>>(),
                    "metrics": &report.metrics,
                })),
        )
        .await;
        lineage::write_lineage(pool, id, &artifact).await?;
        info!(%id, %dataset, errors = report.errors.len(), "ingestion failed quality gate");
        return Ok(ProcessOutcome::FailedQuality);
    }

    let load_result = loader::load(
        pool,
        &handle.contract,
        &table,
        id,
        &record.sha256,
        config.load_batch_size,
    )
    .await?;
    touch(pool, id).await;

    report_doc["load"] = serde_json::to_value(&load_result)?;
    artifact.load = Some(load_result.clone());

    quality::store_report(pool, id, true, &report_doc).await?;
    registry::finalize(pool, id, IngestionStatus::Loaded, None).await?;
    audit::record_event_best_effort(
        pool,
        NewAuditEvent::new(AuditEventType::IngestionLoaded)
            .actor(WORKER_ACTOR)
            .dataset(dataset)
            .ingestion(id)
            .details(serde_json::json!({
                "rows_loaded": load_result.rows_loaded,
                "table": load_result.table,
                "observed_schema_hash": &observed_hash,
            })),
    )
    .await;
    lineage::write_lineage(pool, id, &artifact).await?;

    info!(%id, %dataset, rows_loaded = load_result.rows_loaded, "ingestion loaded");
    Ok(ProcessOutcome::Loaded { rows_loaded: load_result.rows_loaded })
}

fn raw_provenance(record: &IngestionRecord) -> RawProvenance {
    RawProvenance {
        path: record.raw_path.clone(),
        sha256: record.sha256.clone(),
        generation: record.raw_generation,
    }
}

/// Best-effort heartbeat between pipeline stages. Heartbeats are a resilience
/// feature; a failed update must not abort an otherwise healthy ingestion.
async fn touch(pool: &PgPool, id: Uuid) {
    if let Err(e) = registry::heartbeat(pool, id).await {
        warn!(ingestion_id = %id, error = %e, "heartbeat update failed");
    }
}
