//! Ingestion registry
//!
//! Owns the ingestion record lifecycle and is the single source of truth for
//! "has this raw artifact been processed, and by whom". All mutations are
//! single conditional UPDATEs against Postgres; there is no SELECT-then-UPDATE
//! anywhere, which is what makes concurrent workers and at-least-once job
//! delivery safe.
//!
//! State machine:
//!
//! ```text
//! RECEIVED -> PROCESSING -> LOADED
//!                        -> FAILED_QUALITY
//!                        -> FAILED_DRIFT
//!                        -> FAILED_EXCEPTION  (claimable again, up to the cap)
//! RECEIVED | FAILED_EXCEPTION -> FAILED_MAX_ATTEMPTS  (attempts exhausted)
//! ```
//!
//! Quality/drift/max-attempts failures are never auto-retried; the only way
//! to reprocess them is an explicit [`replay`], which creates a brand-new
//! RECEIVED record and leaves history intact.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle states of an ingestion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestionStatus {
    Received,
    Processing,
    Loaded,
    FailedQuality,
    FailedDrift,
    FailedException,
    FailedMaxAttempts,
}

impl IngestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Processing => "PROCESSING",
            Self::Loaded => "LOADED",
            Self::FailedQuality => "FAILED_QUALITY",
            Self::FailedDrift => "FAILED_DRIFT",
            Self::FailedException => "FAILED_EXCEPTION",
            Self::FailedMaxAttempts => "FAILED_MAX_ATTEMPTS",
        }
    }

    /// Terminal states stamp `processed_at` and are never claimed again
    /// (FAILED_EXCEPTION being the retryable exception).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Received | Self::Processing)
    }

    /// States a worker may claim from.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Received | Self::FailedException)
    }
}

impl std::str::FromStr for IngestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(Self::Received),
            "PROCESSING" => Ok(Self::Processing),
            "LOADED" => Ok(Self::Loaded),
            "FAILED_QUALITY" => Ok(Self::FailedQuality),
            "FAILED_DRIFT" => Ok(Self::FailedDrift),
            "FAILED_EXCEPTION" => Ok(Self::FailedException),
            "FAILED_MAX_ATTEMPTS" => Ok(Self::FailedMaxAttempts),
            other => Err(format!("unknown ingestion status: {other}")),
        }
    }
}

impl std::fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registry operation errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ingestion '{0}' not found")]
    NotFound(Uuid),
}

/// One ingestion record, one processing attempt of one raw artifact.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IngestionRecord {
    pub id: Uuid,
    pub dataset: String,
    pub source: Option<String>,
    pub filename: Option<String>,
    pub file_ext: Option<String>,
    pub sha256: String,
    pub raw_path: String,
    pub raw_generation: Option<i64>,
    pub received_at: DateTime<Utc>,
    pub status: String,
    pub error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_heartbeat_at: Option<DateTime<Utc>>,
    pub processing_attempts: i32,
    pub replay_of: Option<Uuid>,
}

impl IngestionRecord {
    /// Decode the status column; rows only ever hold values written through
    /// [`IngestionStatus`], so this should not fail in practice.
    pub fn status_enum(&self) -> Option<IngestionStatus> {
        self.status.parse().ok()
    }
}

/// Fields for a new ingestion record.
#[derive(Debug, Clone)]
pub struct NewIngestion {
    pub dataset: String,
    pub source: Option<String>,
    pub filename: Option<String>,
    pub file_ext: Option<String>,
    pub sha256: String,
    pub raw_path: String,
    pub raw_generation: Option<i64>,
    pub replay_of: Option<Uuid>,
}

/// Create an ingestion record in status RECEIVED.
pub async fn create(pool: &PgPool, new: NewIngestion) -> sqlx::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO ingestions
            (id, dataset, source, filename, file_ext, sha256, raw_path, raw_generation,
             received_at, status, replay_of)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(id)
    .bind(&new.dataset)
    .bind(&new.source)
    .bind(&new.filename)
    .bind(&new.file_ext)
    .bind(&new.sha256)
    .bind(&new.raw_path)
    .bind(new.raw_generation)
    .bind(Utc::now())
    .bind(IngestionStatus::Received.as_str())
    .bind(new.replay_of)
    .execute(pool)
    .await?;

    debug!(ingestion_id = %id, dataset = %new.dataset, "ingestion record created");
    Ok(id)
}

/// Create an ingestion record from a storage object notification.
///
/// Notifications are at-least-once; the stable (raw_path, raw_generation)
/// pair dedupes duplicate deliveries while manual replays stay allowed.
/// Returns `(id, created)` - `created == false` means the event was a
/// duplicate and the existing record id is returned.
pub async fn create_from_storage_event(
    pool: &PgPool,
    new: NewIngestion,
) -> Result<(Uuid, bool), RegistryError> {
    let id = Uuid::new_v4();
    let inserted: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO ingestions
            (id, dataset, source, filename, file_ext, sha256, raw_path, raw_generation,
             received_at, status, replay_of)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL)
        ON CONFLICT (raw_path, raw_generation)
            WHERE raw_generation IS NOT NULL AND replay_of IS NULL
        DO NOTHING
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(&new.dataset)
    .bind(&new.source)
    .bind(&new.filename)
    .bind(&new.file_ext)
    .bind(&new.sha256)
    .bind(&new.raw_path)
    .bind(new.raw_generation)
    .bind(Utc::now())
    .bind(IngestionStatus::Received.as_str())
    .fetch_optional(pool)
    .await?;

    if let Some(id) = inserted {
        return Ok((id, true));
    }

    let existing: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id FROM ingestions
        WHERE raw_path = $1 AND raw_generation = $2 AND replay_of IS NULL
        LIMIT 1
        "#,
    )
    .bind(&new.raw_path)
    .bind(new.raw_generation)
    .fetch_optional(pool)
    .await?;

    existing
        .map(|id| (id, false))
        .ok_or(RegistryError::NotFound(id))
}

/// Outcome of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This worker owns the record and must process it.
    Claimed,
    /// Attempts were exhausted; the record was moved to FAILED_MAX_ATTEMPTS.
    MaxAttempts,
    /// Another worker owns it, or the record is terminal. Not an error.
    Skipped,
}

/// Atomically claim an ingestion for processing.
///
/// A single conditional UPDATE guarded on the claimable states and the
/// attempt cap; concurrent claimants race on the row and exactly one sees a
/// row affected. On a miss, a second conditional UPDATE retires an
/// attempts-exhausted record to FAILED_MAX_ATTEMPTS.
pub async fn claim(pool: &PgPool, id: Uuid, max_attempts: i32) -> sqlx::Result<ClaimOutcome> {
    let max_attempts = max_attempts.max(1);
    let now = Utc::now();

    let claimed = sqlx::query(
        r#"
        UPDATE ingestions
        SET status = 'PROCESSING',
            error = NULL,
            processed_at = NULL,
            processing_started_at = $2,
            processing_heartbeat_at = $2,
            processing_attempts = processing_attempts + 1
        WHERE id = $1
          AND status IN ('RECEIVED', 'FAILED_EXCEPTION')
          AND processing_attempts < $3
        "#,
    )
    .bind(id)
    .bind(now)
    .bind(max_attempts)
    .execute(pool)
    .await?;

    if claimed.rows_affected() == 1 {
        debug!(ingestion_id = %id, "ingestion claimed");
        return Ok(ClaimOutcome::Claimed);
    }

    let capped = sqlx::query(
        r#"
        UPDATE ingestions
        SET status = 'FAILED_MAX_ATTEMPTS',
            error = 'max processing attempts exceeded',
            processed_at = $2,
            processing_started_at = NULL,
            processing_heartbeat_at = NULL
        WHERE id = $1
          AND status IN ('RECEIVED', 'FAILED_EXCEPTION')
          AND processing_attempts >= $3
        "#,
    )
    .bind(id)
    .bind(now)
    .bind(max_attempts)
    .execute(pool)
    .await?;

    if capped.rows_affected() == 1 {
        debug!(ingestion_id = %id, "ingestion retired after exhausting attempts");
        return Ok(ClaimOutcome::MaxAttempts);
    }

    Ok(ClaimOutcome::Skipped)
}

/// Refresh the processing heartbeat for an in-flight ingestion.
///
/// Only touches rows currently PROCESSING; the reclaimer uses heartbeat age
/// to tell "still working" from "crashed".
pub async fn heartbeat(pool: &PgPool, id: Uuid) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE ingestions
        SET processing_heartbeat_at = $2
        WHERE id = $1 AND status = 'PROCESSING'
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Move an ingestion into a terminal state, stamping `processed_at`.
pub async fn finalize(
    pool: &PgPool,
    id: Uuid,
    status: IngestionStatus,
    error: Option<&str>,
) -> sqlx::Result<()> {
    debug_assert!(status.is_terminal(), "finalize called with non-terminal status");
    sqlx::query(
        r#"
        UPDATE ingestions
        SET status = $2,
            error = $3,
            processed_at = $4
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(error)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    debug!(ingestion_id = %id, status = %status, "ingestion finalized");
    Ok(())
}

/// Create a brand-new RECEIVED record referencing the same raw artifact.
///
/// The original record is untouched; full history is preserved. The curated
/// loader's primary-key upsert is what keeps the replay idempotent.
pub async fn replay(pool: &PgPool, original_id: Uuid) -> Result<Uuid, RegistryError> {
    let original = get(pool, original_id)
        .await?
        .ok_or(RegistryError::NotFound(original_id))?;

    let replay_marker = format!("replay:{original_id}");
    let source = match original.source {
        Some(s) if !s.is_empty() => Some(format!("{s};{replay_marker}")),
        _ => Some(replay_marker),
    };

    let id = create(
        pool,
        NewIngestion {
            dataset: original.dataset,
            source,
            filename: original.filename,
            file_ext: original.file_ext,
            sha256: original.sha256,
            raw_path: original.raw_path,
            raw_generation: original.raw_generation,
            replay_of: Some(original_id),
        },
    )
    .await?;

    Ok(id)
}

/// Fetch one ingestion record.
pub async fn get(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<IngestionRecord>> {
    sqlx::query_as::<_, IngestionRecord>("SELECT * FROM ingestions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Filters for [`list`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilter {
    pub dataset: Option<String>,
    /// Either a grouped value (received|processing|success|failed) or a raw
    /// status such as FAILED_QUALITY.
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// List recent ingestions, newest first.
pub async fn list(pool: &PgPool, filter: ListFilter) -> sqlx::Result<Vec<IngestionRecord>> {
    let limit = filter.limit.unwrap_or(50).clamp(1, 500);

    let mut sql = String::from("SELECT * FROM ingestions WHERE 1=1");
    let mut dataset_bind: Option<String> = None;
    let mut status_bind: Option<String> = None;
    let mut bind_count = 0;

    if let Some(dataset) = filter.dataset {
        bind_count += 1;
        sql.push_str(&format!(" AND dataset = ${bind_count}"));
        dataset_bind = Some(dataset);
    }

    if let Some(status) = filter.status {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" => sql.push_str(" AND status = 'LOADED'"),
            "failed" => sql.push_str(" AND status LIKE 'FAILED%'"),
            "processing" => sql.push_str(" AND status = 'PROCESSING'"),
            "received" => sql.push_str(" AND status = 'RECEIVED'"),
            _ => {
                bind_count += 1;
                sql.push_str(&format!(" AND status = ${bind_count}"));
                status_bind = Some(status.trim().to_ascii_uppercase());
            },
        }
    }

    bind_count += 1;
    sql.push_str(&format!(" ORDER BY received_at DESC LIMIT ${bind_count}"));

    let mut query = sqlx::query_as::<_, IngestionRecord>(&sql);
    if let Some(dataset) = dataset_bind {
        query = query.bind(dataset);
    }
    if let Some(status) = status_bind {
        query = query.bind(status);
    }
    query.bind(limit).fetch_all(pool).await
}

/// Per-dataset summary counts for status surfaces.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DatasetSummary {
    pub dataset: String,
    pub ingestion_count: i64,
    pub last_received_at: Option<DateTime<Utc>>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub received_count: i64,
    pub processing_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
}

pub async fn dataset_summaries(pool: &PgPool, limit: i64) -> sqlx::Result<Vec<DatasetSummary>> {
    let limit = limit.clamp(1, 200);
    sqlx::query_as::<_, DatasetSummary>(
        r#"
        SELECT
            dataset,
            COUNT(*) AS ingestion_count,
            MAX(received_at) AS last_received_at,
            MAX(processed_at) AS last_processed_at,
            COUNT(*) FILTER (WHERE status = 'RECEIVED') AS received_count,
            COUNT(*) FILTER (WHERE status = 'PROCESSING') AS processing_count,
            COUNT(*) FILTER (WHERE status = 'LOADED') AS success_count,
            COUNT(*) FILTER (WHERE status LIKE 'FAILED%') AS failed_count
        FROM ingestions
        GROUP BY dataset
        ORDER BY MAX(received_at) DESC NULLS LAST
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Lightweight operational stats for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub totals: BTreeMap<String, i64>,
    pub total_ingestions: i64,
    pub backlog: i64,
    pub stuck_processing: i64,
    pub success_rate: Option<f64>,
}

pub async fn platform_stats(pool: &PgPool, processing_ttl_secs: i64) -> sqlx::Result<PlatformStats> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT
            CASE
                WHEN status = 'RECEIVED' THEN 'received'
                WHEN status = 'PROCESSING' THEN 'processing'
                WHEN status = 'LOADED' THEN 'success'
                WHEN status LIKE 'FAILED%' THEN 'failed'
                ELSE lower(status)
            END AS status_group,
            COUNT(*) AS count
        FROM ingestions
        GROUP BY 1
        "#,
    )
    .fetch_all(pool)
    .await?;

    let cutoff = Utc::now() - Duration::seconds(processing_ttl_secs.max(0));
    let stuck_processing: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM ingestions
        WHERE status = 'PROCESSING'
          AND COALESCE(processing_heartbeat_at, processing_started_at, received_at) < $1
        "#,
    )
    .bind(cutoff)
    .fetch_one(pool)
    .await?;

    let totals: BTreeMap<String, i64> = rows.into_iter().collect();
    let total_ingestions = totals.values().sum();
    let backlog = totals.get("received").copied().unwrap_or(0)
        + totals.get("processing").copied().unwrap_or(0);
    let success = totals.get("success").copied().unwrap_or(0);
    let failed = totals.get("failed").copied().unwrap_or(0);
    let success_rate = if success + failed > 0 {
        Some(success as f64 / (success + failed) as f64)
    } else {
        None
    };

    Ok(PlatformStats {
        totals,
        total_ingestions,
        backlog,
        stuck_processing,
        success_rate,
    })
}

/// Outcome of a retention prune run.
#[derive(Debug, Clone, Serialize)]
pub struct PruneOutcome {
    pub dry_run: bool,
    pub cutoff: DateTime<Utc>,
    pub total_candidates: i64,
    pub planned: i64,
    pub deleted: i64,
}

/// Prune old terminal ingestions, oldest first.
///
/// Only LOADED / FAILED_* rows with a `processed_at` older than the cutoff
/// are touched. Deletion cascades to quality reports and lineage artifacts;
/// audit events survive with their `ingestion_id` nulled.
pub async fn prune(
    pool: &PgPool,
    older_than_days: i64,
    limit: i64,
    dry_run: bool,
) -> sqlx::Result<PruneOutcome> {
    let older_than_days = older_than_days.clamp(1, 3650);
    let limit = limit.clamp(1, 200_000);
    let cutoff = Utc::now() - Duration::days(older_than_days);

    let total_candidates: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM ingestions
        WHERE (status = 'LOADED' OR status LIKE 'FAILED%')
          AND processed_at IS NOT NULL
          AND processed_at < $1
        "#,
    )
    .bind(cutoff)
    .fetch_one(pool)
    .await?;

    let planned = total_candidates.min(limit);
    let mut deleted = 0i64;

    if !dry_run && planned > 0 {
        let result = sqlx::query(
            r#"
            WITH del AS (
                SELECT id FROM ingestions
                WHERE (status = 'LOADED' OR status LIKE 'FAILED%')
                  AND processed_at IS NOT NULL
                  AND processed_at < $1
                ORDER BY processed_at ASC
                LIMIT $2
            )
            DELETE FROM ingestions i
            USING del
            WHERE i.id = del.id
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .execute(pool)
        .await?;
        deleted = result.rows_affected() as i64;
    }

    Ok(PruneOutcome { dry_run, cutoff, total_candidates, planned, deleted })
}
