//! Lineage artifacts
//!
//! One immutable artifact per ingestion attempt summarizing source, contract,
//! schema, drift, quality, and load outcome. Artifacts exist for audit and
//! export, never for control flow. Because replays create new ingestion
//! records, writing an artifact is effectively write-once per attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::drift::DriftReport;
use crate::loader::LoadResult;
use crate::quality::QualityReport;

/// Provenance of the raw artifact an ingestion consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProvenance {
    pub path: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
}

/// Provenance of the contract an ingestion was validated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractProvenance {
    pub path: String,
    pub fingerprint: String,
}

/// The per-attempt lineage document.
///
/// Failure paths persist partial artifacts: an ingestion that died before
/// validation still records what was known at the time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageArtifact {
    pub ingestion_id: Uuid,
    pub dataset: String,
    pub raw: RawProvenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<ContractProvenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_schema_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A stored lineage artifact.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LineageRecord {
    pub ingestion_id: Uuid,
    pub artifact: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Persist the lineage artifact for an ingestion attempt.
pub async fn write_lineage(
    pool: &PgPool,
    ingestion_id: Uuid,
    artifact: &LineageArtifact,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO lineage_artifacts (ingestion_id, artifact, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (ingestion_id)
        DO UPDATE SET artifact = EXCLUDED.artifact, created_at = EXCLUDED.created_at
        "#,
    )
    .bind(ingestion_id)
    .bind(sqlx::types::Json(artifact))
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch the lineage artifact for an ingestion, if one was written.
pub async fn get_lineage(pool: &PgPool, ingestion_id: Uuid) -> sqlx::Result<Option<LineageRecord>> {
    sqlx::query_as::<_, LineageRecord>(
        "SELECT ingestion_id, artifact, created_at FROM lineage_artifacts WHERE ingestion_id = $1",
    )
    .bind(ingestion_id)
    .fetch_optional(pool)
    .await
}
