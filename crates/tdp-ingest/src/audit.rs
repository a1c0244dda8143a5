//! Governance audit trail
//!
//! Append-only event log supporting debugging, compliance posture, and
//! lifecycle timelines. Events reference ingestions loosely: when retention
//! deletes an ingestion, its events survive with the reference nulled - audit
//! history must outlive the records it describes.
//!
//! Recording is best-effort at processing call sites: a failed audit write is
//! logged and swallowed, never cascaded into an ingestion failure.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default number of audit events returned per query
pub const DEFAULT_AUDIT_QUERY_LIMIT: i64 = 200;

/// Maximum number of audit events returned in a single query
pub const MAX_AUDIT_QUERY_LIMIT: i64 = 1000;

/// Lifecycle event types written by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    IngestionReceived,
    IngestionProcessingStarted,
    IngestionLoaded,
    IngestionFailedQuality,
    IngestionFailedDrift,
    IngestionFailedException,
    IngestionMaxAttempts,
    IngestionReplayed,
    IngestionReclaimed,
    IngestionPruned,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IngestionReceived => "ingestion.received",
            Self::IngestionProcessingStarted => "ingestion.processing_started",
            Self::IngestionLoaded => "ingestion.loaded",
            Self::IngestionFailedQuality => "ingestion.failed_quality",
            Self::IngestionFailedDrift => "ingestion.failed_drift",
            Self::IngestionFailedException => "ingestion.failed_exception",
            Self::IngestionMaxAttempts => "ingestion.max_attempts",
            Self::IngestionReplayed => "ingestion.replayed",
            Self::IngestionReclaimed => "ingestion.reclaimed",
            Self::IngestionPruned => "ingestion.pruned",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An audit log entry from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEvent {
    pub id: Uuid,
    pub event_type: String,
    pub actor: Option<String>,
    pub dataset: Option<String>,
    pub ingestion_id: Option<Uuid>,
    pub details: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording an audit event.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub event_type: AuditEventType,
    pub actor: Option<String>,
    pub dataset: Option<String>,
    pub ingestion_id: Option<Uuid>,
    pub details: Option<JsonValue>,
}

impl NewAuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_type,
            actor: None,
            dataset: None,
            ingestion_id: None,
            details: None,
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn ingestion(mut self, ingestion_id: Uuid) -> Self {
        self.ingestion_id = Some(ingestion_id);
        self
    }

    pub fn details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

/// Record an audit event. Append-only; events are never updated or read back
/// for control flow.
pub async fn record_event(pool: &PgPool, event: NewAuditEvent) -> sqlx::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO audit_events (id, event_type, actor, dataset, ingestion_id, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(event.event_type.as_str())
    .bind(&event.actor)
    .bind(&event.dataset)
    .bind(event.ingestion_id)
    .bind(&event.details)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    debug!(audit_id = %id, event_type = %event.event_type, "audit event recorded");
    Ok(id)
}

/// Record an audit event, logging and swallowing any failure.
///
/// The processing pipeline must never fail an ingestion because the audit
/// write failed; genuine persistence errors for the ingestion record itself
/// still propagate through their own calls.
pub async fn record_event_best_effort(pool: &PgPool, event: NewAuditEvent) {
    let event_type = event.event_type;
    if let Err(e) = record_event(pool, event).await {
        warn!(event_type = %event_type, error = %e, "audit event write failed; continuing");
    }
}

/// Filters for [`list_events`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub dataset: Option<String>,
    pub ingestion_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub actor: Option<String>,
    pub limit: Option<i64>,
}

/// Query audit events with optional filters, newest first.
pub async fn list_events(pool: &PgPool, filter: EventFilter) -> sqlx::Result<Vec<AuditEvent>> {
    let limit = filter
        .limit
        .unwrap_or(DEFAULT_AUDIT_QUERY_LIMIT)
        .clamp(1, MAX_AUDIT_QUERY_LIMIT);

    let mut sql = String::from(
        "SELECT id, event_type, actor, dataset, ingestion_id, details, created_at \
         FROM audit_events WHERE 1=1",
    );
    let mut bind_count = 0;
    if filter.dataset.is_some() {
        bind_count += 1;
        sql.push_str(&format!(" AND dataset = ${bind_count}"));
    }
    if filter.ingestion_id.is_some() {
        bind_count += 1;
        sql.push_str(&format!(" AND ingestion_id = ${bind_count}"));
    }
    if filter.event_type.is_some() {
        bind_count += 1;
        sql.push_str(&format!(" AND event_type = ${bind_count}"));
    }
    if filter.actor.is_some() {
        bind_count += 1;
        sql.push_str(&format!(" AND actor = ${bind_count}"));
    }
    bind_count += 1;
    sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ${bind_count}"));

    let mut query = sqlx::query_as::<_, AuditEvent>(&sql);
    if let Some(dataset) = filter.dataset {
        query = query.bind(dataset);
    }
    if let Some(ingestion_id) = filter.ingestion_id {
        query = query.bind(ingestion_id);
    }
    if let Some(event_type) = filter.event_type {
        query = query.bind(event_type);
    }
    if let Some(actor) = filter.actor {
        query = query.bind(actor);
    }

    query.bind(limit).fetch_all(pool).await
}

/// Outcome of an audit retention run.
#[derive(Debug, Clone, Serialize)]
pub struct EventPruneOutcome {
    pub dry_run: bool,
    pub cutoff: DateTime<Utc>,
    pub total_candidates: i64,
    pub planned: i64,
    pub deleted: i64,
}

/// Prune old audit events, oldest first, capped per run.
pub async fn prune_events(
    pool: &PgPool,
    older_than_days: i64,
    limit: i64,
    dry_run: bool,
) -> sqlx::Result<EventPruneOutcome> {
    let older_than_days = older_than_days.clamp(1, 3650);
    let limit = limit.clamp(1, 500_000);
    let cutoff = Utc::now() - Duration::days(older_than_days);

    let total_candidates: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM audit_events WHERE created_at < $1")
            .bind(cutoff)
            .fetch_one(pool)
            .await?;

    let planned = total_candidates.min(limit);
    let mut deleted = 0i64;

    if !dry_run && planned > 0 {
        let result = sqlx::query(
            r#"
            WITH del AS (
                SELECT id FROM audit_events
                WHERE created_at < $1
                ORDER BY created_at ASC
                LIMIT $2
            )
            DELETE FROM audit_events a
            USING del
            WHERE a.id = del.id
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .execute(pool)
        .await?;
        deleted = result.rows_affected() as i64;
    }

    Ok(EventPruneOutcome { dry_run, cutoff, total_candidates, planned, deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{self, NewIngestion};
    use serde_json::json;

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_record_and_filter_events(pool: PgPool) -> sqlx::Result<()> {
        record_event(
            &pool,
            NewAuditEvent::new(AuditEventType::IngestionReceived)
                .actor("worker")
                .dataset("parcels")
                .details(json!({"filename": "parcels.csv"})),
        )
        .await?;
        record_event(
            &pool,
            NewAuditEvent::new(AuditEventType::IngestionLoaded)
                .actor("worker")
                .dataset("permits"),
        )
        .await?;

        let all = list_events(&pool, EventFilter::default()).await?;
        assert_eq!(all.len(), 2);

        let parcels = list_events(
            &pool,
            EventFilter { dataset: Some("parcels".to_string()), ..Default::default() },
        )
        .await?;
        assert_eq!(parcels.len(), 1);
        assert_eq!(parcels[0].event_type, "ingestion.received");

        let loaded = list_events(
            &pool,
            EventFilter {
                event_type: Some("ingestion.loaded".to_string()),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(loaded.len(), 1);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_events_survive_ingestion_deletion(pool: PgPool) -> sqlx::Result<()> {
        let id = registry::create(
            &pool,
            NewIngestion {
                dataset: "parcels".to_string(),
                source: None,
                filename: None,
                file_ext: Some(".csv".to_string()),
                sha256: "ef".repeat(32),
                raw_path: "/data/raw/parcels/x.csv".to_string(),
                raw_generation: None,
                replay_of: None,
            },
        )
        .await?;

        record_event(
            &pool,
            NewAuditEvent::new(AuditEventType::IngestionReceived)
                .dataset("parcels")
                .ingestion(id),
        )
        .await?;

        sqlx::query("DELETE FROM ingestions WHERE id = $1")
            .bind(id)
            .execute(&pool)
            .await?;

        let events = list_events(&pool, EventFilter::default()).await?;
        assert_eq!(events.len(), 1);
        assert!(events[0].ingestion_id.is_none());
        assert_eq!(events[0].dataset.as_deref(), Some("parcels"));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_prune_events_oldest_first(pool: PgPool) -> sqlx::Result<()> {
        let old = record_event(&pool, NewAuditEvent::new(AuditEventType::IngestionLoaded)).await?;
        let recent =
            record_event(&pool, NewAuditEvent::new(AuditEventType::IngestionLoaded)).await?;

        sqlx::query("UPDATE audit_events SET created_at = created_at - INTERVAL '400 days' WHERE id = $1")
            .bind(old)
            .execute(&pool)
            .await?;

        let outcome = prune_events(&pool, 365, 1000, false).await?;
        assert_eq!(outcome.deleted, 1);

        let remaining = list_events(&pool, EventFilter::default()).await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, recent);
        Ok(())
    }
}
