//! Operational routes
//!
//! Token-gated maintenance actions: the manual reclaim sweep and retention
//! pruning. Pruning defaults to dry-run; audit events survive ingestion
//! deletion by design.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use tdp_ingest::audit::{self, AuditEventType, NewAuditEvent};
use tdp_ingest::{reclaim, registry};

use crate::error::{AppError, AppResult};
use crate::features::{require_token, AppState};
use crate::worker;

/// Create ops routes (`/ops/...`)
pub fn ops_routes() -> Router<AppState> {
    Router::new()
        .route("/reclaim", post(run_reclaim))
        .route("/prune-ingestions", post(prune_ingestions))
        .route("/prune-audit", post(prune_audit))
        .route("/stats", get(platform_stats))
}

#[derive(Debug, Deserialize)]
struct ReclaimRequest {
    older_than_seconds: Option<i64>,
    limit: Option<i64>,
}

/// Reclaim stuck ingestions and re-enqueue them
///
/// POST /ops/reclaim { older_than_seconds, limit }
async fn run_reclaim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReclaimRequest>,
) -> AppResult<Response> {
    require_token(&headers, "x-task-token", state.auth.task_token.as_deref())?;

    let older_than = request
        .older_than_seconds
        .unwrap_or(state.ingest.processing_ttl_secs);
    let limit = request.limit.unwrap_or(state.ingest.reclaim_max_per_run);

    let reclaimed = reclaim::reclaim_stuck(&state.db, older_than, limit).await?;
    for id in &reclaimed {
        audit::record_event_best_effort(
            &state.db,
            NewAuditEvent::new(AuditEventType::IngestionReclaimed)
                .actor("ops")
                .ingestion(*id),
        )
        .await;
        worker::enqueue(&state.queue, *id)
            .await
            .map_err(|e| AppError::Internal(format!("failed to re-enqueue reclaimed job: {e}")))?;
    }

    Ok((
        StatusCode::OK,
        Json(json!({ "reclaimed": reclaimed.len(), "ingestion_ids": reclaimed })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct PruneRequest {
    older_than_days: i64,
    limit: Option<i64>,
    /// Defaults to true: destructive runs must be explicit.
    dry_run: Option<bool>,
}

/// Prune old terminal ingestions
///
/// POST /ops/prune-ingestions { older_than_days, limit, dry_run }
async fn prune_ingestions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PruneRequest>,
) -> AppResult<Response> {
    require_token(&headers, "x-task-token", state.auth.task_token.as_deref())?;

    let outcome = registry::prune(
        &state.db,
        request.older_than_days,
        request.limit.unwrap_or(5_000),
        request.dry_run.unwrap_or(true),
    )
    .await?;

    if !outcome.dry_run && outcome.deleted > 0 {
        audit::record_event_best_effort(
            &state.db,
            NewAuditEvent::new(AuditEventType::IngestionPruned)
                .actor("ops")
                .details(json!({ "deleted": outcome.deleted, "cutoff": outcome.cutoff })),
        )
        .await;
    }

    Ok((StatusCode::OK, Json(json!(outcome))).into_response())
}

/// Prune old audit events
///
/// POST /ops/prune-audit { older_than_days, limit, dry_run }
async fn prune_audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PruneRequest>,
) -> AppResult<Response> {
    require_token(&headers, "x-task-token", state.auth.task_token.as_deref())?;

    let outcome = audit::prune_events(
        &state.db,
        request.older_than_days,
        request.limit.unwrap_or(50_000),
        request.dry_run.unwrap_or(true),
    )
    .await?;

    Ok((StatusCode::OK, Json(json!(outcome))).into_response())
}

/// Platform-wide ingestion stats
///
/// GET /ops/stats
async fn platform_stats(State(state): State<AppState>) -> AppResult<Response> {
    let stats = registry::platform_stats(&state.db, state.ingest.processing_ttl_secs).await?;
    Ok((StatusCode::OK, Json(json!(stats))).into_response())
}
