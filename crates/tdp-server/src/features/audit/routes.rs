//! Audit trail routes
//!
//! Read-only queries over the append-only governance event log.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use tdp_ingest::audit::{self, EventFilter};

use crate::error::AppResult;
use crate::features::AppState;

/// Create audit routes (`/audit/...`)
pub fn audit_routes() -> Router<AppState> {
    Router::new().route("/", get(list_events))
}

/// Query audit events with optional filters
///
/// GET /audit?dataset=parcels&event_type=ingestion.failed_quality&limit=100
async fn list_events(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> AppResult<Response> {
    let events = audit::list_events(&state.db, filter).await?;
    Ok((StatusCode::OK, Json(json!({ "events": events }))).into_response())
}
