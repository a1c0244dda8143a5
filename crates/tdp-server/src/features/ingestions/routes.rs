//! Ingestion routes
//!
//! Submission creates a RECEIVED registry record and enqueues a processing
//! job; everything else here is read-only status plumbing plus the explicit
//! replay action. Processing semantics live entirely in the engine.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use tdp_common::naming::normalize_dataset_name;
use tdp_ingest::audit::{self, AuditEventType, NewAuditEvent};
use tdp_ingest::registry::{self, ListFilter, NewIngestion};
use tdp_ingest::{lineage, quality, raw};

use crate::error::{AppError, AppResult};
use crate::features::{require_token, AppState};
use crate::worker;

/// Create submission routes (`/ingest/...`)
pub fn submit_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/from-path", post(from_path))
}

/// Create status routes (`/ingestions/...`)
pub fn ingestion_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_ingestions))
        .route("/:id", get(get_ingestion))
        .route("/:id/report", get(get_report))
        .route("/:id/lineage", get(get_lineage))
        .route("/:id/replay", post(replay_ingestion))
}

/// Upload a tabular file for ingestion
///
/// POST /ingest/upload (multipart: dataset, file, optional source)
async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Response> {
    require_token(&headers, "x-ingest-token", state.auth.ingest_token.as_deref())?;

    let mut dataset: Option<String> = None;
    let mut source: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("dataset") => {
                dataset = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(format!("bad dataset field: {e}")))?,
                );
            },
            Some("source") => {
                source = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(format!("bad source field: {e}")))?,
                );
            },
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(|f| f.to_string())
                    .ok_or_else(|| AppError::Validation("file field needs a filename".to_string()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("failed to read upload: {e}")))?;
                file = Some((filename, bytes.to_vec()));
            },
            _ => {},
        }
    }

    let dataset = dataset.ok_or_else(|| AppError::Validation("dataset is required".to_string()))?;
    let (filename, bytes) =
        file.ok_or_else(|| AppError::Validation("file is required".to_string()))?;

    let dataset = normalize_dataset_name(&dataset)?;
    let stored = raw::store_raw_bytes(&state.ingest, &dataset, &filename, &bytes)?;

    submit(&state, dataset, source, stored).await
}

#[derive(Debug, Deserialize)]
struct FromPathRequest {
    dataset: String,
    path: String,
    source: Option<String>,
}

/// Ingest a file already on the server's filesystem
///
/// POST /ingest/from-path — local/Compose lane, disabled unless configured.
async fn from_path(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FromPathRequest>,
) -> AppResult<Response> {
    require_token(&headers, "x-ingest-token", state.auth.ingest_token.as_deref())?;
    if !state.enable_ingest_from_path {
        return Err(AppError::Validation(
            "ingest-from-path is disabled on this deployment".to_string(),
        ));
    }

    let dataset = normalize_dataset_name(&request.dataset)?;
    let stored =
        raw::store_raw_file(&state.ingest, &dataset, std::path::Path::new(&request.path))?;

    submit(&state, dataset, request.source, stored).await
}

/// Shared tail of both submission lanes: registry record, audit, enqueue.
async fn submit(
    state: &AppState,
    dataset: String,
    source: Option<String>,
    stored: raw::StoredRaw,
) -> AppResult<Response> {
    let id = registry::create(
        &state.db,
        NewIngestion {
            dataset: dataset.clone(),
            source,
            filename: Some(stored.filename),
            file_ext: Some(stored.file_ext),
            sha256: stored.sha256.clone(),
            raw_path: stored.raw_path.to_string_lossy().to_string(),
            raw_generation: None,
            replay_of: None,
        },
    )
    .await?;

    audit::record_event_best_effort(
        &state.db,
        NewAuditEvent::new(AuditEventType::IngestionReceived)
            .actor("api")
            .dataset(&dataset)
            .ingestion(id)
            .details(json!({ "sha256": &stored.sha256 })),
    )
    .await;

    worker::enqueue(&state.queue, id)
        .await
        .map_err(|e| AppError::Internal(format!("failed to enqueue ingestion job: {e}")))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "ingestion_id": id,
            "dataset": &dataset,
            "sha256": &stored.sha256,
            "status": "RECEIVED",
        })),
    )
        .into_response())
}

/// List recent ingestions
///
/// GET /ingestions?dataset=parcels&status=failed&limit=50
async fn list_ingestions(
    State(state): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> AppResult<Response> {
    let records = registry::list(&state.db, filter).await?;
    Ok((StatusCode::OK, Json(json!({ "ingestions": records }))).into_response())
}

/// Get one ingestion record
async fn get_ingestion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let record = registry::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("ingestion '{id}'")))?;
    Ok((StatusCode::OK, Json(json!(record))).into_response())
}

/// Get the quality report for an ingestion
async fn get_report(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Response> {
    let report = quality::get_report(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("quality report for ingestion '{id}'")))?;
    Ok((StatusCode::OK, Json(json!(report))).into_response())
}

/// Get the lineage artifact for an ingestion
async fn get_lineage(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Response> {
    let artifact = lineage::get_lineage(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("lineage for ingestion '{id}'")))?;
    Ok((StatusCode::OK, Json(json!(artifact))).into_response())
}

/// Replay an ingestion: a new RECEIVED record for the same raw artifact
///
/// POST /ingestions/:id/replay
async fn replay_ingestion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    require_token(&headers, "x-ingest-token", state.auth.ingest_token.as_deref())?;

    let new_id = registry::replay(&state.db, id).await?;

    audit::record_event_best_effort(
        &state.db,
        NewAuditEvent::new(AuditEventType::IngestionReplayed)
            .actor("api")
            .ingestion(new_id)
            .details(json!({ "replay_of": id })),
    )
    .await;

    worker::enqueue(&state.queue, new_id)
        .await
        .map_err(|e| AppError::Internal(format!("failed to enqueue replay job: {e}")))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "ingestion_id": new_id, "replay_of": id, "status": "RECEIVED" })),
    )
        .into_response())
}
