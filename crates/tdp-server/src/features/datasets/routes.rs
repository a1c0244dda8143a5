//! Dataset routes
//!
//! Read-only observability surfaces: per-dataset ingestion summaries, schema
//! history, and curated-table previews.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use tdp_common::naming::normalize_dataset_name;
use tdp_ingest::{loader, registry, schema};

use crate::error::{AppError, AppResult};
use crate::features::AppState;

/// Create dataset routes (`/datasets/...`)
pub fn dataset_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_datasets))
        .route("/:dataset/schemas", get(schema_history))
        .route("/:dataset/curated/sample", get(curated_sample))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

/// List datasets with ingestion summary counts
async fn list_datasets(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Response> {
    let summaries = registry::dataset_summaries(&state.db, query.limit.unwrap_or(50)).await?;
    Ok((StatusCode::OK, Json(json!({ "datasets": summaries }))).into_response())
}

/// Schema history for a dataset, newest first
async fn schema_history(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Response> {
    let dataset = normalize_dataset_name(&dataset)?;
    let history = schema::schema_history(&state.db, &dataset, query.limit.unwrap_or(20)).await?;
    Ok((StatusCode::OK, Json(json!({ "dataset": dataset, "schemas": history }))).into_response())
}

/// Most recently loaded curated rows for a dataset
async fn curated_sample(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Response> {
    let dataset = normalize_dataset_name(&dataset)?;
    let rows = loader::sample(&state.db, &dataset, query.limit.unwrap_or(20))
        .await
        .map_err(|e| {
            // Undefined table means nothing was ever loaded for this dataset.
            let missing_table = matches!(
                &e,
                sqlx::Error::Database(db) if db.code().as_deref() == Some("42P01")
            );
            if missing_table {
                AppError::NotFound(format!("no curated table for dataset '{dataset}'"))
            } else {
                AppError::Database(e)
            }
        })?;
    Ok((StatusCode::OK, Json(json!({ "dataset": dataset, "rows": rows }))).into_response())
}
