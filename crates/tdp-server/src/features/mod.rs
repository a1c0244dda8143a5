//! Feature modules implementing the TDP API
//!
//! Each feature is a vertical slice with its own routes; handlers stay thin
//! and delegate to the engine crate.
//!
//! # Features
//!
//! - **ingestions**: file submission, status/listing, reports, lineage, replay
//! - **datasets**: per-dataset summaries, schema history, curated previews
//! - **audit**: governance event trail queries
//! - **ops**: reclaim sweep, retention pruning (token-gated)

pub mod audit;
pub mod datasets;
pub mod ingestions;
pub mod ops;

use axum::http::HeaderMap;
use axum::Router;
use sqlx::PgPool;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::worker::JobQueue;
use tdp_ingest::IngestConfig;

/// Shared state for all feature routes.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub db: PgPool,
    /// Ingestion engine configuration
    pub ingest: IngestConfig,
    /// Job queue handle for enqueueing processing jobs
    pub queue: JobQueue,
    /// Shared-secret auth configuration
    pub auth: AuthConfig,
    /// Whether `POST /ingest/from-path` is exposed
    pub enable_ingest_from_path: bool,
}

/// Creates the main API router with all feature routes mounted.
pub fn router(state: AppState) -> Router<()> {
    Router::new()
        .nest("/ingest", ingestions::submit_routes())
        .nest("/ingestions", ingestions::ingestion_routes())
        .nest("/datasets", datasets::dataset_routes())
        .nest("/audit", audit::audit_routes())
        .nest("/ops", ops::ops_routes())
        .with_state(state)
}

/// Check a shared-secret header when a token is configured.
///
/// An unset token leaves the surface open (local development posture).
pub(crate) fn require_token(
    headers: &HeaderMap,
    header_name: &str,
    expected: Option<&str>,
) -> Result<(), AppError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers.get(header_name).and_then(|v| v.to_str().ok());
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!("missing or invalid {header_name}")))
    }
}
