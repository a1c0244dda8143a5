//! TDP Ingestion Engine
//!
//! The processing core of the tabular data platform: everything between "a raw
//! CSV/XLSX file landed" and "validated rows are queryable in a curated table".
//!
//! # Pipeline
//!
//! An external surface (HTTP upload, storage event, CLI) stores a raw file and
//! creates an ingestion record in status `RECEIVED`. A worker then drives the
//! record through the state machine:
//!
//! 1. **Claim** ([`registry`]) - atomic conditional update; exactly one worker
//!    wins, duplicate queue deliveries are silent no-ops
//! 2. **Read** ([`tabular`]) - parse the raw file into a typed in-memory table
//! 3. **Infer** ([`schema`]) - derive the logical schema and its
//!    order-independent hash, record the observation in schema history
//! 4. **Drift** ([`drift`]) - classify changes against the last recorded schema
//! 5. **Validate** ([`quality`]) - contract checks plus drift-policy gating
//! 6. **Load** ([`loader`]) - idempotent primary-key upsert into
//!    `curated_<dataset>` with lineage columns
//! 7. **Finalize** - terminal status, quality report, lineage artifact
//!    ([`lineage`]), audit events ([`audit`])
//!
//! Crashed workers are recovered by the heartbeat-TTL sweep in [`reclaim`].
//!
//! # Concurrency model
//!
//! Workers never talk to each other; the ingestion row in Postgres is the only
//! coordination point. All state transitions are single conditional UPDATEs,
//! which is what makes at-least-once job delivery safe.

pub mod audit;
pub mod config;
pub mod contracts;
pub mod drift;
pub mod lineage;
pub mod loader;
pub mod processor;
pub mod quality;
pub mod raw;
pub mod reclaim;
pub mod registry;
pub mod schema;
pub mod tabular;

pub use config::IngestConfig;
pub use processor::{process_ingestion, ProcessOutcome};
