//! TDP Server Library
//!
//! HTTP surface and worker runtime around the ingestion engine.
//!
//! # Overview
//!
//! - **API Endpoints**: submission, status, reports, lineage, audit, ops
//! - **Worker**: apalis job queue consumer driving `process_ingestion`
//! - **Scheduler**: periodic reclaim sweep for stuck ingestions
//! - **Database Management**: PostgreSQL integration with SQLx
//! - **Configuration**: Environment-based configuration management
//!
//! # Architecture
//!
//! The HTTP layer is deliberately thin plumbing: handlers validate inputs,
//! call into `tdp_ingest`, and shape responses. All correctness-critical
//! behavior (claiming, drift policy, idempotent loading, reclamation) lives
//! in the engine crate and is exercised by its tests, not reimplemented here.
//!
//! Job dispatch is at-least-once: the queue may redeliver a "process
//! ingestion X" message, and the registry's atomic claim makes the duplicate
//! a no-op. Nothing in this crate depends on stronger delivery guarantees.

pub mod config;
pub mod error;
pub mod features;
pub mod middleware;
pub mod scheduler;
pub mod worker;

// Re-export commonly used types
pub use error::{AppError, AppResult};
