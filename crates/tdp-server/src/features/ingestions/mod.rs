//! Ingestion submission and status feature

pub mod routes;

pub use routes::{ingestion_routes, submit_routes};
