//! Audit trail feature

pub mod routes;

pub use routes::audit_routes;
