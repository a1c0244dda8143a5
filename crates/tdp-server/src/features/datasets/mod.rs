//! Dataset summaries and schema history feature

pub mod routes;

pub use routes::dataset_routes;
