//! TDP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the TDP project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all TDP workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Checksums**: File integrity verification utilities
//! - **Naming**: Validation for dataset and column identifiers
//! - **Logging**: Centralized tracing setup
//!
//! # Example
//!
//! ```no_run
//! use tdp_common::{Result, TdpError};
//! use tdp_common::checksum::sha256_file;
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let digest = sha256_file(path)?;
//!     tracing::info!(%digest, "raw file hashed");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod naming;

// Re-export commonly used types
pub use error::{Result, TdpError};
