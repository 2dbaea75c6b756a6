//! cohortyx-common — Shared types, errors, and configuration used across all Cohortyx crates.

pub mod error;
pub mod entities;
pub mod config;

// Re-export commonly used types
pub use config::{CohortyxConfig, EnrichmentConfig, LoggingConfig, OutputConfig};
pub use error::{CohortyxError, Result};
