//! Shared records, error taxonomy, and run configuration for the clickpath
//! sessionization and attribution pipeline.

pub mod config;
pub mod error;
pub mod types;

pub use config::PipelineConfig;
pub use error::{ConfigError, InvariantViolation, PayloadError, PipelineError, PipelineResult};
