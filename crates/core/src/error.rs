use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Fatal problems detected before any event is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("No client id column found. Expected one of: {}", expected.join(", "))]
    MissingIdentityColumn { expected: Vec<String> },
}

/// Why a conversion event's payload could not yield a transaction.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("conversion event has no payload")]
    Missing,

    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload lacks `{0}`")]
    MissingField(&'static str),

    #[error("payload field `{field}` has unusable value {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("revenue must be non-negative, got {0}")]
    NegativeRevenue(f64),
}

/// A broken postcondition found by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantViolation {
    pub check: &'static str,
    pub entity: String,
    pub detail: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed on {}: {}", self.check, self.entity, self.detail)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data quality gate failed for {} file(s): {}", files.len(), files.join(", "))]
    QualityGate { files: Vec<String> },

    #[error("Payload error on event {seq} (session {session_id}): {source}")]
    Payload {
        seq: usize,
        session_id: String,
        #[source]
        source: PayloadError,
    },

    #[error("Reconciliation failed with {} violation(s); first: {}", violations.len(), first_violation(violations))]
    Reconciliation { violations: Vec<InvariantViolation> },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn first_violation(violations: &[InvariantViolation]) -> String {
    violations
        .first()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "none".to_string())
}
