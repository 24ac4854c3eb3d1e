//! Sessionization and attribution engine: session assignment, conversion
//! facts, lookback touchpoints, first/last-click attribution, reconciliation
//! and CSV export.

pub mod attribution;
pub mod conversions;
pub mod export;
pub mod pipeline;
pub mod reconcile;
pub mod sessionize;
pub mod sessions;
pub mod touchpoints;

#[cfg(test)]
mod fixtures;

pub use export::{write_outputs, OutputPaths};
pub use pipeline::{Pipeline, PipelineOutput};
pub use reconcile::ReconciliationReport;
