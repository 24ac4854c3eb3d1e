//! Monitoring crate: business KPI alerts and pipeline-health checks over a
//! finished run's output tables.

pub mod alerts;

pub use alerts::{
    monitor_business_metrics, monitor_pipeline_health, run_monitoring, Alert, AlertSeverity,
    MonitoringInput, MonitoringReport, MonitoringStatus,
};
