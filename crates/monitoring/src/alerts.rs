//! Threshold alerts for daily runs.

use chrono::NaiveDate;
use clickpath_core::config::MonitoringConfig;
use clickpath_core::types::{AttributionModel, AttributionRecord, ConversionFact, Session};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub metric: String,
    pub severity: AlertSeverity,
    pub message: String,
}

impl Alert {
    fn new(metric: &str, severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            metric: metric.to_string(),
            severity,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitoringStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub status: MonitoringStatus,
    pub alert_count: usize,
    pub alerts: Vec<Alert>,
}

impl MonitoringReport {
    pub fn passed(&self) -> bool {
        self.status == MonitoringStatus::Pass
    }
}

/// The tables a monitoring pass looks at. Events are only counted, so the
/// caller passes the row count instead of the event table itself.
#[derive(Debug, Clone, Copy)]
pub struct MonitoringInput<'a> {
    pub event_count: usize,
    pub sessions: &'a [Session],
    pub conversions: &'a [ConversionFact],
    pub attribution: &'a [AttributionRecord],
}

/// Mean revenue of the `lookback` most recent conversions by timestamp.
fn revenue_baseline(conversions: &[ConversionFact], lookback: usize) -> Option<f64> {
    let mut ordered: Vec<&ConversionFact> = conversions.iter().collect();
    ordered.sort_by_key(|c| c.conversion_ts);
    let recent = &ordered[ordered.len().saturating_sub(lookback)..];
    if recent.is_empty() {
        return None;
    }
    Some(recent.iter().map(|c| c.revenue).sum::<f64>() / recent.len() as f64)
}

/// Share of each model's revenue credited to the direct fallback. Models with
/// no revenue have no share.
fn direct_shares(attribution: &[AttributionRecord]) -> BTreeMap<AttributionModel, f64> {
    let mut totals: BTreeMap<AttributionModel, (f64, f64)> = BTreeMap::new();
    for record in attribution {
        let entry = totals.entry(record.attribution_model).or_default();
        entry.1 += record.revenue;
        if record.is_direct() {
            entry.0 += record.revenue;
        }
    }
    totals
        .into_iter()
        .filter(|(_, (_, total))| *total > 0.0)
        .map(|(model, (direct, total))| (model, direct / total))
        .collect()
}

pub fn monitor_business_metrics(input: &MonitoringInput<'_>, config: &MonitoringConfig) -> Vec<Alert> {
    let mut alerts = Vec::new();

    let revenue: f64 = input.conversions.iter().map(|c| c.revenue).sum();
    if let Some(baseline) = revenue_baseline(input.conversions, config.baseline_lookback) {
        if baseline > 0.0 {
            let delta = (revenue - baseline) / baseline;
            if delta.abs() > config.revenue_change_threshold {
                alerts.push(Alert::new(
                    "daily_revenue",
                    AlertSeverity::Critical,
                    format!("Revenue changed {:.1}% vs baseline", delta * 100.0),
                ));
            }
        }
    }

    let shares = direct_shares(input.attribution);
    if shares.values().any(|share| *share > config.direct_share_threshold) {
        let detail = shares
            .iter()
            .map(|(model, share)| format!("{model}={:.1}%", share * 100.0))
            .collect::<Vec<_>>()
            .join(", ");
        alerts.push(Alert::new(
            "direct_attribution_share",
            AlertSeverity::Warning,
            format!("High direct attribution share detected ({detail})"),
        ));
    }

    alerts
}

pub fn monitor_pipeline_health(input: &MonitoringInput<'_>) -> Vec<Alert> {
    let mut alerts = Vec::new();
    if input.event_count == 0 {
        alerts.push(Alert::new("events_volume", AlertSeverity::Critical, "No events ingested"));
    }
    if input.conversions.is_empty() {
        alerts.push(Alert::new("conversions", AlertSeverity::Critical, "No conversions detected"));
    }
    if input.sessions.is_empty() {
        alerts.push(Alert::new("sessions", AlertSeverity::Critical, "No sessions generated"));
    }
    alerts
}

pub fn run_monitoring(
    input: &MonitoringInput<'_>,
    config: &MonitoringConfig,
    run_date: NaiveDate,
) -> MonitoringReport {
    let mut alerts = monitor_business_metrics(input, config);
    alerts.extend(monitor_pipeline_health(input));

    for alert in &alerts {
        warn!(metric = %alert.metric, severity = ?alert.severity, "{}", alert.message);
    }
    metrics::counter!("monitoring.alerts").increment(alerts.len() as u64);

    let status = if alerts.is_empty() {
        MonitoringStatus::Pass
    } else {
        MonitoringStatus::Fail
    };
    info!(%run_date, ?status, alerts = alerts.len(), "Monitoring complete");

    MonitoringReport {
        run_id: Uuid::new_v4(),
        run_date,
        status,
        alert_count: alerts.len(),
        alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clickpath_core::types::{DIRECT_CAMPAIGN, DIRECT_MEDIUM, DIRECT_SOURCE};

    fn conversion(id: &str, day: u32, revenue: f64) -> ConversionFact {
        ConversionFact {
            conversion_id: id.into(),
            client_id: Some("x".into()),
            session_id: "x_0".into(),
            conversion_ts: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            revenue,
            event_data: None,
        }
    }

    fn session() -> Session {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Session {
            session_id: "x_0".into(),
            client_id: Some("x".into()),
            session_start_ts: at,
            session_end_ts: at,
            session_duration_seconds: 0.0,
            event_count: 1,
            has_conversion: true,
            landing_page: None,
            landing_utm_source: None,
            landing_utm_medium: None,
            landing_utm_campaign: None,
            landing_device_type: None,
            landing_operating_system: None,
            landing_browser: None,
            landing_is_mobile: None,
        }
    }

    fn record(id: &str, model: AttributionModel, source: &str, revenue: f64) -> AttributionRecord {
        let direct = source == DIRECT_SOURCE;
        AttributionRecord {
            conversion_id: id.into(),
            attribution_model: model,
            utm_source: Some(source.into()),
            utm_medium: Some(if direct { DIRECT_MEDIUM } else { "cpc" }.into()),
            utm_campaign: Some(if direct { DIRECT_CAMPAIGN } else { "spring" }.into()),
            utm_content: None,
            sessions_to_conversion: u64::from(!direct),
            revenue,
        }
    }

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
    }

    fn metrics_of(alerts: &[Alert]) -> Vec<&str> {
        alerts.iter().map(|a| a.metric.as_str()).collect()
    }

    #[test]
    fn test_healthy_run_passes() {
        let conversions = vec![conversion("T1", 10, 50.0)];
        let sessions = vec![session()];
        let attribution = vec![
            record("T1", AttributionModel::FirstClick, "google", 50.0),
            record("T1", AttributionModel::LastClick, "google", 50.0),
        ];
        let input = MonitoringInput {
            event_count: 3,
            sessions: &sessions,
            conversions: &conversions,
            attribution: &attribution,
        };
        let report = run_monitoring(&input, &MonitoringConfig::default(), run_date());
        assert!(report.passed(), "{:?}", report.alerts);
        assert_eq!(report.alert_count, 0);
    }

    #[test]
    fn test_revenue_swing_against_baseline() {
        // Total 300 against a mean of 100 over the three most recent.
        let conversions = vec![
            conversion("T1", 1, 100.0),
            conversion("T2", 2, 100.0),
            conversion("T3", 3, 100.0),
        ];
        let input = MonitoringInput {
            event_count: 3,
            sessions: &[],
            conversions: &conversions,
            attribution: &[],
        };
        let alerts = monitor_business_metrics(&input, &MonitoringConfig::default());
        assert_eq!(metrics_of(&alerts), vec!["daily_revenue"]);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].message, "Revenue changed 200.0% vs baseline");
    }

    #[test]
    fn test_baseline_uses_most_recent_conversions() {
        let conversions = vec![
            conversion("T3", 9, 40.0),
            conversion("T1", 1, 1000.0),
            conversion("T2", 8, 40.0),
        ];
        let config = MonitoringConfig {
            baseline_lookback: 2,
            ..MonitoringConfig::default()
        };
        assert_eq!(revenue_baseline(&conversions, config.baseline_lookback), Some(40.0));
        assert_eq!(revenue_baseline(&[], 7), None);
    }

    #[test]
    fn test_direct_share_warning() {
        let attribution = vec![
            record("T1", AttributionModel::FirstClick, DIRECT_SOURCE, 80.0),
            record("T2", AttributionModel::FirstClick, "google", 20.0),
            record("T1", AttributionModel::LastClick, "google", 80.0),
            record("T2", AttributionModel::LastClick, "google", 20.0),
        ];
        let shares = direct_shares(&attribution);
        assert_eq!(shares[&AttributionModel::FirstClick], 0.8);
        assert_eq!(shares[&AttributionModel::LastClick], 0.0);

        let input = MonitoringInput {
            event_count: 1,
            sessions: &[],
            conversions: &[],
            attribution: &attribution,
        };
        let alerts = monitor_business_metrics(&input, &MonitoringConfig::default());
        assert_eq!(metrics_of(&alerts), vec!["direct_attribution_share"]);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_zero_revenue_models_have_no_share() {
        let attribution = vec![record("T1", AttributionModel::FirstClick, DIRECT_SOURCE, 0.0)];
        assert!(direct_shares(&attribution).is_empty());
    }

    #[test]
    fn test_empty_run_fails_health() {
        let input = MonitoringInput {
            event_count: 0,
            sessions: &[],
            conversions: &[],
            attribution: &[],
        };
        assert_eq!(
            metrics_of(&monitor_pipeline_health(&input)),
            vec!["events_volume", "conversions", "sessions"]
        );

        let report = run_monitoring(&input, &MonitoringConfig::default(), run_date());
        assert_eq!(report.status, MonitoringStatus::Fail);
        assert_eq!(report.alert_count, 3);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "FAIL");
        assert_eq!(json["run_date"], "2024-03-11");
        assert_eq!(json["alerts"][0]["severity"], "critical");
    }
}
