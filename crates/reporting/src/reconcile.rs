//! Terminal invariant gate over the derived tables. Any violation means an
//! upstream join fan-out or de-duplication defect, so the run is failed.

use clickpath_core::types::{AttributionModel, AttributionRecord, ConversionFact, Session};
use clickpath_core::{InvariantViolation, PipelineError, PipelineResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub conversion_revenue: f64,
    pub attributed_revenue: BTreeMap<AttributionModel, f64>,
    pub violations: Vec<InvariantViolation>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn into_result(self) -> PipelineResult<Self> {
        if self.is_clean() {
            return Ok(self);
        }
        for violation in &self.violations {
            error!(check = violation.check, entity = %violation.entity, detail = %violation.detail, "Invariant violated");
        }
        Err(PipelineError::Reconciliation {
            violations: self.violations,
        })
    }
}

fn violation(check: &'static str, entity: impl Into<String>, detail: String) -> InvariantViolation {
    InvariantViolation {
        check,
        entity: entity.into(),
        detail,
    }
}

fn check_sessions(sessions: &[Session], out: &mut Vec<InvariantViolation>) {
    let mut by_client: HashMap<&str, Vec<&Session>> = HashMap::new();
    let mut ids = HashSet::new();
    for session in sessions {
        if !ids.insert(session.session_id.as_str()) {
            out.push(violation(
                "session_id_unique",
                &session.session_id,
                "appears more than once".to_string(),
            ));
        }
        if session.session_end_ts < session.session_start_ts || session.session_duration_seconds < 0.0 {
            out.push(violation(
                "session_duration_non_negative",
                &session.session_id,
                format!(
                    "start {} is after end {}",
                    session.session_start_ts, session.session_end_ts
                ),
            ));
        }
        if let Some(client_id) = session.client_id.as_deref() {
            by_client.entry(client_id).or_default().push(session);
        }
    }

    let mut clients: Vec<_> = by_client.into_iter().collect();
    clients.sort_by(|a, b| a.0.cmp(b.0));
    for (_, mut list) in clients {
        list.sort_by(|a, b| {
            (a.session_start_ts, &a.session_id).cmp(&(b.session_start_ts, &b.session_id))
        });
        for pair in list.windows(2) {
            if pair[1].session_start_ts <= pair[0].session_end_ts {
                out.push(violation(
                    "sessions_non_overlapping",
                    &pair[1].session_id,
                    format!("starts before {} ends", pair[0].session_id),
                ));
            }
        }
    }
}

fn check_conversions(conversions: &[ConversionFact], out: &mut Vec<InvariantViolation>) {
    let mut seen = HashSet::new();
    for conversion in conversions {
        if !seen.insert(conversion.conversion_id.as_str()) {
            out.push(violation(
                "conversion_id_unique",
                &conversion.conversion_id,
                "appears more than once".to_string(),
            ));
        }
        if conversion.revenue.is_nan() || conversion.revenue < 0.0 {
            out.push(violation(
                "revenue_non_negative",
                &conversion.conversion_id,
                format!("revenue is {}", conversion.revenue),
            ));
        }
    }
}

fn check_attribution(
    conversions: &[ConversionFact],
    attribution: &[AttributionRecord],
    out: &mut Vec<InvariantViolation>,
) {
    let models: BTreeSet<AttributionModel> =
        attribution.iter().map(|r| r.attribution_model).collect();
    let expected: BTreeSet<AttributionModel> = AttributionModel::ALL.into_iter().collect();
    // An empty conversion table legitimately produces no attribution rows.
    if !conversions.is_empty() && models != expected {
        out.push(violation(
            "attribution_models_present",
            "fact_attribution",
            format!("found models {models:?}"),
        ));
    }

    let mut keys: HashSet<(&str, AttributionModel)> = HashSet::new();
    for record in attribution {
        if !keys.insert((record.conversion_id.as_str(), record.attribution_model)) {
            out.push(violation(
                "attribution_key_unique",
                format!("{}/{}", record.conversion_id, record.attribution_model),
                "appears more than once".to_string(),
            ));
        }
    }

    for conversion in conversions {
        for model in AttributionModel::ALL {
            if !keys.contains(&(conversion.conversion_id.as_str(), model)) {
                out.push(violation(
                    "attribution_complete",
                    format!("{}/{}", conversion.conversion_id, model),
                    "conversion has no attribution row".to_string(),
                ));
            }
        }
    }
}

/// Run every invariant check and total revenue per model.
pub fn reconcile(
    sessions: &[Session],
    conversions: &[ConversionFact],
    attribution: &[AttributionRecord],
    tolerance: f64,
) -> ReconciliationReport {
    let mut violations = Vec::new();
    check_sessions(sessions, &mut violations);
    check_conversions(conversions, &mut violations);
    check_attribution(conversions, attribution, &mut violations);

    let conversion_revenue: f64 = conversions.iter().map(|c| c.revenue).sum();
    let mut attributed_revenue = BTreeMap::new();
    for model in AttributionModel::ALL {
        let total: f64 = attribution
            .iter()
            .filter(|r| r.attribution_model == model)
            .map(|r| r.revenue)
            .sum();
        if (total - conversion_revenue).abs() > tolerance {
            violations.push(violation(
                "revenue_conserved",
                model.as_str(),
                format!("attributed {total} vs converted {conversion_revenue}"),
            ));
        }
        attributed_revenue.insert(model, total);
    }

    info!(
        conversion_revenue,
        violations = violations.len(),
        "Reconciliation complete"
    );

    ReconciliationReport {
        conversion_revenue,
        attributed_revenue,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::build_fact_attribution;
    use crate::fixtures::ts;

    fn conversion(id: &str, revenue: f64) -> ConversionFact {
        ConversionFact {
            conversion_id: id.into(),
            client_id: Some("x".into()),
            session_id: "x_0".into(),
            conversion_ts: ts(10, 12, 0),
            revenue,
            event_data: None,
        }
    }

    fn session(id: &str, client: Option<&str>, start: (u32, u32), end: (u32, u32)) -> Session {
        let start = ts(1, start.0, start.1);
        let end = ts(1, end.0, end.1);
        Session {
            session_id: id.into(),
            client_id: client.map(str::to_string),
            session_start_ts: start,
            session_end_ts: end,
            session_duration_seconds: (end - start).num_seconds() as f64,
            event_count: 1,
            has_conversion: false,
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

    fn checks(report: &ReconciliationReport) -> Vec<&'static str> {
        report.violations.iter().map(|v| v.check).collect()
    }

    #[test]
    fn test_clean_outputs_pass() {
        let conversions = vec![conversion("T1", 10.0), conversion("T2", 15.5)];
        let attribution = build_fact_attribution(&[], &conversions);
        let sessions = vec![
            session("x_0", Some("x"), (10, 0), (10, 20)),
            session("x_1", Some("x"), (11, 0), (11, 0)),
        ];
        let report = reconcile(&sessions, &conversions, &attribution, 1e-6);
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.conversion_revenue, 25.5);
        assert_eq!(report.attributed_revenue[&AttributionModel::FirstClick], 25.5);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_empty_run_is_clean() {
        assert!(reconcile(&[], &[], &[], 1e-6).is_clean());
    }

    #[test]
    fn test_fan_out_breaks_conservation_and_uniqueness() {
        let conversions = vec![conversion("T1", 10.0)];
        let mut attribution = build_fact_attribution(&[], &conversions);
        attribution.push(attribution[0].clone());

        let report = reconcile(&[], &conversions, &attribution, 1e-6);
        let found = checks(&report);
        assert!(found.contains(&"attribution_key_unique"));
        assert!(found.contains(&"revenue_conserved"));

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, PipelineError::Reconciliation { .. }));
    }

    #[test]
    fn test_missing_model_rows() {
        let conversions = vec![conversion("T1", 10.0)];
        let attribution: Vec<_> = build_fact_attribution(&[], &conversions)
            .into_iter()
            .filter(|r| r.attribution_model == AttributionModel::FirstClick)
            .collect();
        let found = checks(&reconcile(&[], &conversions, &attribution, 1e-6));
        assert!(found.contains(&"attribution_models_present"));
        assert!(found.contains(&"attribution_complete"));
        assert!(found.contains(&"revenue_conserved"));
    }

    #[test]
    fn test_duplicate_conversion_and_negative_revenue() {
        let conversions = vec![conversion("T1", 10.0), conversion("T1", -1.0)];
        let found = checks(&reconcile(&[], &conversions, &[], 1e-6));
        assert!(found.contains(&"conversion_id_unique"));
        assert!(found.contains(&"revenue_non_negative"));
    }

    #[test]
    fn test_duplicate_session_id() {
        let sessions = vec![
            session("anon_event_1_0", None, (10, 0), (10, 0)),
            session("anon_event_1_0", Some("anon_event_1"), (9, 0), (9, 0)),
        ];
        let report = reconcile(&sessions, &[], &[], 1e-6);
        assert_eq!(checks(&report), vec!["session_id_unique"]);
    }

    #[test]
    fn test_session_overlap_and_negative_duration() {
        let sessions = vec![
            session("x_0", Some("x"), (10, 0), (10, 40)),
            session("x_1", Some("x"), (10, 30), (11, 0)),
            session("y_0", Some("y"), (12, 0), (11, 0)),
            // Anonymous sessions never overlap-check against each other.
            session("anon_event_1_0", None, (10, 0), (10, 0)),
            session("anon_event_2_0", None, (10, 0), (10, 0)),
        ];
        let report = reconcile(&sessions, &[], &[], 1e-6);
        assert_eq!(
            checks(&report),
            vec!["session_duration_non_negative", "sessions_non_overlapping"]
        );
        assert_eq!(report.violations[1].entity, "x_1");
    }
}
