//! Conversion fact extraction and transaction de-duplication.

use clickpath_core::config::{ConversionConfig, PayloadPolicy};
use clickpath_core::types::{ConversionFact, SessionEvent};
use clickpath_core::{PayloadError, PipelineError, PipelineResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A conversion event dropped under [`PayloadPolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedConversion {
    pub seq: usize,
    pub session_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConversionExtraction {
    /// One fact per transaction id, ordered by `conversion_id`.
    pub facts: Vec<ConversionFact>,
    pub rejected: Vec<RejectedConversion>,
}

/// Parse `transaction_id` and `revenue` out of a conversion payload.
///
/// The transaction id may be a string or a number; revenue may be a number or
/// a numeric string but must be finite and non-negative.
pub fn extract_transaction_fields(event_data: Option<&str>) -> Result<(String, f64), PayloadError> {
    let raw = event_data.ok_or(PayloadError::Missing)?;
    let payload: Value = serde_json::from_str(raw)?;
    let fields = payload.as_object().ok_or(PayloadError::NotAnObject)?;

    let transaction_id = match fields.get("transaction_id") {
        None | Some(Value::Null) => return Err(PayloadError::MissingField("transaction_id")),
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(PayloadError::InvalidField {
                field: "transaction_id",
                value: other.to_string(),
            })
        }
    };

    let revenue_value = match fields.get("revenue") {
        None | Some(Value::Null) => return Err(PayloadError::MissingField("revenue")),
        Some(v) => v,
    };
    let revenue = match revenue_value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|r| r.is_finite())
    .ok_or_else(|| PayloadError::InvalidField {
        field: "revenue",
        value: revenue_value.to_string(),
    })?;

    if revenue < 0.0 {
        return Err(PayloadError::NegativeRevenue(revenue));
    }
    Ok((transaction_id, revenue))
}

/// Extract one [`ConversionFact`] per transaction id. Duplicate transactions
/// keep the earliest event by `(event_ts, seq)`.
pub fn build_fact_conversions(
    events: &[SessionEvent],
    config: &ConversionConfig,
) -> PipelineResult<ConversionExtraction> {
    let mut earliest: BTreeMap<String, (f64, &SessionEvent)> = BTreeMap::new();
    let mut rejected = Vec::new();
    let mut raw_count = 0usize;

    for tagged in events
        .iter()
        .filter(|t| t.event.event_name == config.event_name)
    {
        raw_count += 1;
        let (transaction_id, revenue) =
            match extract_transaction_fields(tagged.event.event_data.as_deref()) {
                Ok(fields) => fields,
                Err(source) => match config.payload_policy {
                    PayloadPolicy::Abort => {
                        return Err(PipelineError::Payload {
                            seq: tagged.event.seq,
                            session_id: tagged.session_id.clone(),
                            source,
                        })
                    }
                    PayloadPolicy::Skip => {
                        warn!(
                            seq = tagged.event.seq,
                            session_id = %tagged.session_id,
                            error = %source,
                            "Skipping conversion event with unusable payload"
                        );
                        rejected.push(RejectedConversion {
                            seq: tagged.event.seq,
                            session_id: tagged.session_id.clone(),
                            reason: source.to_string(),
                        });
                        continue;
                    }
                },
            };

        let key = (tagged.event.event_ts, tagged.event.seq);
        let keep_existing = earliest
            .get(&transaction_id)
            .is_some_and(|(_, kept)| (kept.event.event_ts, kept.event.seq) <= key);
        if !keep_existing {
            earliest.insert(transaction_id, (revenue, tagged));
        }
    }

    let facts: Vec<ConversionFact> = earliest
        .into_iter()
        .map(|(conversion_id, (revenue, tagged))| ConversionFact {
            conversion_id,
            client_id: tagged.event.client_id.clone(),
            session_id: tagged.session_id.clone(),
            conversion_ts: tagged.event.event_ts,
            revenue,
            event_data: tagged.event.event_data.clone(),
        })
        .collect();

    info!(
        raw_events = raw_count,
        conversions = facts.len(),
        duplicates = raw_count - rejected.len() - facts.len(),
        rejected = rejected.len(),
        "Extracted conversion facts"
    );
    Ok(ConversionExtraction { facts, rejected })
}
