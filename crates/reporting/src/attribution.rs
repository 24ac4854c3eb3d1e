//! Revenue attribution. Credits each conversion to one touchpoint per model,
//! falling back to a synthetic direct channel.

use clickpath_core::types::{
    AttributionModel, AttributionRecord, ConversionFact, Touchpoint, DIRECT_CAMPAIGN,
    DIRECT_MEDIUM, DIRECT_SOURCE,
};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Pick the credited touchpoint. Ordering is `(touchpoint_ts, seq)`, so equal
/// timestamps resolve to ingestion order: first click takes the earlier
/// ingested event, last click the later one.
pub fn select_touchpoint<'a>(
    touchpoints: &[&'a Touchpoint],
    model: AttributionModel,
) -> Option<&'a Touchpoint> {
    let key = |t: &&&Touchpoint| (t.touchpoint_ts, t.touchpoint_seq);
    let chosen = match model {
        AttributionModel::FirstClick => touchpoints.iter().min_by_key(key),
        AttributionModel::LastClick => touchpoints.iter().max_by_key(key),
    };
    chosen.copied()
}

/// Distinct sessions among all eligible touchpoints of one conversion.
pub fn sessions_to_conversion(touchpoints: &[&Touchpoint]) -> u64 {
    touchpoints
        .iter()
        .map(|t| t.touchpoint_session_id.as_str())
        .collect::<HashSet<_>>()
        .len() as u64
}

fn attributed(
    conversion: &ConversionFact,
    model: AttributionModel,
    chosen: &Touchpoint,
    sessions: u64,
) -> AttributionRecord {
    AttributionRecord {
        conversion_id: conversion.conversion_id.clone(),
        attribution_model: model,
        utm_source: chosen.utm_source.clone(),
        utm_medium: chosen.utm_medium.clone(),
        utm_campaign: chosen.utm_campaign.clone(),
        utm_content: chosen.utm_content.clone(),
        sessions_to_conversion: sessions,
        revenue: conversion.revenue,
    }
}

fn direct(conversion: &ConversionFact, model: AttributionModel) -> AttributionRecord {
    AttributionRecord {
        conversion_id: conversion.conversion_id.clone(),
        attribution_model: model,
        utm_source: Some(DIRECT_SOURCE.to_string()),
        utm_medium: Some(DIRECT_MEDIUM.to_string()),
        utm_campaign: Some(DIRECT_CAMPAIGN.to_string()),
        utm_content: None,
        sessions_to_conversion: 0,
        revenue: conversion.revenue,
    }
}

/// Exactly one record per conversion and model, ordered by model then
/// conversion id. Iterating conversions (not touchpoints) keeps the
/// attributed and direct partitions disjoint and exhaustive.
pub fn build_fact_attribution(
    touchpoints: &[Touchpoint],
    conversions: &[ConversionFact],
) -> Vec<AttributionRecord> {
    let mut by_conversion: HashMap<&str, Vec<&Touchpoint>> = HashMap::new();
    for tp in touchpoints {
        by_conversion
            .entry(tp.conversion_id.as_str())
            .or_default()
            .push(tp);
    }

    let mut ordered: Vec<&ConversionFact> = conversions.iter().collect();
    ordered.sort_by(|a, b| a.conversion_id.cmp(&b.conversion_id));

    let mut records = Vec::with_capacity(ordered.len() * AttributionModel::ALL.len());
    let mut direct_count = 0usize;

    for model in AttributionModel::ALL {
        for conversion in &ordered {
            let eligible = by_conversion
                .get(conversion.conversion_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();

            match select_touchpoint(eligible, model) {
                Some(chosen) => records.push(attributed(
                    conversion,
                    model,
                    chosen,
                    sessions_to_conversion(eligible),
                )),
                None => {
                    direct_count += 1;
                    records.push(direct(conversion, model));
                }
            }
        }
    }

    info!(
        conversions = ordered.len(),
        records = records.len(),
        direct = direct_count,
        "Built attribution facts"
    );
    records
}
