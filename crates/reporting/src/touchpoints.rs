//! Windowed join of conversions to preceding marketing events.

use chrono::Duration;
use clickpath_core::types::{ConversionFact, SessionEvent, Touchpoint};
use std::collections::HashMap;
use tracing::info;

/// Marketing events per client, sorted by `(event_ts, seq)` so the lookback
/// window can be cut with two binary searches.
struct MarketingIndex<'a> {
    by_client: HashMap<&'a str, Vec<&'a SessionEvent>>,
}

impl<'a> MarketingIndex<'a> {
    fn build(events: &'a [SessionEvent]) -> Self {
        let mut by_client: HashMap<&'a str, Vec<&'a SessionEvent>> = HashMap::new();
        for tagged in events.iter().filter(|t| t.event.is_marketing()) {
            if let Some(client_id) = tagged.event.client_id.as_deref() {
                by_client.entry(client_id).or_default().push(tagged);
            }
        }
        for list in by_client.values_mut() {
            list.sort_by_key(|t| (t.event.event_ts, t.event.seq));
        }
        Self { by_client }
    }

    /// Events with `conversion_ts - lookback <= ts < conversion_ts`.
    fn window(&self, conversion: &ConversionFact, lookback: Duration) -> &[&'a SessionEvent] {
        let Some(candidates) = conversion
            .client_id
            .as_deref()
            .and_then(|client_id| self.by_client.get(client_id))
        else {
            return &[];
        };

        // A window reaching past the earliest representable instant has no lower bound.
        let lo = match conversion.conversion_ts.checked_sub_signed(lookback) {
            Some(window_start) => candidates.partition_point(|t| t.event.event_ts < window_start),
            None => 0,
        };
        let hi = candidates.partition_point(|t| t.event.event_ts < conversion.conversion_ts);
        if lo < hi {
            &candidates[lo..hi]
        } else {
            &[]
        }
    }
}

/// One row per eligible (conversion, marketing event) pair, ordered by
/// conversion id and then `(touchpoint_ts, seq)`. Anonymous conversions have
/// no candidates.
pub fn build_conversion_touchpoints(
    events: &[SessionEvent],
    conversions: &[ConversionFact],
    lookback: Duration,
) -> Vec<Touchpoint> {
    let index = MarketingIndex::build(events);

    let mut ordered: Vec<&ConversionFact> = conversions.iter().collect();
    ordered.sort_by(|a, b| a.conversion_id.cmp(&b.conversion_id));

    let mut touchpoints = Vec::new();
    for conversion in ordered {
        for tagged in index.window(conversion, lookback) {
            touchpoints.push(Touchpoint {
                conversion_id: conversion.conversion_id.clone(),
                conversion_ts: conversion.conversion_ts,
                touchpoint_ts: tagged.event.event_ts,
                touchpoint_seq: tagged.event.seq,
                utm_source: tagged.event.utm_source.clone(),
                utm_medium: tagged.event.utm_medium.clone(),
                utm_campaign: tagged.event.utm_campaign.clone(),
                utm_content: tagged.event.utm_content.clone(),
                touchpoint_session_id: tagged.session_id.clone(),
            });
        }
    }

    info!(
        conversions = conversions.len(),
        touchpoints = touchpoints.len(),
        lookback_days = lookback.num_days(),
        "Collected conversion touchpoints"
    );
    touchpoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{days, event, tagged, ts, with_utm};

    fn conversion(id: &str, client: Option<&str>, at: chrono::DateTime<chrono::Utc>) -> ConversionFact {
        ConversionFact {
            conversion_id: id.into(),
            client_id: client.map(str::to_string),
            session_id: "s".into(),
            conversion_ts: at,
            revenue: 10.0,
            event_data: None,
        }
    }

    #[test]
    fn test_lookback_window_excludes_old_touchpoints() {
        let events = vec![
            tagged("x_0", with_utm(event(0, Some("x"), "page_view", ts(1, 12, 0)), "fb", "old")),
            tagged("x_1", with_utm(event(1, Some("x"), "page_view", ts(8, 12, 0)), "google", "recent")),
        ];
        let conversions = vec![conversion("T1", Some("x"), ts(11, 12, 0))];

        let tps = build_conversion_touchpoints(&events, &conversions, days(7));
        assert_eq!(tps.len(), 1);
        assert_eq!(tps[0].utm_source.as_deref(), Some("google"));
        assert_eq!(tps[0].touchpoint_session_id, "x_1");
    }

    #[test]
    fn test_window_bounds() {
        let conversion_ts = ts(10, 12, 0);
        let events = vec![
            // Exactly at the window start: eligible.
            tagged("x_0", with_utm(event(0, Some("x"), "pv", conversion_ts - days(7)), "a", "c")),
            // Exactly at the conversion: not eligible.
            tagged("x_1", with_utm(event(1, Some("x"), "pv", conversion_ts), "b", "c")),
            // After the conversion.
            tagged("x_2", with_utm(event(2, Some("x"), "pv", ts(10, 13, 0)), "c", "c")),
        ];
        let tps = build_conversion_touchpoints(
            &events,
            &[conversion("T1", Some("x"), conversion_ts)],
            days(7),
        );
        let sources: Vec<_> = tps.iter().map(|t| t.utm_source.as_deref()).collect();
        assert_eq!(sources, vec![Some("a")]);
    }

    #[test]
    fn test_lookback_wider_than_calendar_keeps_all_prior_touchpoints() {
        let events = vec![
            tagged("x_0", with_utm(event(0, Some("x"), "pv", ts(1, 0, 0)), "a", "c")),
            tagged("x_1", with_utm(event(1, Some("x"), "pv", ts(10, 13, 0)), "b", "c")),
        ];
        let tps = build_conversion_touchpoints(
            &events,
            &[conversion("T1", Some("x"), ts(10, 12, 0))],
            days(200_000_000),
        );
        let sources: Vec<_> = tps.iter().map(|t| t.utm_source.as_deref()).collect();
        assert_eq!(sources, vec![Some("a")]);
    }

    #[test]
    fn test_non_marketing_and_other_clients_ignored() {
        let events = vec![
            tagged("x_0", event(0, Some("x"), "page_view", ts(9, 12, 0))),
            tagged("y_0", with_utm(event(1, Some("y"), "page_view", ts(9, 12, 0)), "fb", "c")),
            tagged("anon_event_2_0", with_utm(event(2, None, "page_view", ts(9, 12, 0)), "fb", "c")),
        ];
        let conversions = vec![
            conversion("T1", Some("x"), ts(10, 12, 0)),
            conversion("T2", None, ts(10, 12, 0)),
        ];
        assert!(build_conversion_touchpoints(&events, &conversions, days(7)).is_empty());
    }

    #[test]
    fn test_output_order() {
        let events = vec![
            tagged("x_1", with_utm(event(0, Some("x"), "pv", ts(9, 12, 0)), "late", "c")),
            tagged("x_0", with_utm(event(1, Some("x"), "pv", ts(8, 12, 0)), "early", "c")),
        ];
        let conversions = vec![
            conversion("T2", Some("x"), ts(10, 0, 0)),
            conversion("T1", Some("x"), ts(10, 0, 0)),
        ];
        let tps = build_conversion_touchpoints(&events, &conversions, days(7));
        let got: Vec<_> = tps
            .iter()
            .map(|t| (t.conversion_id.as_str(), t.utm_source.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(
            got,
            vec![("T1", "early"), ("T1", "late"), ("T2", "early"), ("T2", "late")]
        );
    }
}
