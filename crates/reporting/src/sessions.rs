//! Session rollup: one summary row per session id.

use clickpath_core::types::{Session, SessionEvent};
use std::collections::BTreeMap;
use tracing::info;

/// Reduce session-tagged events to session rows, ordered by session id.
/// Landing attributes come from the chronologically first event.
pub fn build_sessions(events: &[SessionEvent], conversion_event: &str) -> Vec<Session> {
    let mut groups: BTreeMap<&str, Vec<&SessionEvent>> = BTreeMap::new();
    for tagged in events {
        groups.entry(tagged.session_id.as_str()).or_default().push(tagged);
    }

    let sessions: Vec<Session> = groups
        .into_iter()
        .filter_map(|(session_id, members)| summarize(session_id, &members, conversion_event))
        .collect();

    info!(
        sessions = sessions.len(),
        converting = sessions.iter().filter(|s| s.has_conversion).count(),
        "Built sessions"
    );
    sessions
}

fn summarize(session_id: &str, members: &[&SessionEvent], conversion_event: &str) -> Option<Session> {
    let landing = &members
        .iter()
        .min_by_key(|t| (t.event.event_ts, t.event.seq))?
        .event;
    let start = members.iter().map(|t| t.event.event_ts).min()?;
    let end = members.iter().map(|t| t.event.event_ts).max()?;

    Some(Session {
        session_id: session_id.to_string(),
        client_id: landing.client_id.clone(),
        session_start_ts: start,
        session_end_ts: end,
        session_duration_seconds: (end - start).num_milliseconds() as f64 / 1000.0,
        event_count: members.len() as u64,
        has_conversion: members
            .iter()
            .any(|t| t.event.event_name == conversion_event),
        landing_page: landing.page_url.clone(),
        landing_utm_source: landing.utm_source.clone(),
        landing_utm_medium: landing.utm_medium.clone(),
        landing_utm_campaign: landing.utm_campaign.clone(),
        landing_device_type: landing.device_type,
        landing_operating_system: landing.operating_system.clone(),
        landing_browser: landing.browser.clone(),
        landing_is_mobile: landing.is_mobile,
    })
}
