//! Event builders shared by the engine's unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use clickpath_core::types::{EnrichedEvent, SessionEvent};

pub(crate) fn ts(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
}

pub(crate) fn event(seq: usize, client: Option<&str>, name: &str, at: DateTime<Utc>) -> EnrichedEvent {
    EnrichedEvent {
        seq,
        client_id: client.map(str::to_string),
        event_name: name.to_string(),
        event_ts: at,
        page_url: Some(format!("https://shop.example.com/page/{seq}")),
        utm_source: None,
        utm_medium: None,
        utm_campaign: None,
        utm_content: None,
        device_type: None,
        operating_system: None,
        browser: None,
        is_mobile: None,
        user_agent: None,
        event_data: None,
    }
}

pub(crate) fn with_utm(mut e: EnrichedEvent, source: &str, campaign: &str) -> EnrichedEvent {
    e.utm_source = Some(source.to_string());
    e.utm_medium = Some("cpc".to_string());
    e.utm_campaign = Some(campaign.to_string());
    e
}

pub(crate) fn purchase(
    seq: usize,
    client: Option<&str>,
    at: DateTime<Utc>,
    transaction_id: &str,
    revenue: f64,
) -> EnrichedEvent {
    let mut e = event(seq, client, "checkout_completed", at);
    e.event_data = Some(format!(
        r#"{{"transaction_id": "{transaction_id}", "revenue": {revenue}}}"#
    ));
    e
}

pub(crate) fn tagged(session_id: &str, event: EnrichedEvent) -> SessionEvent {
    SessionEvent {
        session_id: session_id.to_string(),
        event,
    }
}

pub(crate) fn days(n: i64) -> Duration {
    Duration::days(n)
}
