use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device class derived from the user agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
        }
    }
}

/// UTM parameters carried on a landing URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub content: Option<String>,
}

impl UtmParams {
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.medium.is_none()
            && self.campaign.is_none()
            && self.content.is_none()
    }
}

/// A raw analytics event after UTM and user-agent enrichment.
///
/// `seq` is the position of the event in the concatenated input and is the
/// tie-break for every ordering decision downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub seq: usize,
    pub client_id: Option<String>,
    pub event_name: String,
    pub event_ts: DateTime<Utc>,
    pub page_url: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub device_type: Option<DeviceType>,
    pub operating_system: Option<String>,
    pub browser: Option<String>,
    pub is_mobile: Option<bool>,
    pub user_agent: Option<String>,
    /// Raw JSON payload; required for conversion events.
    pub event_data: Option<String>,
}

impl EnrichedEvent {
    /// An event carrying at least one UTM field.
    pub fn is_marketing(&self) -> bool {
        self.utm_source.is_some()
            || self.utm_medium.is_some()
            || self.utm_campaign.is_some()
            || self.utm_content.is_some()
    }

    pub fn utm(&self) -> UtmParams {
        UtmParams {
            source: self.utm_source.clone(),
            medium: self.utm_medium.clone(),
            campaign: self.utm_campaign.clone(),
            content: self.utm_content.clone(),
        }
    }
}

/// An enriched event tagged with the session it was assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub event: EnrichedEvent,
}

/// One summary row per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub client_id: Option<String>,
    pub session_start_ts: DateTime<Utc>,
    pub session_end_ts: DateTime<Utc>,
    pub session_duration_seconds: f64,
    pub event_count: u64,
    pub has_conversion: bool,
    pub landing_page: Option<String>,
    pub landing_utm_source: Option<String>,
    pub landing_utm_medium: Option<String>,
    pub landing_utm_campaign: Option<String>,
    pub landing_device_type: Option<DeviceType>,
    pub landing_operating_system: Option<String>,
    pub landing_browser: Option<String>,
    pub landing_is_mobile: Option<bool>,
}

/// A deduplicated purchase, one per transaction id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionFact {
    pub conversion_id: String,
    pub client_id: Option<String>,
    pub session_id: String,
    pub conversion_ts: DateTime<Utc>,
    pub revenue: f64,
    pub event_data: Option<String>,
}

/// A marketing event eligible for credit on a conversion. Only lives for the
/// duration of attribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Touchpoint {
    pub conversion_id: String,
    pub conversion_ts: DateTime<Utc>,
    pub touchpoint_ts: DateTime<Utc>,
    pub touchpoint_seq: usize,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub touchpoint_session_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AttributionModel {
    FirstClick,
    LastClick,
}

impl AttributionModel {
    pub const ALL: [AttributionModel; 2] = [AttributionModel::FirstClick, AttributionModel::LastClick];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionModel::FirstClick => "first_click",
            AttributionModel::LastClick => "last_click",
        }
    }
}

impl fmt::Display for AttributionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Revenue credit for one conversion under one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub conversion_id: String,
    pub attribution_model: AttributionModel,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub sessions_to_conversion: u64,
    pub revenue: f64,
}

impl AttributionRecord {
    pub fn is_direct(&self) -> bool {
        self.utm_source.as_deref() == Some(DIRECT_SOURCE)
    }
}

/// Fallback channel for conversions without an eligible touchpoint.
pub const DIRECT_SOURCE: &str = "direct";
pub const DIRECT_MEDIUM: &str = "none";
pub const DIRECT_CAMPAIGN: &str = "direct";
