//! Per-row enrichment: client identity resolution, timestamp parsing, UTM
//! extraction and user-agent classification.

use crate::error::{IngestError, IngestResult};
use crate::reader::RawEventFile;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clickpath_core::types::{DeviceType, EnrichedEvent, UtmParams};
use clickpath_core::ConfigError;
use tracing::{debug, info};

/// Identity columns in order of preference. `clientId` is the legacy spelling.
pub const CLIENT_ID_COLUMNS: [&str; 2] = ["client_id", "clientId"];

/// Device, OS and browser classification of a user agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub device_type: Option<DeviceType>,
    pub operating_system: Option<String>,
    pub browser: Option<String>,
    pub is_mobile: Option<bool>,
}

/// Columns that carry the client identity in this file, best first.
pub fn resolve_client_id_columns(file: &RawEventFile) -> Result<Vec<usize>, ConfigError> {
    let columns: Vec<usize> = CLIENT_ID_COLUMNS
        .iter()
        .filter_map(|name| file.column_index(name))
        .collect();
    if columns.is_empty() {
        return Err(ConfigError::MissingIdentityColumn {
            expected: CLIENT_ID_COLUMNS.iter().map(|c| c.to_string()).collect(),
        });
    }
    Ok(columns)
}

/// Pull `utm_*` query parameters out of a page URL. Unparseable or missing
/// URLs produce no parameters; blank values are treated as absent and the
/// first occurrence of a repeated key wins.
pub fn extract_utm_params(page_url: Option<&str>) -> UtmParams {
    let Some(parsed) = page_url.and_then(|u| url::Url::parse(u).ok()) else {
        return UtmParams::default();
    };

    let mut utm = UtmParams::default();
    for (key, value) in parsed.query_pairs() {
        if value.is_empty() {
            continue;
        }
        let slot = match key.as_ref() {
            "utm_source" => &mut utm.source,
            "utm_medium" => &mut utm.medium,
            "utm_campaign" => &mut utm.campaign,
            "utm_content" => &mut utm.content,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }
    utm
}

/// Substring-based user-agent classification, sufficient for channel
/// reporting.
pub fn parse_user_agent(user_agent: Option<&str>) -> UserAgentInfo {
    let Some(ua) = user_agent else {
        return UserAgentInfo::default();
    };
    let ua = ua.to_lowercase();
    let has = |needle: &str| ua.contains(needle);

    let device_type = if has("mobile") || has("iphone") || has("android") {
        DeviceType::Mobile
    } else if has("tablet") || has("ipad") {
        DeviceType::Tablet
    } else {
        DeviceType::Desktop
    };

    let operating_system = if has("android") {
        "Android"
    } else if has("iphone") || has("ipad") || has("ios") {
        "iOS"
    } else if has("windows") {
        "Windows"
    } else if has("mac os") || has("macintosh") {
        "MacOS"
    } else if has("linux") {
        "Linux"
    } else {
        "Other"
    };

    let browser = if has("chrome") && has("safari") {
        "Chrome"
    } else if has("safari") && !has("chrome") {
        "Safari"
    } else if has("firefox") {
        "Firefox"
    } else if has("edge") {
        "Edge"
    } else if has("msie") || has("trident") {
        "Internet Explorer"
    } else {
        "Other"
    };

    UserAgentInfo {
        device_type: Some(device_type),
        operating_system: Some(operating_system.to_string()),
        browser: Some(browser.to_string()),
        is_mobile: Some(device_type != DeviceType::Desktop),
    }
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parse an event timestamp into UTC. Accepts RFC 3339, timestamps with a
/// numeric offset, naive timestamps (taken as UTC) and bare dates.
pub fn parse_event_ts(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(value, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

/// Concatenate files in order and enrich every row. `seq` numbers events in
/// that concatenated order.
pub fn build_enriched_events(files: &[RawEventFile]) -> IngestResult<Vec<EnrichedEvent>> {
    let mut events = Vec::with_capacity(files.iter().map(RawEventFile::row_count).sum());

    for file in files {
        let id_columns = resolve_client_id_columns(file)?;
        let required = |column: &'static str| {
            file.column_index(column).ok_or_else(|| IngestError::MissingColumn {
                file: file.file_name.clone(),
                column,
            })
        };
        let name_idx = required("event_name")?;
        let ts_idx = required("timestamp")?;
        let url_idx = file.column_index("page_url");
        let ua_idx = file.column_index("user_agent");
        let data_idx = file.column_index("event_data");

        for (row_no, row) in file.rows.iter().enumerate() {
            let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).and_then(|v| v.clone());

            let client_id = id_columns.iter().find_map(|&i| cell(Some(i)));
            let event_name = cell(Some(name_idx)).ok_or_else(|| IngestError::MissingValue {
                file: file.file_name.clone(),
                row: row_no,
                column: "event_name",
            })?;
            let raw_ts = cell(Some(ts_idx)).unwrap_or_default();
            let event_ts = parse_event_ts(&raw_ts).ok_or_else(|| IngestError::InvalidTimestamp {
                file: file.file_name.clone(),
                row: row_no,
                value: raw_ts.clone(),
            })?;

            let page_url = cell(url_idx);
            let user_agent = cell(ua_idx);
            let utm = extract_utm_params(page_url.as_deref());
            let ua = parse_user_agent(user_agent.as_deref());

            events.push(EnrichedEvent {
                seq: events.len(),
                client_id,
                event_name,
                event_ts,
                page_url,
                utm_source: utm.source,
                utm_medium: utm.medium,
                utm_campaign: utm.campaign,
                utm_content: utm.content,
                device_type: ua.device_type,
                operating_system: ua.operating_system,
                browser: ua.browser,
                is_mobile: ua.is_mobile,
                user_agent,
                event_data: cell(data_idx),
            });
        }
        debug!(file = %file.file_name, rows = file.row_count(), "Enriched file");
    }

    info!(
        events = events.len(),
        marketing = events.iter().filter(|e| e.is_marketing()).count(),
        anonymous = events.iter().filter(|e| e.client_id.is_none()).count(),
        "Built enriched events"
    );
    Ok(events)
}
