//! CSV artifacts for downstream reporting and monitoring.

use crate::pipeline::PipelineOutput;
use chrono::{DateTime, Utc};
use clickpath_core::types::{AttributionRecord, ConversionFact, DeviceType, Session, SessionEvent};
use clickpath_core::PipelineResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const EVENTS_FILE: &str = "events_with_sessions.csv";
pub const SESSIONS_FILE: &str = "sessions.csv";
pub const CONVERSIONS_FILE: &str = "fact_conversions.csv";
pub const ATTRIBUTION_FILE: &str = "fact_attribution.csv";

/// Flat shape of a session-tagged event on disk.
#[derive(Serialize)]
struct EventRow<'a> {
    seq: usize,
    session_id: &'a str,
    client_id: Option<&'a str>,
    event_name: &'a str,
    event_ts: DateTime<Utc>,
    page_url: Option<&'a str>,
    utm_source: Option<&'a str>,
    utm_medium: Option<&'a str>,
    utm_campaign: Option<&'a str>,
    utm_content: Option<&'a str>,
    device_type: Option<DeviceType>,
    operating_system: Option<&'a str>,
    browser: Option<&'a str>,
    is_mobile: Option<bool>,
    user_agent: Option<&'a str>,
    event_data: Option<&'a str>,
}

impl<'a> From<&'a SessionEvent> for EventRow<'a> {
    fn from(tagged: &'a SessionEvent) -> Self {
        let e = &tagged.event;
        Self {
            seq: e.seq,
            session_id: &tagged.session_id,
            client_id: e.client_id.as_deref(),
            event_name: &e.event_name,
            event_ts: e.event_ts,
            page_url: e.page_url.as_deref(),
            utm_source: e.utm_source.as_deref(),
            utm_medium: e.utm_medium.as_deref(),
            utm_campaign: e.utm_campaign.as_deref(),
            utm_content: e.utm_content.as_deref(),
            device_type: e.device_type,
            operating_system: e.operating_system.as_deref(),
            browser: e.browser.as_deref(),
            is_mobile: e.is_mobile,
            user_agent: e.user_agent.as_deref(),
            event_data: e.event_data.as_deref(),
        }
    }
}

/// Locations of the four run artifacts inside an output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub events: PathBuf,
    pub sessions: PathBuf,
    pub conversions: PathBuf,
    pub attribution: PathBuf,
}

impl OutputPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            events: dir.join(EVENTS_FILE),
            sessions: dir.join(SESSIONS_FILE),
            conversions: dir.join(CONVERSIONS_FILE),
            attribution: dir.join(ATTRIBUTION_FILE),
        }
    }
}

fn write_table<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> PipelineResult<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut count = 0usize;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Write the four artifacts. Callers only reach this with a reconciled
/// [`PipelineOutput`].
pub fn write_outputs(output: &PipelineOutput, dir: &Path) -> PipelineResult<OutputPaths> {
    std::fs::create_dir_all(dir)?;
    let paths = OutputPaths::in_dir(dir);

    let events = write_table(&paths.events, output.events.iter().map(EventRow::from))?;
    let sessions = write_table(&paths.sessions, &output.sessions)?;
    let conversions = write_table(&paths.conversions, &output.conversions)?;
    let attribution = write_table(&paths.attribution, &output.attribution)?;

    info!(
        dir = %dir.display(),
        events,
        sessions,
        conversions,
        attribution,
        "Wrote output artifacts"
    );
    Ok(paths)
}

fn read_table<T: DeserializeOwned>(path: &Path) -> PipelineResult<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    Ok(rows)
}

pub fn read_sessions(path: &Path) -> PipelineResult<Vec<Session>> {
    read_table(path)
}

pub fn read_conversions(path: &Path) -> PipelineResult<Vec<ConversionFact>> {
    read_table(path)
}

pub fn read_attribution(path: &Path) -> PipelineResult<Vec<AttributionRecord>> {
    read_table(path)
}

/// Number of data rows in a CSV artifact.
pub fn count_rows(path: &Path) -> PipelineResult<usize> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut count = 0usize;
    for record in reader.records() {
        record?;
        count += 1;
    }
    Ok(count)
}
