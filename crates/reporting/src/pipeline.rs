//! Explicit orchestration of the engine stages. Every stage is a pure
//! function over the previous stage's output; nothing is shared or mutated.

use crate::attribution::build_fact_attribution;
use crate::conversions::{build_fact_conversions, RejectedConversion};
use crate::reconcile::{reconcile, ReconciliationReport};
use crate::sessionize::assign_sessions;
use crate::sessions::build_sessions;
use crate::touchpoints::build_conversion_touchpoints;
use clickpath_core::types::{AttributionRecord, ConversionFact, EnrichedEvent, Session, SessionEvent};
use clickpath_core::{PipelineConfig, PipelineResult};
use std::time::Instant;
use tracing::{info, info_span};

/// Everything a successful run produces. Only constructed once reconciliation
/// has passed.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub events: Vec<SessionEvent>,
    pub sessions: Vec<Session>,
    pub conversions: Vec<ConversionFact>,
    pub attribution: Vec<AttributionRecord>,
    pub rejected: Vec<RejectedConversion>,
    pub reconciliation: ReconciliationReport,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run sessionization through reconciliation over a fully materialized
    /// event set. Aborts on the first fatal error.
    pub fn run(&self, events: &[EnrichedEvent]) -> PipelineResult<PipelineOutput> {
        let _span = info_span!("pipeline", events = events.len()).entered();
        let started = Instant::now();
        let config = &self.config;

        let tagged = assign_sessions(events, config.session.timeout());
        let sessions = build_sessions(&tagged, &config.conversion.event_name);
        let extraction = build_fact_conversions(&tagged, &config.conversion)?;
        let touchpoints = build_conversion_touchpoints(
            &tagged,
            &extraction.facts,
            config.attribution.lookback(),
        );
        let attribution = build_fact_attribution(&touchpoints, &extraction.facts);
        let reconciliation = reconcile(
            &sessions,
            &extraction.facts,
            &attribution,
            config.attribution.revenue_tolerance,
        )
        .into_result()?;

        metrics::counter!("pipeline.events").increment(tagged.len() as u64);
        metrics::counter!("pipeline.sessions").increment(sessions.len() as u64);
        metrics::counter!("pipeline.conversions").increment(extraction.facts.len() as u64);
        metrics::counter!("pipeline.attribution_rows").increment(attribution.len() as u64);
        metrics::counter!("pipeline.payload_rejected").increment(extraction.rejected.len() as u64);

        info!(
            sessions = sessions.len(),
            conversions = extraction.facts.len(),
            touchpoints = touchpoints.len(),
            revenue = reconciliation.conversion_revenue,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );

        Ok(PipelineOutput {
            events: tagged,
            sessions,
            conversions: extraction.facts,
            attribution,
            rejected: extraction.rejected,
            reconciliation,
        })
    }
}
