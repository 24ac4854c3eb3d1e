//! Raw event ingestion: CSV loading, the data-quality gate, and per-row
//! enrichment into typed events.

pub mod enrich;
pub mod error;
pub mod quality;
pub mod reader;

pub use enrich::build_enriched_events;
pub use error::{IngestError, IngestResult};
pub use quality::{validate_files, QualityReport, SchemaContract};
pub use reader::{read_event_file, read_event_files, RawEventFile};
