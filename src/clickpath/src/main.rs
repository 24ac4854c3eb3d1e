//! Clickpath: batch sessionization and first/last-click revenue attribution
//! over web-analytics event exports.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use clickpath_core::config::PayloadPolicy;
use clickpath_core::{PipelineConfig, PipelineError};
use clickpath_ingest::{build_enriched_events, read_event_files, validate_files, SchemaContract};
use clickpath_monitoring::{run_monitoring, MonitoringInput, MonitoringReport};
use clickpath_reporting::export::{self, OutputPaths};
use clickpath_reporting::{write_outputs, Pipeline};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "clickpath")]
#[command(about = "Sessionize web events and attribute revenue to marketing touchpoints")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the data-quality gate over a directory of event CSVs
    Validate {
        /// Directory holding the raw event CSV files
        input: PathBuf,
    },

    /// Build sessions, conversions and attribution facts
    Run {
        /// Directory holding the raw event CSV files
        input: PathBuf,

        /// Directory the output CSVs are written to
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Optional TOML config file
        #[arg(short, long, env = "CLICKPATH_CONFIG")]
        config: Option<PathBuf>,

        /// Inactivity gap that closes a session (overrides config)
        #[arg(long)]
        session_timeout_minutes: Option<i64>,

        /// Touchpoint lookback window (overrides config)
        #[arg(long)]
        lookback_days: Option<i64>,

        /// Event name that marks a purchase (overrides config)
        #[arg(long)]
        conversion_event: Option<String>,

        /// What to do with an unparseable conversion payload (overrides config)
        #[arg(long, value_enum)]
        payload_policy: Option<PolicyArg>,

        /// Continue even when the data-quality gate fails
        #[arg(long, default_value_t = false)]
        skip_quality_gate: bool,

        /// Run the monitoring checks after writing outputs
        #[arg(long, default_value_t = false)]
        monitor: bool,
    },

    /// Run KPI and pipeline-health checks over a previous run's outputs
    Monitor {
        /// Directory holding the output CSVs of a run
        #[arg(default_value = "output")]
        output: PathBuf,

        /// Optional TOML config file
        #[arg(short, long, env = "CLICKPATH_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Abort,
    Skip,
}

impl From<PolicyArg> for PayloadPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Abort => PayloadPolicy::Abort,
            PolicyArg::Skip => PayloadPolicy::Skip,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "clickpath=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Validate { input } => cmd_validate(&input),
        Commands::Run {
            input,
            output,
            config,
            session_timeout_minutes,
            lookback_days,
            conversion_event,
            payload_policy,
            skip_quality_gate,
            monitor,
        } => {
            let mut config = PipelineConfig::load(config.as_deref())?;

            // Apply CLI overrides
            if let Some(minutes) = session_timeout_minutes {
                config.session.timeout_minutes = minutes;
            }
            if let Some(days) = lookback_days {
                config.attribution.lookback_days = days;
            }
            if let Some(event_name) = conversion_event {
                config.conversion.event_name = event_name;
            }
            if let Some(policy) = payload_policy {
                config.conversion.payload_policy = policy.into();
            }
            if skip_quality_gate {
                config.quality.enforce = false;
            }

            cmd_run(&input, &output, config, monitor)
        }
        Commands::Monitor { output, config } => {
            let config = PipelineConfig::load(config.as_deref())?;
            cmd_monitor(&output, &config)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_validate(input: &Path) -> anyhow::Result<()> {
    let files = read_event_files(input)?;
    let report = validate_files(&files, &SchemaContract::default());
    print_json(&report)?;

    if !report.success {
        return Err(PipelineError::QualityGate {
            files: report.failed_files(),
        }
        .into());
    }
    Ok(())
}

fn cmd_run(input: &Path, output: &Path, config: PipelineConfig, monitor: bool) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config)?;
    let config = pipeline.config();

    info!(
        input = %input.display(),
        output = %output.display(),
        timeout_minutes = config.session.timeout_minutes,
        lookback_days = config.attribution.lookback_days,
        conversion_event = %config.conversion.event_name,
        "Configuration loaded"
    );

    let files = read_event_files(input)?;
    let quality = validate_files(&files, &SchemaContract::default());
    if !quality.success {
        let failed = quality.failed_files();
        if config.quality.enforce {
            return Err(PipelineError::QualityGate { files: failed }.into());
        }
        warn!(files = ?failed, "Data quality gate failed, continuing because enforcement is off");
    }

    let events = build_enriched_events(&files)?;
    let result = pipeline.run(&events)?;
    for rejected in &result.rejected {
        warn!(
            seq = rejected.seq,
            session_id = %rejected.session_id,
            reason = %rejected.reason,
            "Skipped conversion event"
        );
    }

    let paths = write_outputs(&result, output)
        .with_context(|| format!("writing outputs to {}", output.display()))?;
    print_json(&result.reconciliation)?;

    if monitor {
        let input = MonitoringInput {
            event_count: result.events.len(),
            sessions: &result.sessions,
            conversions: &result.conversions,
            attribution: &result.attribution,
        };
        let report = run_monitoring(&input, &config.monitoring, Utc::now().date_naive());
        finish_monitoring(&report)?;
    }

    info!(events = %paths.events.display(), "Run finished");
    Ok(())
}

fn cmd_monitor(output: &Path, config: &PipelineConfig) -> anyhow::Result<()> {
    let paths = OutputPaths::in_dir(output);
    let event_count = export::count_rows(&paths.events)
        .with_context(|| format!("reading {}", paths.events.display()))?;
    let sessions = export::read_sessions(&paths.sessions)?;
    let conversions = export::read_conversions(&paths.conversions)?;
    let attribution = export::read_attribution(&paths.attribution)?;

    let input = MonitoringInput {
        event_count,
        sessions: &sessions,
        conversions: &conversions,
        attribution: &attribution,
    };
    let report = run_monitoring(&input, &config.monitoring, Utc::now().date_naive());
    finish_monitoring(&report)
}

fn finish_monitoring(report: &MonitoringReport) -> anyhow::Result<()> {
    print_json(report)?;
    if !report.passed() {
        bail!("Data monitoring failed with {} alerts", report.alert_count);
    }
    Ok(())
}
