use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root run configuration. Loaded from an optional TOML file and environment
/// variables with the prefix `CLICKPATH__`, then overridden from the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity gap after which the next event opens a new session.
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,
}

impl SessionConfig {
    /// Saturates at the largest representable span; `validate` rejects
    /// values that do not fit.
    pub fn timeout(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.timeout_minutes)
            .unwrap_or_else(chrono::Duration::max_value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Absolute tolerance for the revenue conservation check.
    #[serde(default = "default_revenue_tolerance")]
    pub revenue_tolerance: f64,
}

impl AttributionConfig {
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.lookback_days).unwrap_or_else(chrono::Duration::max_value)
    }
}

/// What to do with a conversion event whose payload cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadPolicy {
    /// Abort the whole run on the first bad payload.
    #[default]
    Abort,
    /// Drop the event, log it, and keep going.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default = "default_conversion_event")]
    pub event_name: String,
    #[serde(default)]
    pub payload_policy: PayloadPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Refuse to run the engine when any input file fails validation.
    #[serde(default = "default_enforce_quality")]
    pub enforce: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Number of most recent conversions averaged into the revenue baseline.
    #[serde(default = "default_baseline_lookback")]
    pub baseline_lookback: usize,
    #[serde(default = "default_revenue_change_threshold")]
    pub revenue_change_threshold: f64,
    #[serde(default = "default_direct_share_threshold")]
    pub direct_share_threshold: f64,
}

// Default functions
fn default_timeout_minutes() -> i64 {
    30
}
fn default_lookback_days() -> i64 {
    7
}
fn default_revenue_tolerance() -> f64 {
    1e-6
}
fn default_conversion_event() -> String {
    "checkout_completed".to_string()
}
fn default_enforce_quality() -> bool {
    true
}
fn default_baseline_lookback() -> usize {
    7
}
fn default_revenue_change_threshold() -> f64 {
    0.3
}
fn default_direct_share_threshold() -> f64 {
    0.7
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
        }
    }
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            revenue_tolerance: default_revenue_tolerance(),
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            event_name: default_conversion_event(),
            payload_policy: PayloadPolicy::default(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enforce: default_enforce_quality(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            baseline_lookback: default_baseline_lookback(),
            revenue_change_threshold: default_revenue_change_threshold(),
            direct_share_threshold: default_direct_share_threshold(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from an optional config file and environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CLICKPATH")
                .separator("__")
                .try_parsing(true),
        );

        let config: PipelineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.timeout_minutes <= 0 {
            return Err(ConfigError::Invalid {
                field: "session.timeout_minutes",
                reason: format!("must be positive, got {}", self.session.timeout_minutes),
            });
        }
        if chrono::Duration::try_minutes(self.session.timeout_minutes).is_none() {
            return Err(ConfigError::Invalid {
                field: "session.timeout_minutes",
                reason: format!("{} minutes is out of range", self.session.timeout_minutes),
            });
        }
        if self.attribution.lookback_days <= 0 {
            return Err(ConfigError::Invalid {
                field: "attribution.lookback_days",
                reason: format!("must be positive, got {}", self.attribution.lookback_days),
            });
        }
        if chrono::Duration::try_days(self.attribution.lookback_days).is_none() {
            return Err(ConfigError::Invalid {
                field: "attribution.lookback_days",
                reason: format!("{} days is out of range", self.attribution.lookback_days),
            });
        }
        let tolerance = self.attribution.revenue_tolerance;
        if tolerance.is_nan() || tolerance < 0.0 {
            return Err(ConfigError::Invalid {
                field: "attribution.revenue_tolerance",
                reason: format!("must be >= 0, got {}", self.attribution.revenue_tolerance),
            });
        }
        if self.conversion.event_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "conversion.event_name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
