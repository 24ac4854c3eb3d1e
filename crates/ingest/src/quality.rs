//! Data-quality gate for raw event files. Runs before enrichment and decides
//! whether the engine may consume the input at all.

use crate::enrich::parse_event_ts;
use crate::reader::RawEventFile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Rules for a single column of the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRule {
    pub name: String,
    /// Alternative spellings accepted in place of `name`.
    #[serde(default)]
    pub aliases: Vec<String>,
    pub required: bool,
    pub nullable: bool,
    #[serde(default)]
    pub must_start_with: Option<String>,
    #[serde(default)]
    pub parseable_datetime: bool,
}

impl ColumnRule {
    fn new(name: &str, required: bool, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            required,
            nullable,
            must_start_with: None,
            parseable_datetime: false,
        }
    }

    fn matches(&self, header: &str) -> bool {
        self.name == header || self.aliases.iter().any(|a| a == header)
    }

    /// The header in `file` satisfying this rule, if any.
    fn resolve<'a>(&self, file: &'a RawEventFile) -> Option<&'a str> {
        file.headers
            .iter()
            .find(|h| self.matches(h))
            .map(String::as_str)
    }
}

/// Expected shape of an input event file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaContract {
    pub columns: Vec<ColumnRule>,
    pub allow_extra_columns: bool,
}

impl Default for SchemaContract {
    fn default() -> Self {
        let mut client_id = ColumnRule::new("client_id", true, true);
        client_id.aliases.push("clientId".to_string());

        let mut page_url = ColumnRule::new("page_url", true, false);
        page_url.must_start_with = Some("http".to_string());

        let mut referrer = ColumnRule::new("referrer", true, true);
        referrer.must_start_with = Some("http".to_string());

        let mut timestamp = ColumnRule::new("timestamp", true, false);
        timestamp.parseable_datetime = true;

        Self {
            columns: vec![
                client_id,
                page_url,
                referrer,
                timestamp,
                ColumnRule::new("event_name", true, false),
                ColumnRule::new("event_data", false, true),
                ColumnRule::new("user_agent", true, false),
            ],
            allow_extra_columns: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum FailedCheck {
    Schema {
        missing_columns: Vec<String>,
        unexpected_columns: Vec<String>,
    },
    NotNull {
        column: String,
        null_count: usize,
    },
    ParseableDatetime {
        column: String,
        invalid_count: usize,
    },
    MustStartWith {
        column: String,
        prefix: String,
        invalid_count: usize,
    },
    EventNameNotEmpty {
        invalid_count: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileValidationReport {
    pub file: String,
    pub validated_at: DateTime<Utc>,
    pub row_count: usize,
    pub success: bool,
    pub failed_checks: Vec<FailedCheck>,
}

/// Gate outcome across every input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub run_id: Uuid,
    pub success: bool,
    pub files: Vec<FileValidationReport>,
}

impl QualityReport {
    pub fn failed_files(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| !f.success)
            .map(|f| f.file.clone())
            .collect()
    }
}

fn check_schema(file: &RawEventFile, contract: &SchemaContract) -> Option<FailedCheck> {
    let missing_columns: Vec<String> = contract
        .columns
        .iter()
        .filter(|rule| rule.required && rule.resolve(file).is_none())
        .map(|rule| rule.name.clone())
        .collect();

    let unexpected_columns: Vec<String> = if contract.allow_extra_columns {
        Vec::new()
    } else {
        file.headers
            .iter()
            .filter(|h| !contract.columns.iter().any(|rule| rule.matches(h)))
            .cloned()
            .collect()
    };

    if missing_columns.is_empty() && unexpected_columns.is_empty() {
        None
    } else {
        Some(FailedCheck::Schema {
            missing_columns,
            unexpected_columns,
        })
    }
}

fn check_column_rules(file: &RawEventFile, contract: &SchemaContract) -> Vec<FailedCheck> {
    let mut failures = Vec::new();

    for rule in &contract.columns {
        let Some(header) = rule.resolve(file) else {
            continue;
        };
        let Some(values) = file.column(header) else {
            continue;
        };
        let values: Vec<Option<&str>> = values.collect();

        if !rule.nullable {
            let null_count = values.iter().filter(|v| v.is_none()).count();
            if null_count > 0 {
                failures.push(FailedCheck::NotNull {
                    column: rule.name.clone(),
                    null_count,
                });
            }
        }

        if rule.parseable_datetime {
            let invalid_count = values
                .iter()
                .filter(|v| v.and_then(parse_event_ts).is_none())
                .count();
            if invalid_count > 0 {
                failures.push(FailedCheck::ParseableDatetime {
                    column: rule.name.clone(),
                    invalid_count,
                });
            }
        }

        if let Some(prefix) = &rule.must_start_with {
            let invalid_count = values
                .iter()
                .flatten()
                .filter(|v| !v.starts_with(prefix.as_str()))
                .count();
            if invalid_count > 0 {
                failures.push(FailedCheck::MustStartWith {
                    column: rule.name.clone(),
                    prefix: prefix.clone(),
                    invalid_count,
                });
            }
        }
    }

    failures
}

fn check_event_semantics(file: &RawEventFile) -> Vec<FailedCheck> {
    let Some(names) = file.column("event_name") else {
        return Vec::new();
    };
    let invalid_count = names.flatten().filter(|n| n.trim().is_empty()).count();
    if invalid_count > 0 {
        vec![FailedCheck::EventNameNotEmpty { invalid_count }]
    } else {
        Vec::new()
    }
}

/// Run every check against one file.
pub fn validate_file(file: &RawEventFile, contract: &SchemaContract) -> FileValidationReport {
    let mut failed_checks = Vec::new();
    failed_checks.extend(check_schema(file, contract));
    failed_checks.extend(check_column_rules(file, contract));
    failed_checks.extend(check_event_semantics(file));

    let success = failed_checks.is_empty();
    if !success {
        warn!(file = %file.file_name, failed = failed_checks.len(), "File failed data quality checks");
    }

    FileValidationReport {
        file: file.file_name.clone(),
        validated_at: Utc::now(),
        row_count: file.row_count(),
        success,
        failed_checks,
    }
}

pub fn validate_files(files: &[RawEventFile], contract: &SchemaContract) -> QualityReport {
    let reports: Vec<FileValidationReport> =
        files.iter().map(|f| validate_file(f, contract)).collect();
    let success = reports.iter().all(|r| r.success);

    info!(
        files = reports.len(),
        failed = reports.iter().filter(|r| !r.success).count(),
        success,
        "Data quality gate evaluated"
    );

    QualityReport {
        run_id: Uuid::new_v4(),
        success,
        files: reports,
    }
}
