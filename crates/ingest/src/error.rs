use clickpath_core::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("No CSV files found in {}", dir.display())]
    NoInputFiles { dir: PathBuf },

    #[error("{file}: required column `{column}` is absent")]
    MissingColumn { file: String, column: &'static str },

    #[error("{file} row {row}: `{column}` is empty")]
    MissingValue {
        file: String,
        row: usize,
        column: &'static str,
    },

    #[error("{file} row {row}: unparseable timestamp {value:?}")]
    InvalidTimestamp {
        file: String,
        row: usize,
        value: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
