//! Raw event CSV loading. Cells are kept as optional strings; typing happens
//! during enrichment.

use crate::error::{IngestError, IngestResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One input CSV file, untyped.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEventFile {
    pub file_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawEventFile {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of a column, `None` when the column does not exist.
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = Option<&'a str>> + 'a> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(move |row| row.get(idx).and_then(|v| v.as_deref())),
        )
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Read a single CSV file. Empty cells become `None`.
pub fn read_event_file(path: &Path) -> IngestResult<RawEventFile> {
    let csv_err = |source| IngestError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(
            record
                .iter()
                .map(|v| (!v.is_empty()).then(|| v.to_string()))
                .collect(),
        );
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!(file = %file_name, rows = rows.len(), "Read event file");
    Ok(RawEventFile {
        file_name,
        headers,
        rows,
    })
}

/// Read every `*.csv` file in `dir`, ordered by file name so that ingestion
/// order is reproducible.
pub fn read_event_files(dir: &Path) -> IngestResult<Vec<RawEventFile>> {
    let io_err = |source| IngestError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(io_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(IngestError::NoInputFiles {
            dir: dir.to_path_buf(),
        });
    }

    let files = paths
        .iter()
        .map(|p| read_event_file(p))
        .collect::<IngestResult<Vec<_>>>()?;

    info!(
        dir = %dir.display(),
        files = files.len(),
        rows = files.iter().map(RawEventFile::row_count).sum::<usize>(),
        "Loaded raw event files"
    );
    Ok(files)
}
