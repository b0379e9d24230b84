//! Report sink.
//!
//! The engine hands every reconciliation record, in order, to a
//! `ReportSink`; the CSV implementation writes the validation log that a
//! later run can consume as its reference baseline (path in column 1,
//! observed digest in column 4 — the layout the loader's log form reads).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use chrono::Local;
use crate::error::EngineError;
use crate::model::{ReconciliationRecord, RunSummary};
use crate::walk;

/// Timestamp format carried in report rows. Contains a comma, so the
/// field is always quoted on write and the loader splits quote-aware.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d, %H:%M:%S";

const HEADER: [&str; 6] = [
    "Timestamp",
    "File",
    "Checksum_Validated",
    "Expected_Digest",
    "Current_Digest",
    "Note",
];

/// Receives classified records in order and persists them.
pub trait ReportSink {
    /// Persist one record. Called once per reconciled path.
    fn write_record(&mut self, record: &ReconciliationRecord) -> Result<(), EngineError>;

    /// Called after the closing pass; flush and finalize.
    fn finish(&mut self, summary: &RunSummary) -> Result<(), EngineError>;
}

/// CSV validation log writer.
pub struct CsvReport {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvReport {
    /// The conventional report location for a run: a dated
    /// `validation_log_{YYYYMMDD}.csv` inside the root itself. The
    /// walker's default exclusion patterns keep re-runs from hashing it.
    pub fn default_path(root: &Path) -> PathBuf {
        root.join(format!("validation_log_{}.csv", Local::now().format("%Y%m%d")))
    }

    /// Create the report file and write the header row.
    pub fn create(path: &Path) -> Result<Self, EngineError> {
        let file = File::create(walk::io_path(path)).map_err(|e| {
            EngineError::ReportWriteFailed {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        let mut report = CsvReport {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        };
        report.write_row(&HEADER)?;
        Ok(report)
    }

    /// Where this report is being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_row(&mut self, fields: &[&str]) -> Result<(), EngineError> {
        let row = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
        writeln!(self.writer, "{}", row).map_err(|e| EngineError::ReportWriteFailed {
            path: self.path.clone(),
            source: e,
        })
    }
}

impl ReportSink for CsvReport {
    fn write_record(&mut self, record: &ReconciliationRecord) -> Result<(), EngineError> {
        let timestamp = record.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let validated = if record.status.is_validated() { "TRUE" } else { "FALSE" };
        self.write_row(&[
            &timestamp,
            &record.path,
            validated,
            record.expected_digest.as_deref().unwrap_or(""),
            record.observed_digest.as_deref().unwrap_or(""),
            record.note.as_deref().unwrap_or(""),
        ])
    }

    fn finish(&mut self, _summary: &RunSummary) -> Result<(), EngineError> {
        self.writer.flush().map_err(|e| EngineError::ReportWriteFailed {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
