//! Core data model for verification runs.
//!
//! This module defines the main data structures for representing a fixity
//! verification pass:
//! - VerificationRun: one complete pass over a directory tree
//! - ReconciliationRecord: the classified outcome for a single path
//! - RunConfig, RecordStatus, RunState: configuration and state enums

use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;
use crate::digest::DigestAlgorithm;
use crate::reference::ReferenceIndex;
use crate::walk;

/// Represents a single verification run against one directory tree.
///
/// A VerificationRun encompasses:
/// - The root directory and run configuration
/// - The loaded reference index (after planning)
/// - The enumerated candidate files (after planning)
/// - All reconciliation records produced (after execution)
#[derive(Debug)]
pub struct VerificationRun {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Root directory being verified
    pub root: PathBuf,

    /// Run configuration
    pub config: RunConfig,

    /// Current run state (Pending, Running, Completed)
    pub state: RunState,

    /// Reference index loaded during planning.
    /// Immutable once built; the closing pass reads it a second time.
    pub reference: Option<ReferenceIndex>,

    /// Candidate files enumerated during planning, in stable walk order
    pub planned_files: Vec<PathBuf>,

    /// Records produced so far, in emission order
    pub records: Vec<ReconciliationRecord>,

    /// When the run was created
    pub created_at: SystemTime,

    /// When execution started
    pub start_time: Option<SystemTime>,

    /// When execution completed
    pub end_time: Option<SystemTime>,
}

/// Configuration surface for a verification run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Digest algorithm. Defaults to MD5 for compatibility with
    /// existing ingest manifests.
    pub algorithm: DigestAlgorithm,

    /// Fold both reference and observed paths to lowercase before
    /// indexing and lookup. Off by default: folding on a case-sensitive
    /// filesystem can produce false validations.
    pub ignore_path_case: bool,

    /// Case-insensitive substring patterns for bookkeeping files the
    /// walker must skip (manifests, prior logs, preservation metadata).
    pub exclude_patterns: Vec<String>,

    /// Explicit reference file, overriding auto-discovery.
    pub reference_path: Option<PathBuf>,

    /// Bound on concurrent hashing workers.
    pub workers: usize,

    /// Retries per file read before recording it as unreadable.
    /// Intended for trees hosted on flaky network shares.
    pub read_retries: u32,

    /// Delay between read retries.
    pub retry_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            algorithm: DigestAlgorithm::Md5,
            ignore_path_case: false,
            exclude_patterns: walk::DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            reference_path: None,
            workers: default_worker_count(),
            read_retries: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(1)
}

/// The classification of a single reconciled path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordStatus {
    /// Path present in both reference and directory, digests equal
    Validated,
    /// Path present in both, digests differ (or no expected digest recorded)
    Mismatched,
    /// Path present in the directory but absent from the reference
    MissingFromReference,
    /// Path present in the reference but absent from the directory,
    /// or present but unreadable
    MissingFromDirectory,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Validated => write!(f, "Validated"),
            RecordStatus::Mismatched => write!(f, "Mismatched"),
            RecordStatus::MissingFromReference => write!(f, "MissingFromReference"),
            RecordStatus::MissingFromDirectory => write!(f, "MissingFromDirectory"),
        }
    }
}

impl RecordStatus {
    /// Returns true only for Validated; everything else counts as a finding.
    pub fn is_validated(&self) -> bool {
        matches!(self, RecordStatus::Validated)
    }
}

/// The classified outcome for one path. Exactly one record is produced per
/// distinct normalized path appearing in the reference, the directory
/// walk, or both.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationRecord {
    /// Reported path: long-path prefix and wrapping quotes stripped,
    /// original character case preserved
    pub path: String,

    /// Classification
    pub status: RecordStatus,

    /// Digest recorded in the reference, uppercase hex
    pub expected_digest: Option<String>,

    /// Digest computed from the file's bytes, uppercase hex
    pub observed_digest: Option<String>,

    /// Explanatory note ("absent from record", "unreadable: ...", etc.)
    pub note: Option<String>,

    /// When this record was produced
    pub timestamp: DateTime<Local>,
}

/// The state of an entire verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Created, not yet started
    Pending,
    /// Currently executing
    Running,
    /// All paths reconciled (some records may be findings)
    Completed,
}

/// Aggregate counts for a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Files hashed during the walk (including unreadable ones)
    pub files_processed: usize,
    pub validated: usize,
    pub mismatched: usize,
    pub missing_from_reference: usize,
    pub missing_from_directory: usize,
}

impl RunSummary {
    /// Build a summary by counting a slice of records.
    pub fn from_records(records: &[ReconciliationRecord], files_processed: usize) -> Self {
        let mut summary = RunSummary {
            files_processed,
            validated: 0,
            mismatched: 0,
            missing_from_reference: 0,
            missing_from_directory: 0,
        };
        for record in records {
            match record.status {
                RecordStatus::Validated => summary.validated += 1,
                RecordStatus::Mismatched => summary.mismatched += 1,
                RecordStatus::MissingFromReference => summary.missing_from_reference += 1,
                RecordStatus::MissingFromDirectory => summary.missing_from_directory += 1,
            }
        }
        summary
    }

    /// Count of non-Validated records.
    pub fn invalid(&self) -> usize {
        self.mismatched + self.missing_from_reference + self.missing_from_directory
    }

    /// A run is clean iff every record is Validated.
    pub fn is_clean(&self) -> bool {
        self.invalid() == 0
    }
}
