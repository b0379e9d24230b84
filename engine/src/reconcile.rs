//! Reconciliation engine.
//!
//! This module provides the run lifecycle:
//! - Creating a run from a root directory and configuration
//! - Planning a run (locating the reference, loading the index,
//!   enumerating the tree)
//! - Executing the run: hashing every candidate file through a bounded
//!   worker pool, folding each (path, digest) against the read-only
//!   reference index, then a closing pass over reference entries never
//!   observed on disk.
//!
//! The fold is the single writer for records and the seen set; workers
//! only produce digests. Every distinct normalized path appearing in the
//! reference, the walk, or both yields exactly one record.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::SystemTime;
use chrono::Local;
use uuid::Uuid;
use crate::digest;
use crate::error::EngineError;
use crate::model::{
    ReconciliationRecord, RecordStatus, RunConfig, RunState, RunSummary, VerificationRun,
};
use crate::progress::ProgressCallback;
use crate::reference::{self, normalize_path, ReferenceForm};
use crate::report::ReportSink;
use crate::walk;

/// Create a new verification run.
///
/// Validates that the root exists and is a directory. Reference
/// discovery and enumeration happen later, in `plan_run`.
pub fn create_run<P: AsRef<Path>>(
    root: P,
    config: RunConfig,
) -> Result<VerificationRun, EngineError> {
    let root = root.as_ref();

    match std::fs::metadata(root) {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(EngineError::InvalidPath {
                    path: root.to_path_buf(),
                    reason: "Root must be a directory".to_string(),
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EngineError::RootNotFound {
                path: root.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(EngineError::RootAccessDenied {
                path: root.to_path_buf(),
                source: e,
            });
        }
    }

    Ok(VerificationRun {
        id: Uuid::new_v4(),
        root: root.to_path_buf(),
        config,
        state: RunState::Pending,
        reference: None,
        planned_files: Vec::new(),
        records: Vec::new(),
        created_at: SystemTime::now(),
        start_time: None,
        end_time: None,
    })
}

/// Plan a run: locate and load the reference index, then enumerate the
/// candidate files.
///
/// The reference file itself is removed from the candidate list even
/// when its name slips past the exclusion patterns; the engine never
/// reconciles its own bookkeeping as collection content.
pub fn plan_run(run: &mut VerificationRun) -> Result<(), EngineError> {
    if run.state != RunState::Pending {
        return Err(EngineError::InvalidPath {
            path: run.root.clone(),
            reason: format!(
                "Run must be in Pending state to plan; current state: {:?}",
                run.state
            ),
        });
    }

    let (reference_path, form) = match &run.config.reference_path {
        Some(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| EngineError::InvalidPath {
                    path: path.clone(),
                    reason: "Reference path has no file name".to_string(),
                })?;
            let form =
                ReferenceForm::for_explicit(&name).ok_or_else(|| EngineError::InvalidPath {
                    path: path.clone(),
                    reason: "Not a recognized reference format (expected .txt manifest or .csv log)"
                        .to_string(),
                })?;
            (path.clone(), form)
        }
        None => reference::discover_reference(&run.root)?,
    };

    let index = reference::load_reference(&reference_path, form, run.config.ignore_path_case)?;

    let mut files = walk::enumerate_files(&run.root, &run.config.exclude_patterns)?;
    files.retain(|p| p != &reference_path);

    run.reference = Some(index);
    run.planned_files = files;
    Ok(())
}

/// Execute a planned run.
///
/// Hashing of independent files runs on a bounded worker pool sharing
/// the read-only reference index; results are slotted by walk position
/// so emission order is deterministic for a fixed tree. Per-file read
/// failures become records, never aborts. After the walk-driven phase,
/// the closing pass emits MissingFromDirectory for every reference path
/// never seen.
///
/// Records go to `sink` in emission order; the same records are kept on
/// the run for callers that want the auditable detail in memory.
pub fn run_verification(
    run: &mut VerificationRun,
    progress: Option<&dyn ProgressCallback>,
    sink: &mut dyn ReportSink,
) -> Result<RunSummary, EngineError> {
    if run.state != RunState::Pending {
        return Err(EngineError::InvalidPath {
            path: run.root.clone(),
            reason: format!(
                "Run must be in Pending state to execute; current state: {:?}",
                run.state
            ),
        });
    }
    if run.reference.is_none() {
        return Err(EngineError::InvalidPath {
            path: run.root.clone(),
            reason: "Run must be planned before verification".to_string(),
        });
    }

    run.state = RunState::Running;
    run.start_time = Some(SystemTime::now());

    if let Some(callback) = progress {
        callback.on_run_started(run);
    }

    let algorithm = run.config.algorithm;
    let retries = run.config.read_retries;
    let retry_delay = run.config.retry_delay;
    let ignore_case = run.config.ignore_path_case;

    // Phase 1: hash all candidate files. Workers pull indices from a
    // shared counter and write into position-stable slots, so the fold
    // below sees results in walk order regardless of completion order.
    let results = {
        let files = &run.planned_files;
        let mut slots: Vec<Option<Result<String, EngineError>>> = Vec::with_capacity(files.len());
        slots.resize_with(files.len(), || None);
        let slots = Mutex::new(slots);
        let next = AtomicUsize::new(0);
        let workers = run.config.workers.clamp(1, files.len().max(1));

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= files.len() {
                        break;
                    }
                    let outcome =
                        digest::compute_file_digest_with_retry(&files[i], algorithm, retries, retry_delay);
                    let mut guard = slots
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    guard[i] = Some(outcome);
                });
            }
        });

        slots
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };

    // Phase 2: single-writer fold against the reference index. The seen
    // set tracks matched reference keys for the closing pass.
    let reference = match run.reference.take() {
        Some(index) => index,
        None => unreachable!("checked above"),
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut records: Vec<ReconciliationRecord> =
        Vec::with_capacity(run.planned_files.len() + reference.len());

    for (i, slot) in results.into_iter().enumerate() {
        let raw = run.planned_files[i].to_string_lossy();
        let reported = normalize_path(&raw, false);
        let normalized = normalize_path(&raw, ignore_case);
        let expected_entry = reference.expected(&normalized);

        let outcome = slot.unwrap_or_else(|| {
            Err(EngineError::Unknown {
                message: "hashing worker produced no result".to_string(),
            })
        });

        let record = match outcome {
            Ok(hex) => {
                let observed = hex.to_ascii_uppercase();
                match expected_entry {
                    None => make_record(
                        reported,
                        RecordStatus::MissingFromReference,
                        None,
                        Some(observed),
                        Some("absent from record".to_string()),
                    ),
                    Some(None) => make_record(
                        reported,
                        RecordStatus::Mismatched,
                        None,
                        Some(observed),
                        Some("no expected digest recorded".to_string()),
                    ),
                    Some(Some(expected)) => {
                        let status = if *expected == observed {
                            RecordStatus::Validated
                        } else {
                            RecordStatus::Mismatched
                        };
                        make_record(reported, status, Some(expected.clone()), Some(observed), None)
                    }
                }
            }
            Err(e) => make_record(
                reported,
                RecordStatus::MissingFromDirectory,
                expected_entry.and_then(|d| d.clone()),
                None,
                Some(format!("unreadable: {}", e)),
            ),
        };

        seen.insert(normalized);
        emit(&mut records, record, sink, progress)?;
    }

    // Closing pass: reference entries with no matching path on disk.
    // BTreeMap order keeps this deterministic across runs.
    for (key, expected) in reference.iter() {
        if seen.contains(key) {
            continue;
        }
        let record = make_record(
            key.clone(),
            RecordStatus::MissingFromDirectory,
            expected.clone(),
            None,
            Some("absent from filesystem".to_string()),
        );
        emit(&mut records, record, sink, progress)?;
    }

    let summary = RunSummary::from_records(&records, run.planned_files.len());
    sink.finish(&summary)?;

    run.records = records;
    run.reference = Some(reference);
    run.state = RunState::Completed;
    run.end_time = Some(SystemTime::now());

    if let Some(callback) = progress {
        callback.on_run_completed(&summary);
    }

    Ok(summary)
}

fn make_record(
    path: String,
    status: RecordStatus,
    expected_digest: Option<String>,
    observed_digest: Option<String>,
    note: Option<String>,
) -> ReconciliationRecord {
    ReconciliationRecord {
        path,
        status,
        expected_digest,
        observed_digest,
        note,
        timestamp: Local::now(),
    }
}

fn emit(
    records: &mut Vec<ReconciliationRecord>,
    record: ReconciliationRecord,
    sink: &mut dyn ReportSink,
    progress: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    sink.write_record(&record)?;
    if let Some(callback) = progress {
        callback.on_record(records.len(), &record);
    }
    records.push(record);
    Ok(())
}
