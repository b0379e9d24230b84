//! Progress reporting trait.
//!
//! Decouples the verification engine from any specific UI technology.
//! The CLI provides a terminal implementation; all methods are called
//! synchronously from the engine's single-writer reconciliation loop,
//! in record emission order.

use crate::model::{ReconciliationRecord, RunSummary, VerificationRun};

/// Trait for receiving progress updates from a verification run.
pub trait ProgressCallback: Send {
    /// Called once planning is done and execution starts. The run's
    /// reference index and planned file list are populated at this point.
    fn on_run_started(&self, run: &VerificationRun);

    /// Called for every reconciliation record, in emission order.
    /// `index` is the record's position within the run.
    fn on_record(&self, index: usize, record: &ReconciliationRecord);

    /// Called when every path has been reconciled.
    fn on_run_completed(&self, summary: &RunSummary);
}
