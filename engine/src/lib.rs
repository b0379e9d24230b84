//! Fixity verification engine.
//!
//! Reconciles the current contents of a directory tree against a recorded
//! reference (an ingest manifest or a prior validation log) and classifies
//! every path on either side:
//!
//! - `Validated`: present in both, digests equal
//! - `Mismatched`: present in both, digests differ
//! - `MissingFromReference`: on disk but never recorded
//! - `MissingFromDirectory`: recorded but gone (or unreadable)
//!
//! The typical lifecycle:
//!
//! ```no_run
//! use engine::{create_run, plan_run, run_verification, CsvReport, RunConfig};
//!
//! let mut run = create_run("/preservation/collection-42", RunConfig::default())?;
//! plan_run(&mut run)?;
//! let report_path = CsvReport::default_path(&run.root);
//! let mut report = CsvReport::create(&report_path)?;
//! let summary = run_verification(&mut run, None, &mut report)?;
//! println!("{} validated, {} findings", summary.validated, summary.invalid());
//! # Ok::<(), engine::EngineError>(())
//! ```

pub mod digest;
pub mod error;
pub mod model;
pub mod progress;
pub mod reconcile;
pub mod reference;
pub mod report;
pub mod walk;

pub use digest::{compute_file_digest, DigestAlgorithm};
pub use error::EngineError;
pub use model::{
    ReconciliationRecord, RecordStatus, RunConfig, RunState, RunSummary, VerificationRun,
};
pub use progress::ProgressCallback;
pub use reconcile::{create_run, plan_run, run_verification};
pub use reference::{ReferenceForm, ReferenceIndex};
pub use report::{CsvReport, ReportSink};
