//! Error types for the verification engine.
//!
//! The primary error type is `EngineError`, which represents run-level errors
//! that prevent a verification from being executed. Per-file errors (an
//! unreadable file, a malformed reference row) are folded into records or
//! surfaced as warnings, not as EngineError.

use std::fmt::{Display, self};
use std::path::PathBuf;
use std::io;
use std::error::Error;

/// Errors that can occur at the run level (preventing execution or recovery).
///
/// These errors are typically non-recoverable and should stop the run.
/// Read failures during hashing are recorded in the run's
/// ReconciliationRecord entries instead, so one bad file never hides
/// evidence about the others.
#[derive(Debug)]
pub enum EngineError {
    /// Root directory does not exist
    RootNotFound { path: PathBuf },

    /// Root directory is not accessible (permissions)
    RootAccessDenied { path: PathBuf, source: io::Error },

    /// Failed to read a file during hashing
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to enumerate a directory
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// No manifest or validation log was found under the root.
    /// Fatal: there is nothing to reconcile against.
    NoReferenceFound { root: PathBuf },

    /// The reference file was found but could not be read
    ReferenceUnreadable { path: PathBuf, source: io::Error },

    /// The reference file parsed to zero usable entries
    ReferenceEmpty { path: PathBuf },

    /// Failed to write the report
    ReportWriteFailed { path: PathBuf, source: io::Error },

    /// A path is invalid for the requested operation
    InvalidPath { path: PathBuf, reason: String },

    /// Catch-all for unexpected errors
    Unknown { message: String },
}

impl Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "Root directory not found: {}", path.display())
            }
            Self::RootAccessDenied { path, .. } => {
                write!(f, "Root directory access denied: {}", path.display())
            }
            Self::ReadError { path, source } => {
                write!(f, "Failed to read file: {} ({})", path.display(), source)
            }
            Self::EnumerationFailed { path, .. } => {
                write!(f, "Failed to enumerate directory: {}", path.display())
            }
            Self::NoReferenceFound { root } => {
                write!(
                    f,
                    "No manifest or validation log found under: {}",
                    root.display()
                )
            }
            Self::ReferenceUnreadable { path, .. } => {
                write!(f, "Failed to read reference file: {}", path.display())
            }
            Self::ReferenceEmpty { path } => {
                write!(
                    f,
                    "Reference file contains no usable entries: {}",
                    path.display()
                )
            }
            Self::ReportWriteFailed { path, .. } => {
                write!(f, "Failed to write report: {}", path.display())
            }
            Self::InvalidPath { path, reason } => {
                write!(f, "Invalid path: {} ({})", path.display(), reason)
            }
            Self::Unknown { message } => {
                write!(f, "Engine error: {}", message)
            }
        }
    }
}

impl Error for EngineError {}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::RootAccessDenied { source, .. }
            | Self::ReadError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::ReferenceUnreadable { source, .. }
            | Self::ReportWriteFailed { source, .. } => {
                source.raw_os_error().map(|e| e as u32)
            }
            _ => None,
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Unknown {
            message: err.to_string(),
        }
    }
}
