//! fixity - Command-line interface for the verification engine.
//!
//! Reconciles a directory tree against its manifest or a prior validation
//! log, prints findings to stderr and writes a dated validation log that
//! the next run can use as its reference.

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use engine::{
    create_run, plan_run, run_verification,
    model::{ReconciliationRecord, RunConfig, RunSummary, VerificationRun},
    progress::ProgressCallback,
    report::CsvReport,
    DigestAlgorithm,
};

/// fixity - Verify collection files against a recorded reference
#[derive(Parser, Debug)]
#[command(name = "fixity")]
#[command(version = "0.1.0")]
#[command(about = "Recompute file digests and reconcile them against a manifest or prior validation log")]
struct Args {
    /// Root directory of the collection to verify
    #[arg(value_name = "ROOT")]
    root: PathBuf,

    /// Digest algorithm: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "md5")]
    hash: String,

    /// Reference file to reconcile against, overriding auto-discovery.
    /// Format is inferred from the extension (.txt manifest, .csv log)
    #[arg(long, value_name = "PATH")]
    reference: Option<PathBuf>,

    /// Fold path case before matching (for trees moved across filesystems)
    #[arg(long)]
    ignore_path_case: bool,

    /// Additional file-name substring to exclude (repeatable)
    #[arg(long, value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Where to write the validation log (default: ROOT/validation_log_{date}.csv)
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Number of hashing workers
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Extra read attempts per file before recording it unreadable
    #[arg(long, value_name = "N", default_value_t = 2)]
    retries: u32,

    /// Delay between read retries, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 250)]
    retry_delay_ms: u64,

    /// Print every record, not only findings
    #[arg(long)]
    verbose: bool,
}

/// CLI implementation of ProgressCallback: numbered findings to stderr
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    findings: AtomicUsize,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            findings: AtomicUsize::new(0),
        }
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_run_started(&self, run: &VerificationRun) {
        eprintln!("Verifying: {}", run.root.display());
        if let Some(reference) = &run.reference {
            eprintln!(
                "  Reference: {} ({}, {} entries)",
                reference.source().display(),
                reference.form(),
                reference.len()
            );
        }
        eprintln!("  Algorithm: {}", run.config.algorithm);
        eprintln!("  Files to hash: {}", run.planned_files.len());
        eprintln!();
    }

    fn on_record(&self, index: usize, record: &ReconciliationRecord) {
        if record.status.is_validated() {
            if self.verbose {
                eprintln!("[{:5}] OK: {}", index, record.path);
            }
            return;
        }

        let n = self.findings.fetch_add(1, Ordering::Relaxed) + 1;
        match record.note.as_deref() {
            Some(note) => eprintln!("{}. {} [{}] {}", n, record.path, record.status, note),
            None => eprintln!("{}. {} [{}]", n, record.path, record.status),
        }
    }

    fn on_run_completed(&self, summary: &RunSummary) {
        eprintln!();
        eprintln!(
            "Summary: {} validated, {} mismatched, {} missing from reference, {} missing from directory",
            summary.validated,
            summary.mismatched,
            summary.missing_from_reference,
            summary.missing_from_directory
        );
        if summary.is_clean() {
            eprintln!("All files validated, no errors");
        } else {
            eprintln!("{} errors, see report", summary.invalid());
        }
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let exit_code = match run_cli(&args) {
        Ok(summary) if summary.is_clean() => 0,
        Ok(_) => 1,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<RunSummary, String> {
    let algorithm = DigestAlgorithm::from_str(&args.hash).ok_or_else(|| {
        format!(
            "Invalid hash algorithm '{}'. Must be 'md5', 'sha256', or 'blake3'",
            args.hash
        )
    })?;

    let mut config = RunConfig {
        algorithm,
        ignore_path_case: args.ignore_path_case,
        reference_path: args.reference.clone(),
        read_retries: args.retries,
        retry_delay: Duration::from_millis(args.retry_delay_ms),
        ..RunConfig::default()
    };
    config.exclude_patterns.extend(args.exclude.iter().cloned());
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err("Worker count must be at least 1".to_string());
        }
        config.workers = workers;
    }

    let mut run =
        create_run(&args.root, config).map_err(|e| format!("Run creation failed: {}", e))?;

    plan_run(&mut run).map_err(|e| format!("Run planning failed: {}", e))?;

    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| CsvReport::default_path(&run.root));
    let mut report =
        CsvReport::create(&report_path).map_err(|e| format!("Report creation failed: {}", e))?;

    let progress = CliProgress::new(args.verbose);

    let summary = run_verification(&mut run, Some(&progress), &mut report)
        .map_err(|e| format!("Verification failed: {}", e))?;

    eprintln!("Report written to: {}", report_path.display());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base_args(root: PathBuf) -> Args {
        Args {
            root,
            hash: "md5".to_string(),
            reference: None,
            ignore_path_case: false,
            exclude: Vec::new(),
            report: None,
            workers: None,
            retries: 0,
            retry_delay_ms: 1,
            verbose: false,
        }
    }

    fn write_manifest_for(root: &std::path::Path, file: &std::path::Path, digest: &str) {
        let line = format!(
            "{}\t0\tcreated\tmodified\taccessed\ttype\towner\t{}\n",
            file.display(),
            digest
        );
        std::fs::write(root.join("manifest.txt"), line).expect("Failed to write manifest");
    }

    #[test]
    fn test_cli_clean_run() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello").expect("Failed to write file");
        // MD5 of "hello"
        write_manifest_for(dir.path(), &file, "5D41402ABC4B2A76B9719D911017C592");

        let args = base_args(dir.path().to_path_buf());
        let summary = run_cli(&args).expect("CLI should succeed with a valid manifest");
        assert!(summary.is_clean());
        assert_eq!(summary.validated, 1);

        // The dated report must exist under the root
        let report = CsvReport::default_path(dir.path());
        assert!(report.exists(), "CLI should write the validation log");
    }

    #[test]
    fn test_cli_findings_are_reported_not_fatal() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello").expect("Failed to write file");
        write_manifest_for(dir.path(), &file, "00000000000000000000000000000000");

        let args = base_args(dir.path().to_path_buf());
        let summary = run_cli(&args).expect("Findings must not be a CLI error");
        assert!(!summary.is_clean());
        assert_eq!(summary.mismatched, 1);
    }

    #[test]
    fn test_cli_rejects_missing_root() {
        let args = base_args(PathBuf::from("/nonexistent/path"));
        let result = run_cli(&args);
        assert!(result.is_err(), "CLI should reject missing root");
    }

    #[test]
    fn test_cli_rejects_invalid_hash_algorithm() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut args = base_args(dir.path().to_path_buf());
        args.hash = "crc32".to_string();

        let result = run_cli(&args);
        assert!(result.is_err(), "CLI should reject invalid hash algorithm");
    }

    #[test]
    fn test_cli_rejects_zero_workers() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut args = base_args(dir.path().to_path_buf());
        args.workers = Some(0);

        let result = run_cli(&args);
        assert!(result.is_err(), "CLI should reject zero workers");
    }

    #[test]
    fn test_cli_fails_without_reference() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("a.txt"), "hello").expect("Failed to write file");

        let args = base_args(dir.path().to_path_buf());
        let result = run_cli(&args);
        assert!(result.is_err(), "CLI should fail when no reference exists");
    }

    #[test]
    fn test_cli_custom_report_location() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let out = TempDir::new().expect("Failed to create temp dir");
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello").expect("Failed to write file");
        write_manifest_for(dir.path(), &file, "5D41402ABC4B2A76B9719D911017C592");

        let report = out.path().join("run.csv");
        let mut args = base_args(dir.path().to_path_buf());
        args.report = Some(report.clone());

        run_cli(&args).expect("CLI should succeed");
        assert!(report.exists());
    }
}
