//! Reference index loader.
//!
//! Builds the normalized `path -> expected digest` index the engine
//! reconciles against, from one of two reference formats:
//!
//! - **Manifest form**: tab-delimited rows produced at ingest time.
//!   Column 0 is the full path, column 7 the expected digest. The fixed
//!   column layout is an external contract with the producing system;
//!   it is validated here (a digest-shaped column 7) rather than re-derived.
//! - **Validation-log form**: comma-delimited rows with a header, as
//!   written by this tool's own report sink. Column 1 is the path,
//!   column 4 the digest observed in that prior run, consumed as the
//!   new baseline for a second-generation check.
//!
//! Malformed rows are skipped with a warning; only a reference that
//! yields zero usable entries is fatal.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use crate::error::EngineError;
use crate::walk;

/// Column-0 value of the manifest's schema-documentation row. Excluded
/// from the index rather than reconciled as a path with no match.
const MANIFEST_SENTINEL: &str = "Full Name (Path+File)";

/// Manifest rows must carry at least this many tab-separated columns.
const MANIFEST_MIN_COLUMNS: usize = 8;
const MANIFEST_DIGEST_COLUMN: usize = 7;

/// Validation-log rows: path in column 1, digest in column 4.
const LOG_MIN_COLUMNS: usize = 5;
const LOG_PATH_COLUMN: usize = 1;
const LOG_DIGEST_COLUMN: usize = 4;

/// The two supported reference formats, selected by filename pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceForm {
    /// Tab-delimited ingest manifest (`*manifest*.txt`)
    Manifest,
    /// Prior validation log (`validation_log*.csv`)
    ValidationLog,
}

impl fmt::Display for ReferenceForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => write!(f, "manifest"),
            Self::ValidationLog => write!(f, "validation log"),
        }
    }
}

impl ReferenceForm {
    /// Detect the form from a file name, by the patterns the discovery
    /// scan recognizes.
    pub fn for_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("manifest") && lower.ends_with(".txt") {
            Some(Self::Manifest)
        } else if lower.starts_with("validation_log") && lower.ends_with(".csv") {
            Some(Self::ValidationLog)
        } else {
            None
        }
    }

    /// Detect the form for an explicitly supplied reference file.
    /// Falls back on extension alone, so a renamed or second-generation
    /// log (e.g. `post-migration_...csv`) can still be consumed.
    pub fn for_explicit(name: &str) -> Option<Self> {
        Self::for_name(name).or_else(|| {
            let lower = name.to_lowercase();
            if lower.ends_with(".txt") {
                Some(Self::Manifest)
            } else if lower.ends_with(".csv") {
                Some(Self::ValidationLog)
            } else {
                None
            }
        })
    }
}

/// The expected-digest index for one run. Built once at load, read-only
/// afterwards, so hashing workers can share it without locking.
#[derive(Debug)]
pub struct ReferenceIndex {
    source: PathBuf,
    form: ReferenceForm,
    /// Normalized path -> uppercase hex digest (None when the source row
    /// recorded no digest for the path). BTreeMap keeps the closing pass
    /// deterministic.
    entries: BTreeMap<String, Option<String>>,
}

impl ReferenceIndex {
    /// The reference file this index was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn form(&self) -> ReferenceForm {
        self.form
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the expected digest for a normalized path.
    ///
    /// `Some(None)` means the path is recorded but carries no digest;
    /// the engine must treat that as Mismatched, never Validated.
    pub fn expected(&self, normalized_path: &str) -> Option<&Option<String>> {
        self.entries.get(normalized_path)
    }

    /// Iterate entries in sorted path order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Option<String>> {
        self.entries.iter()
    }
}

/// Apply the uniform path normalization used for both reference paths
/// and observed paths, so lookups are exact string matches:
/// 1. trim surrounding whitespace
/// 2. strip the Windows extended-length prefix
/// 3. remove stray double-quote characters left by CSV round trips
/// 4. optionally fold to lowercase
pub fn normalize_path(raw: &str, ignore_case: bool) -> String {
    let trimmed = raw.trim();
    let stripped = if let Some(rest) = trimmed.strip_prefix(r"\\?\UNC\") {
        format!(r"\\{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix(r"\\?\") {
        rest.to_string()
    } else {
        trimmed.to_string()
    };
    let unquoted = stripped.replace('"', "");
    if ignore_case {
        unquoted.to_lowercase()
    } else {
        unquoted
    }
}

/// Digest strings compare in uppercase canonical form, since encoding
/// case varies by producer. Empty becomes None.
fn normalize_digest(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_uppercase())
    }
}

/// A plausibility check for the brittle fixed-column manifest contract:
/// column drift in the producing system should fail loudly here instead
/// of misclassifying every file as mismatched.
fn looks_like_digest(s: &str) -> bool {
    s.len() >= 8 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Why a reference row was rejected.
#[derive(Debug, PartialEq, Eq)]
enum RowError {
    TooFewColumns { found: usize, needed: usize },
    NotADigest(String),
    EmptyPath,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewColumns { found, needed } => {
                write!(f, "expected at least {} columns, found {}", needed, found)
            }
            Self::NotADigest(value) => {
                write!(f, "digest column does not look like a digest: {:?}", value)
            }
            Self::EmptyPath => write!(f, "empty path column"),
        }
    }
}

/// One parsed manifest row.
#[derive(Debug, PartialEq, Eq)]
struct ManifestRow {
    path: String,
    digest: String,
}

/// One parsed validation-log row. A blank digest column is preserved as
/// None so the path still participates in reconciliation.
#[derive(Debug, PartialEq, Eq)]
struct LogRow {
    path: String,
    digest: Option<String>,
}

/// Parse a manifest row. `Ok(None)` means the row intentionally carries
/// no entry (blank line or the schema sentinel).
fn parse_manifest_row(line: &str) -> Result<Option<ManifestRow>, RowError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() < MANIFEST_MIN_COLUMNS {
        return Err(RowError::TooFewColumns {
            found: columns.len(),
            needed: MANIFEST_MIN_COLUMNS,
        });
    }
    let path = columns[0].trim();
    if path == MANIFEST_SENTINEL {
        return Ok(None);
    }
    if path.is_empty() {
        return Err(RowError::EmptyPath);
    }
    let digest = columns[MANIFEST_DIGEST_COLUMN].trim();
    if !looks_like_digest(digest) {
        return Err(RowError::NotADigest(digest.to_string()));
    }
    Ok(Some(ManifestRow {
        path: path.to_string(),
        digest: digest.to_string(),
    }))
}

/// Parse a validation-log data row (header already skipped).
fn parse_log_row(line: &str) -> Result<Option<LogRow>, RowError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let columns = split_csv_row(line);
    if columns.len() < LOG_MIN_COLUMNS {
        return Err(RowError::TooFewColumns {
            found: columns.len(),
            needed: LOG_MIN_COLUMNS,
        });
    }
    let path = columns[LOG_PATH_COLUMN].trim();
    if path.is_empty() {
        return Err(RowError::EmptyPath);
    }
    let digest = columns[LOG_DIGEST_COLUMN].trim();
    // A recorded path with a garbled digest still names a file we must
    // account for; keep the path, drop the digest.
    let digest = if digest.is_empty() || !looks_like_digest(digest) {
        None
    } else {
        Some(digest.to_string())
    };
    Ok(Some(LogRow {
        path: path.to_string(),
        digest,
    }))
}

/// Split one CSV line into fields, honoring double-quoted fields (the
/// report's own timestamps contain commas) and doubled quotes within them.
fn split_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Locate the authoritative reference file under the root.
///
/// All candidates matching either filename pattern are collected and the
/// lexically first is chosen, so repeated runs pick the same file. The
/// selection is logged; when several candidates exist, that is reported
/// rather than silently resolved.
pub fn discover_reference(root: &Path) -> Result<(PathBuf, ReferenceForm), EngineError> {
    // An empty exclusion list: discovery must see the bookkeeping files
    // the content walk skips.
    let all_files = walk::enumerate_files(root, &[])?;
    let mut candidates: Vec<(PathBuf, ReferenceForm)> = all_files
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().to_string();
            ReferenceForm::for_name(&name).map(|form| (path, form))
        })
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    match candidates.len() {
        0 => Err(EngineError::NoReferenceFound {
            root: root.to_path_buf(),
        }),
        1 => {
            let (path, form) = candidates.remove(0);
            log::info!("using {} as reference: {}", form, path.display());
            Ok((path, form))
        }
        n => {
            let (path, form) = candidates.remove(0);
            log::warn!(
                "{} reference candidates found; using lexically first {}: {}",
                n,
                form,
                path.display()
            );
            Ok((path, form))
        }
    }
}

/// Load and normalize a reference file into an index.
///
/// Row-level failures are logged and skipped. Duplicate normalized paths
/// keep the last entry, with a warning. A reference yielding zero usable
/// entries is a fatal configuration error.
pub fn load_reference(
    path: &Path,
    form: ReferenceForm,
    ignore_path_case: bool,
) -> Result<ReferenceIndex, EngineError> {
    let bytes = fs::read(walk::io_path(path)).map_err(|e| EngineError::ReferenceUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    // Lossy decoding keeps a mis-encoded row local: its garbled digest
    // fails the shape check instead of aborting the whole load.
    let content = String::from_utf8_lossy(&bytes);

    let mut entries: BTreeMap<String, Option<String>> = BTreeMap::new();
    let mut insert = |raw_path: &str, digest: Option<String>, lineno: usize| {
        let normalized = normalize_path(raw_path, ignore_path_case);
        if normalized.is_empty() {
            log::warn!("{} line {}: path normalizes to empty, skipped", path.display(), lineno);
            return;
        }
        if entries.insert(normalized, digest).is_some() {
            log::warn!(
                "{} line {}: duplicate reference path {:?}, last entry wins",
                path.display(),
                lineno,
                raw_path
            );
        }
    };

    for (index, line) in content.lines().enumerate() {
        let lineno = index + 1;
        match form {
            ReferenceForm::Manifest => match parse_manifest_row(line) {
                Ok(Some(row)) => insert(&row.path, normalize_digest(&row.digest), lineno),
                Ok(None) => {}
                Err(e) => log::warn!("{} line {}: {}", path.display(), lineno, e),
            },
            ReferenceForm::ValidationLog => {
                if index == 0 {
                    continue; // header row
                }
                match parse_log_row(line) {
                    Ok(Some(row)) => {
                        let digest = row.digest.as_deref().and_then(normalize_digest);
                        insert(&row.path, digest, lineno);
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("{} line {}: {}", path.display(), lineno, e),
                }
            }
        }
    }

    if entries.is_empty() {
        return Err(EngineError::ReferenceEmpty {
            path: path.to_path_buf(),
        });
    }

    Ok(ReferenceIndex {
        source: path.to_path_buf(),
        form,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, content: &str) {
        let mut file = fs::File::create(path).expect("Failed to create file");
        file.write_all(content.as_bytes()).expect("Failed to write file");
    }

    fn manifest_line(path: &str, digest: &str) -> String {
        // Columns 1-6 carry producer metadata the loader ignores
        format!("{}\tsize\tcreated\tmodified\taccessed\ttype\towner\t{}", path, digest)
    }

    #[test]
    fn test_normalize_path_strips_prefix_and_quotes() {
        assert_eq!(
            normalize_path(r#""\\?\C:\collection\a.txt""#, false),
            r"C:\collection\a.txt"
        );
        assert_eq!(
            normalize_path(r"\\?\UNC\server\share\a.txt", false),
            r"\\server\share\a.txt"
        );
        assert_eq!(normalize_path("  plain.txt  ", false), "plain.txt");
    }

    #[test]
    fn test_normalize_path_case_folding() {
        assert_eq!(normalize_path("A.TXT", true), "a.txt");
        assert_eq!(normalize_path("A.TXT", false), "A.TXT");
    }

    #[test]
    fn test_split_csv_row_quoted_comma() {
        let fields = split_csv_row(r#""2026-08-24, 10:00:00",a.txt,TRUE,ABC,ABC"#);
        assert_eq!(fields[0], "2026-08-24, 10:00:00");
        assert_eq!(fields[1], "a.txt");
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn test_split_csv_row_doubled_quote() {
        let fields = split_csv_row(r#"a,"say ""hi""",c"#);
        assert_eq!(fields[1], r#"say "hi""#);
    }

    #[test]
    fn test_parse_manifest_row_valid() {
        let row = parse_manifest_row(&manifest_line("/tree/a.txt", "abc12345"))
            .expect("Row should parse")
            .expect("Row should yield an entry");
        assert_eq!(row.path, "/tree/a.txt");
        assert_eq!(row.digest, "abc12345");
    }

    #[test]
    fn test_parse_manifest_row_too_few_columns() {
        let result = parse_manifest_row("a\tb\tc\td\te");
        assert_eq!(
            result,
            Err(RowError::TooFewColumns { found: 5, needed: 8 })
        );
    }

    #[test]
    fn test_parse_manifest_row_sentinel_excluded() {
        let line = manifest_line(MANIFEST_SENTINEL, "Checksum");
        assert_eq!(parse_manifest_row(&line), Ok(None));
    }

    #[test]
    fn test_parse_manifest_row_rejects_non_digest() {
        let result = parse_manifest_row(&manifest_line("/tree/a.txt", "not hex!"));
        assert!(matches!(result, Err(RowError::NotADigest(_))));
    }

    #[test]
    fn test_parse_log_row_blank_digest_keeps_path() {
        let row = parse_log_row("2026-08-24,/tree/a.txt,FALSE,,")
            .expect("Row should parse")
            .expect("Row should yield an entry");
        assert_eq!(row.path, "/tree/a.txt");
        assert_eq!(row.digest, None);
    }

    #[test]
    fn test_form_for_name() {
        assert_eq!(ReferenceForm::for_name("DPX_manifest.txt"), Some(ReferenceForm::Manifest));
        assert_eq!(
            ReferenceForm::for_name("validation_log_20260824.csv"),
            Some(ReferenceForm::ValidationLog)
        );
        // Second-generation logs are not auto-discovered
        assert_eq!(ReferenceForm::for_name("post-migration_validation_log_20260824.csv"), None);
        assert_eq!(ReferenceForm::for_name("notes.md"), None);
    }

    #[test]
    fn test_form_for_explicit_falls_back_on_extension() {
        assert_eq!(
            ReferenceForm::for_explicit("post-migration_validation_log_20260824.csv"),
            Some(ReferenceForm::ValidationLog)
        );
        assert_eq!(ReferenceForm::for_explicit("checksums.txt"), Some(ReferenceForm::Manifest));
        assert_eq!(ReferenceForm::for_explicit("notes.md"), None);
    }

    #[test]
    fn test_load_manifest_skips_malformed_rows() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let manifest = temp_dir.path().join("manifest.txt");
        let content = format!(
            "{}\n{}\nshort\trow\n{}\n",
            manifest_line(MANIFEST_SENTINEL, "Checksum"),
            manifest_line("/tree/a.txt", "ABC12345"),
            manifest_line("/tree/b.txt", "def45678"),
        );
        write_file(&manifest, &content);

        let index = load_reference(&manifest, ReferenceForm::Manifest, false)
            .expect("Load should succeed");
        assert_eq!(index.len(), 2);
        assert_eq!(index.expected("/tree/a.txt"), Some(&Some("ABC12345".to_string())));
        // Digests are canonicalized to uppercase
        assert_eq!(index.expected("/tree/b.txt"), Some(&Some("DEF45678".to_string())));
        assert_eq!(index.expected(MANIFEST_SENTINEL), None);
    }

    #[test]
    fn test_load_manifest_duplicate_last_wins() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let manifest = temp_dir.path().join("manifest.txt");
        let content = format!(
            "{}\n{}\n",
            manifest_line("/tree/a.txt", "11111111"),
            manifest_line("/tree/a.txt", "22222222"),
        );
        write_file(&manifest, &content);

        let index = load_reference(&manifest, ReferenceForm::Manifest, false)
            .expect("Load should succeed");
        assert_eq!(index.len(), 1);
        assert_eq!(index.expected("/tree/a.txt"), Some(&Some("22222222".to_string())));
    }

    #[test]
    fn test_load_log_skips_header_and_normalizes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let log = temp_dir.path().join("validation_log_20260801.csv");
        let content = concat!(
            "Timestamp,File,Checksum_Validated,Expected_Digest,Current_Digest,Note\n",
            "\"2026-08-01, 10:00:00\",\"/tree/a.txt\",TRUE,abc12345,abc12345,\n",
            "\"2026-08-01, 10:00:01\",/tree/b.txt,FALSE,,deadbeef,absent from record\n",
        );
        write_file(&log, content);

        let index = load_reference(&log, ReferenceForm::ValidationLog, false)
            .expect("Load should succeed");
        assert_eq!(index.len(), 2);
        assert_eq!(index.expected("/tree/a.txt"), Some(&Some("ABC12345".to_string())));
        assert_eq!(index.expected("/tree/b.txt"), Some(&Some("DEADBEEF".to_string())));
    }

    #[test]
    fn test_load_empty_reference_is_fatal() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let manifest = temp_dir.path().join("manifest.txt");
        write_file(&manifest, &format!("{}\n", manifest_line(MANIFEST_SENTINEL, "Checksum")));

        let result = load_reference(&manifest, ReferenceForm::Manifest, false);
        assert!(matches!(result, Err(EngineError::ReferenceEmpty { .. })));
    }

    #[test]
    fn test_discover_picks_lexically_first_and_reports() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        write_file(&root.join("b_manifest.txt"), "x");
        write_file(&root.join("a_manifest.txt"), "x");

        let (path, form) = discover_reference(root).expect("Discovery should succeed");
        assert!(path.ends_with("a_manifest.txt"));
        assert_eq!(form, ReferenceForm::Manifest);
    }

    #[test]
    fn test_discover_none_found() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        write_file(&temp_dir.path().join("photo.tif"), "pixels");

        let result = discover_reference(temp_dir.path());
        assert!(matches!(result, Err(EngineError::NoReferenceFound { .. })));
    }
}
