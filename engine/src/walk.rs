//! Directory walker.
//!
//! This module provides:
//! - Recursive enumeration of regular files in a stable, sorted order
//! - The declarative exclusion-pattern check for bookkeeping files
//! - Long-path handling at the I/O boundary

use std::fs;
use std::path::{Path, PathBuf};
use crate::error::EngineError;

/// Bookkeeping files the walker skips by default, matched case-insensitively
/// as substrings of the file name. These are the manifests, prior logs and
/// preservation documentation commonly found alongside collection content.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "data-accessioner",
    "dataaccessioner",
    "manifest.txt",
    "media-inventory",
    "normalized-filenames",
    "post-migration",
    "preservation.txt",
    "preservation-log",
    "preservation_log",
    "preservationlog",
    "validation_log",
];

/// Paths longer than this get the Windows extended-length prefix before I/O.
const LONG_PATH_THRESHOLD: usize = 250;

/// Returns true if a file name matches any exclusion pattern.
pub fn is_excluded(file_name: &str, patterns: &[String]) -> bool {
    let name = file_name.to_lowercase();
    patterns.iter().any(|p| name.contains(&p.to_lowercase()))
}

/// Adjust a path for I/O, applying the `\\?\` extended-length prefix on
/// Windows when the path would otherwise exceed the addressable limit.
/// The prefix never appears in reports; normalization strips it again.
#[cfg(windows)]
pub fn io_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw.len() > LONG_PATH_THRESHOLD && !raw.starts_with(r"\\?\") {
        PathBuf::from(format!(r"\\?\{}", raw))
    } else {
        path.to_path_buf()
    }
}

/// Adjust a path for I/O. No-op outside Windows; the threshold constant
/// only matters where the Win32 path limit applies.
#[cfg(not(windows))]
pub fn io_path(path: &Path) -> PathBuf {
    let _ = LONG_PATH_THRESHOLD;
    path.to_path_buf()
}

/// Enumerate every regular file under the root, recursively.
///
/// Entries are visited in sorted name order so repeated runs walk the
/// tree identically. Files matching an exclusion pattern are skipped.
/// Directories are never returned; only files carry fixity evidence.
///
/// # Errors
/// Returns EngineError if enumeration fails at the root level.
/// Unreadable subdirectories are logged and skipped so one bad branch
/// does not abort the walk.
pub fn enumerate_files(
    root: &Path,
    exclude_patterns: &[String],
) -> Result<Vec<PathBuf>, EngineError> {
    let mut files = Vec::new();
    recurse(root, exclude_patterns, &mut files, true)?;
    Ok(files)
}

fn recurse(
    dir: &Path,
    exclude_patterns: &[String],
    files: &mut Vec<PathBuf>,
    is_root: bool,
) -> Result<(), EngineError> {
    let entries = match fs::read_dir(io_path(dir)) {
        Ok(entries) => entries,
        Err(e) if is_root => {
            return Err(EngineError::EnumerationFailed {
                path: dir.to_path_buf(),
                source: e,
            })
        }
        Err(e) => {
            log::warn!("skipping unreadable directory {}: {}", dir.display(), e);
            return Ok(());
        }
    };

    let mut children: Vec<(std::ffi::OsString, PathBuf, bool)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::EnumerationFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let metadata = entry.metadata().map_err(|e| EngineError::EnumerationFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        // Build the child path from the logical dir, not the prefixed one
        let child = dir.join(entry.file_name());
        children.push((entry.file_name(), child, metadata.is_dir()));
    }
    children.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, path, is_dir) in children {
        if is_dir {
            recurse(&path, exclude_patterns, files, false)?;
        } else {
            let name = name.to_string_lossy();
            if is_excluded(&name, exclude_patterns) {
                continue;
            }
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn patterns() -> Vec<String> {
        DEFAULT_EXCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect()
    }

    fn touch(path: &Path, content: &[u8]) {
        let mut file = fs::File::create(path).expect("Failed to create file");
        file.write_all(content).expect("Failed to write file");
    }

    #[test]
    fn test_is_excluded_case_insensitive() {
        let patterns = patterns();
        assert!(is_excluded("Manifest.TXT", &patterns));
        assert!(is_excluded("validation_log_20260824.csv", &patterns));
        assert!(is_excluded("post-migration_validation_log_20260824.csv", &patterns));
        assert!(is_excluded("PreservationLog.xlsx", &patterns));
        assert!(!is_excluded("photo_001.tif", &patterns));
    }

    #[test]
    fn test_enumerate_sorted_and_recursive() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        fs::create_dir(root.join("sub")).expect("Failed to create subdir");
        touch(&root.join("b.txt"), b"b");
        touch(&root.join("a.txt"), b"a");
        touch(&root.join("sub").join("c.txt"), b"c");

        let files = enumerate_files(root, &patterns()).expect("Failed to enumerate");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub/c.txt"]);
    }

    #[test]
    fn test_enumerate_skips_bookkeeping_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        touch(&root.join("photo.tif"), b"pixels");
        touch(&root.join("manifest.txt"), b"rows");
        touch(&root.join("validation_log_20260101.csv"), b"rows");

        let files = enumerate_files(root, &patterns()).expect("Failed to enumerate");
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("photo.tif"));
    }

    #[test]
    fn test_enumerate_nonexistent_root() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("nope");

        let result = enumerate_files(&missing, &patterns());
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_pattern_extends_defaults() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        touch(&root.join("thumbs.db"), b"junk");
        touch(&root.join("keep.txt"), b"data");

        let mut patterns = patterns();
        patterns.push("thumbs.db".to_string());

        let files = enumerate_files(root, &patterns).expect("Failed to enumerate");
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.txt"));
    }
}
