//! Digest computation.
//!
//! This module provides:
//! - Multiple digest algorithms (MD5, SHA-256, BLAKE3)
//! - Streaming file-level digest computation (binary mode, no transcoding)
//! - A bounded retry wrapper for reads from flaky storage
//!
//! The algorithm is a configuration parameter; the reconciliation engine
//! only ever sees hex strings.

use crate::error::EngineError;
use crate::walk;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// MD5 (legacy, but the format most ingest manifests record)
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl DigestAlgorithm {
    /// Parse algorithm from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "sha256" => Some(Self::Sha256),
            "blake3" => Some(Self::Blake3),
            _ => None,
        }
    }
}

/// Trait for incremental digest computation
trait DigestHasher {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the lowercase hex digest
    fn finalize(self: Box<Self>) -> String;
}

struct Md5Hasher {
    context: md5::Context,
}

impl DigestHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> String {
        format!("{:x}", self.context.compute())
    }
}

struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl DigestHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> String {
        use sha2::Digest;
        format!("{:x}", self.hasher.finalize())
    }
}

struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl DigestHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

fn create_hasher(algorithm: DigestAlgorithm) -> Box<dyn DigestHasher> {
    match algorithm {
        DigestAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
        DigestAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        DigestAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
    }
}

/// Compute the digest of a file's bytes, returning lowercase hex.
///
/// The file is opened in binary mode and streamed through the hasher in
/// 64 KB chunks, so large preservation masters never need to fit in
/// memory. Paths over the long-path threshold are opened with the
/// extended-length prefix applied.
pub fn compute_file_digest(
    path: &Path,
    algorithm: DigestAlgorithm,
) -> Result<String, EngineError> {
    let mut file = File::open(walk::io_path(path)).map_err(|e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = create_hasher(algorithm);
    let mut buffer = [0u8; 65536];

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) => {
                return Err(EngineError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }

    Ok(hasher.finalize())
}

/// Compute a file digest with a bounded retry policy.
///
/// `retries` extra attempts are made after the first failure, sleeping
/// `retry_delay` between attempts. Preservation trees frequently live on
/// network shares where a transient failure should not condemn the file.
pub fn compute_file_digest_with_retry(
    path: &Path,
    algorithm: DigestAlgorithm,
    retries: u32,
    retry_delay: Duration,
) -> Result<String, EngineError> {
    let mut attempt = 0;
    loop {
        match compute_file_digest(path, algorithm) {
            Ok(hex) => return Ok(hex),
            Err(e) if attempt < retries => {
                log::warn!(
                    "read failed for {} (attempt {}): {}",
                    path.display(),
                    attempt + 1,
                    e
                );
                attempt += 1;
                std::thread::sleep(retry_delay);
            }
            Err(e) => return Err(e),
        }
    }
}
