//! Checksum functionality for asset fixities.
//!
//! This module provides:
//! - The fixity algorithms an OPEX package may declare (MD5, SHA-256, SHA-512)
//! - Streaming file checksum computation, one read pass for any number of algorithms

use crate::error::{read_error, EngineError};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Supported fixity algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    /// MD5 (legacy, accepted by OPEX ingest)
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// SHA-512 (cryptographic, 512-bit)
    Sha512,
}

impl fmt::Display for ChecksumAlgorithm {
    /// Formats the algorithm with its OPEX fixity type name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha256 => write!(f, "SHA-256"),
            Self::Sha512 => write!(f, "SHA-512"),
        }
    }
}

impl ChecksumAlgorithm {
    /// Parse an algorithm name, ignoring case and dashes ("sha256", "SHA-256").
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "").as_str() {
            "md5" => Some(Self::Md5),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// A digest tagged with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Lower-case hex digest
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Incremental hasher for one algorithm.
pub trait ChecksumHasher {
    fn update(&mut self, data: &[u8]);

    fn finalize(self: Box<Self>) -> ChecksumValue;
}

/// MD5 hasher (backed by md5 crate)
struct Md5Hasher {
    context: md5::Context,
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.context.compute();
        ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", digest))
    }
}

/// SHA-256 hasher (backed by sha2 crate)
struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        use sha2::Digest;
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", digest))
    }
}

/// SHA-512 hasher (backed by sha2 crate)
struct Sha512Hasher {
    hasher: sha2::Sha512,
}

impl ChecksumHasher for Sha512Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        use sha2::Digest;
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha512, format!("{:x}", digest))
    }
}

/// Boxed hasher for `algorithm`.
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        ChecksumAlgorithm::Sha512 => Box::new(Sha512Hasher {
            hasher: sha2::Sha512::default(),
        }),
    }
}

/// Compute several checksums for a file while reading it once.
///
/// Values are returned in the order of `algorithms`.
pub fn compute_file_checksums(
    path: &Path,
    algorithms: &[ChecksumAlgorithm],
) -> Result<Vec<ChecksumValue>, EngineError> {
    let mut file = File::open(path).map_err(read_error(path))?;
    let mut hashers: Vec<Box<dyn ChecksumHasher>> =
        algorithms.iter().map(|a| create_hasher(*a)).collect();

    let mut buffer = [0u8; 65536]; // 64 KB buffer
    loop {
        let n = file.read(&mut buffer).map_err(read_error(path))?;
        if n == 0 {
            break;
        }
        for hasher in hashers.iter_mut() {
            hasher.update(&buffer[..n]);
        }
    }

    Ok(hashers.into_iter().map(|h| h.finalize()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_algorithm_display_uses_opex_names() {
        assert_eq!(ChecksumAlgorithm::Md5.to_string(), "MD5");
        assert_eq!(ChecksumAlgorithm::Sha256.to_string(), "SHA-256");
        assert_eq!(ChecksumAlgorithm::Sha512.to_string(), "SHA-512");
    }

    #[test]
    fn test_algorithm_from_name() {
        assert_eq!(ChecksumAlgorithm::from_name("md5"), Some(ChecksumAlgorithm::Md5));
        assert_eq!(ChecksumAlgorithm::from_name("SHA-256"), Some(ChecksumAlgorithm::Sha256));
        assert_eq!(ChecksumAlgorithm::from_name("sha512"), Some(ChecksumAlgorithm::Sha512));
        assert_eq!(ChecksumAlgorithm::from_name("blake3"), None);
    }

    #[test]
    fn test_md5_hasher() {
        let mut hasher = create_hasher(ChecksumAlgorithm::Md5);
        hasher.update(b"hello");
        let checksum = hasher.finalize();
        assert_eq!(checksum.algorithm(), ChecksumAlgorithm::Md5);
        assert_eq!(checksum.hex(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_sha256_hasher() {
        let mut hasher = create_hasher(ChecksumAlgorithm::Sha256);
        hasher.update(b"hello");
        let checksum = hasher.finalize();
        assert_eq!(
            checksum.hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_file_checksums_single_pass() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("hello.txt");
        let mut file = File::create(&path).expect("Failed to create file");
        file.write_all(b"hello").expect("Failed to write file");
        drop(file);

        let values = compute_file_checksums(
            &path,
            &[ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Md5],
        )
        .expect("Checksums should compute");

        assert_eq!(values.len(), 2);
        assert_eq!(values[0].algorithm(), ChecksumAlgorithm::Sha256);
        assert_eq!(values[1].hex(), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(values[0].to_string(), format!("SHA-256:{}", values[0].hex()));
    }

    #[test]
    fn test_checksum_of_missing_file_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = compute_file_checksums(&temp_dir.path().join("nope"), &[ChecksumAlgorithm::Sha256]);
        assert!(matches!(result, Err(EngineError::ReadError { .. })));
    }
}
