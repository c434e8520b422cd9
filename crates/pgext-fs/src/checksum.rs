//! SHA-256 checksum utilities
//!
//! A single canonical checksum format (`sha256:<hex>`) is used for the
//! artifact digests recorded in the build manifest.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Compute the SHA-256 checksum of in-memory bytes.
pub fn compute_bytes_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Compute the SHA-256 checksum of a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn compute_file_checksum(path: &Path) -> crate::Result<String> {
    let content = std::fs::read(path).map_err(|e| crate::Error::io(path, e))?;
    Ok(compute_bytes_checksum(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_known_value() {
        assert_eq!(
            compute_bytes_checksum(b"hello world"),
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn file_checksum_matches_bytes_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector.so");
        std::fs::write(&path, b"\x7fELF").unwrap();

        assert_eq!(
            compute_file_checksum(&path).unwrap(),
            compute_bytes_checksum(b"\x7fELF")
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = compute_file_checksum(Path::new("/nonexistent/lib.so")).unwrap_err();
        assert!(matches!(err, crate::Error::Io { .. }));
    }
}
