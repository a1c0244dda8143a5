//! Checksum utilities for raw file verification
//!
//! Every raw artifact entering the platform is content-addressed by its
//! SHA-256 digest. The digest is recorded on the ingestion record and stamped
//! onto every curated row as `_source_sha256`.

use crate::error::{Result, TdpError};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the SHA-256 digest of a file, hex-encoded.
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    sha256_reader(&mut file)
}

/// Compute the SHA-256 digest of any readable source, hex-encoded.
pub fn sha256_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA-256 digest of an in-memory byte slice, hex-encoded.
pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Verify a file against an expected SHA-256 digest.
///
/// Returns `Ok(())` when the digests match and a `ChecksumMismatch` error
/// otherwise, so corruption surfaces as a retryable processing failure rather
/// than bad data in a curated table.
pub fn verify_sha256(path: impl AsRef<Path>, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if actual == expected {
        Ok(())
    } else {
        Err(TdpError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_sha256_reader() {
        let data = b"hello world";
        let mut cursor = Cursor::new(data);
        let digest = sha256_reader(&mut cursor).unwrap();
        assert_eq!(digest, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_sha256_bytes_matches_reader() {
        let data = b"hello world";
        let mut cursor = Cursor::new(data);
        assert_eq!(sha256_bytes(data), sha256_reader(&mut cursor).unwrap());
    }

    #[test]
    fn test_verify_sha256_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();

        let err = verify_sha256(&path, "deadbeef").unwrap_err();
        assert!(matches!(err, TdpError::ChecksumMismatch { .. }));
    }
}
