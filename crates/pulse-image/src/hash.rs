//! SHA-256 content verification.
//!
//! Blobs in an OCI layout are named by their digest; every blob is checked
//! against that name before it is trusted.

use std::path::Path;

use pulse_common::constants;
use pulse_common::error::{PulseError, Result};
use sha2::{Digest, Sha256};

const SHA256_PREFIX: &str = "sha256:";

/// Returns the hex part of a `sha256:<hex>` digest.
///
/// # Errors
///
/// Returns [`PulseError::InvalidImage`] for other algorithms or malformed hex.
pub fn digest_hex(digest: &str) -> Result<&str> {
    let hex = digest
        .strip_prefix(SHA256_PREFIX)
        .ok_or_else(|| PulseError::InvalidImage {
            message: format!("unsupported digest algorithm: {digest}"),
        })?;
    if hex.len() != constants::SHA256_HEX_LENGTH || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PulseError::InvalidImage {
            message: format!("malformed digest: {digest}"),
        });
    }
    Ok(hex)
}

/// Computes the lowercase hex SHA-256 of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<String> {
    tracing::debug!(path = %path.display(), "computing SHA-256 hash");
    let mut file = std::fs::File::open(path).map_err(|e| PulseError::io(path, e))?;
    let mut hasher = Sha256::new();
    let _ = std::io::copy(&mut file, &mut hasher).map_err(|e| PulseError::io(path, e))?;
    Ok(hex_string(&hasher.finalize()))
}

/// Validates that a file matches the expected hex SHA-256.
///
/// # Errors
///
/// Returns [`PulseError::HashMismatch`] if the hashes do not match.
pub fn validate_hash(path: &Path, expected: &str) -> Result<()> {
    let actual = hash_file(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(PulseError::HashMismatch {
            resource: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn hashes_file_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blob");
        std::fs::write(&path, b"hello").expect("write");
        assert_eq!(hash_file(&path).expect("hash"), HELLO_SHA);
        validate_hash(&path, HELLO_SHA).expect("valid");
    }

    #[test]
    fn mismatch_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blob");
        std::fs::write(&path, b"tampered").expect("write");
        let err = validate_hash(&path, HELLO_SHA).expect_err("mismatch");
        assert!(matches!(err, PulseError::HashMismatch { .. }));
    }

    #[test]
    fn digest_hex_rejects_other_algorithms_and_bad_hex() {
        assert_eq!(digest_hex(&format!("sha256:{HELLO_SHA}")).expect("ok"), HELLO_SHA);
        assert!(digest_hex(&format!("sha512:{HELLO_SHA}")).is_err());
        assert!(digest_hex("sha256:abc").is_err());
        assert!(digest_hex("sha256:../../../../etc/passwd/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").is_err());
    }
}
