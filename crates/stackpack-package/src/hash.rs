//! SHA-256 content hashing and verification.

use sha2::{Digest, Sha256};
use stackpack_common::error::{Result, StackpackError};
use stackpack_common::types::Sha256Hash;

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Checks `data` against an expected checksum.
///
/// The expected value may carry a `sha256:` prefix.
///
/// # Errors
///
/// Returns [`StackpackError::Config`] if `expected` is not a SHA-256 hex
/// digest and [`StackpackError::HashMismatch`] if the digests differ.
pub fn verify(resource: &str, data: &[u8], expected: &str) -> Result<()> {
    let expected = Sha256Hash::from_hex(expected.strip_prefix("sha256:").unwrap_or(expected))?;
    let actual = sha256_hex(data);
    tracing::debug!(resource, "validating SHA-256 checksum");
    if actual == expected.as_hex() {
        Ok(())
    } else {
        Err(StackpackError::HashMismatch {
            resource: resource.to_string(),
            expected: expected.as_hex().to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn known_digest() {
        assert_eq!(sha256_hex(b"hello"), HELLO);
    }

    #[test]
    fn verify_accepts_prefix_and_case() {
        verify("x", b"hello", &format!("sha256:{}", HELLO.to_uppercase())).expect("match");
    }

    #[test]
    fn verify_rejects_malformed_checksum() {
        assert!(matches!(
            verify("x", b"hello", "abc"),
            Err(StackpackError::Config { .. })
        ));
    }

    #[test]
    fn verify_reports_mismatch() {
        let err = verify("asset.bin", b"other", HELLO).unwrap_err();
        assert!(matches!(err, StackpackError::HashMismatch { ref resource, .. } if resource == "asset.bin"));
    }
}
