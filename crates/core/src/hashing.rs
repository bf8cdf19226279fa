//! SHA-256 digests for bearer secrets stored at rest.
//!
//! Refresh tokens, password-reset tokens and OTP codes are persisted only as
//! the hex digest produced here, so a read-only database dump cannot be
//! replayed as a live credential.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Digest of a bearer secret (refresh token, reset token, OTP code).
pub fn hash_secret(secret: &str) -> String {
    sha256_hex(secret.as_bytes())
}

/// Compare two secrets without short-circuiting on the first differing byte.
///
/// Both sides are hashed first so the comparison length does not depend on
/// the caller-supplied value.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
