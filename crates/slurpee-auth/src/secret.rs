//! API secret verification.
//!
//! Secrets are looked up by id and checked with bcrypt - never by scanning
//! every hash in the table. Every failure mode (bad id, unknown id, hash
//! mismatch) collapses to the same generic authentication error so the
//! publisher can't distinguish them.

use slurpee_core::error::{Error, Result};

/// Hash a plaintext secret for storage, using bcrypt's default cost.
pub fn hash_secret(plaintext: &str) -> Result<String> {
    bcrypt::hash(plaintext, bcrypt::DEFAULT_COST)
        .map_err(|e| Error::database_with_source("failed to hash API secret", e))
}

/// Verify a plaintext secret against its stored bcrypt hash. Any verifier
/// error (e.g. a corrupt hash) is treated as a mismatch rather than
/// propagated, per the "never disclose which check failed" rule in §7.
pub fn verify_secret(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}
