//! Admin authentication: a single process-wide secret compared against the
//! `X-Slurpee-Admin-Secret` header.

/// Constant-time comparison of the presented admin secret against the
/// configured one, so response timing can't be used to guess it
/// byte-by-byte.
pub fn verify_admin_secret(presented: &str, configured: &str) -> bool {
    if presented.len() != configured.len() {
        return false;
    }
    presented
        .bytes()
        .zip(configured.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_secrets_verify() {
        assert!(verify_admin_secret("hunter2", "hunter2"));
    }

    #[test]
    fn mismatched_secrets_do_not_verify() {
        assert!(!verify_admin_secret("hunter2", "hunter3"));
    }

    #[test]
    fn different_lengths_do_not_verify() {
        assert!(!verify_admin_secret("short", "much-longer-secret"));
    }
}
