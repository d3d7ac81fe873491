//! Observability for the MedTag service.
//!
//! All instrumentation uses `#[instrument(skip_all)]` and explicit field
//! allow-listing. Fields fall into three groups:
//! - **SAFE**: enums, counts, status codes
//! - **HASHED**: emails and tag UIDs, via [`hash_for_correlation`]
//! - **NEVER**: passwords, tokens, checksums, OTP codes, medical data

pub mod metrics;

use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars).
///
/// This is a one-way hash for correlating log lines, not a secret store.
pub fn hash_for_correlation(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest.get(..4).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_for_correlation_consistency() {
        assert_eq!(
            hash_for_correlation("anna@example.com"),
            hash_for_correlation("anna@example.com")
        );
    }

    #[test]
    fn test_hash_for_correlation_uniqueness() {
        assert_ne!(
            hash_for_correlation("04A224B1C25E80"),
            hash_for_correlation("04A224B1C25E81")
        );
    }

    #[test]
    fn test_hash_for_correlation_format() {
        let hash = hash_for_correlation("");
        assert_eq!(hash.len(), 8);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}
