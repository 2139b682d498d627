//! Utility functions shared across valscore crates.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::path::PathBuf;

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

/// Round to a fixed number of decimals.
///
/// Non-finite values are returned unchanged.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Works on character boundaries so Hangul/CJK names are never split mid-byte.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Canonical bytes of `value` for hashing.
///
/// JSON when it serializes, otherwise the `Debug` rendering.
pub fn canonical_bytes<T: Serialize + Debug + ?Sized>(value: &T) -> Vec<u8> {
    match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Value did not serialize, hashing its debug form");
            format!("{:?}", value).into_bytes()
        }
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(0.125, 2), 0.13);
        assert!(round_to(f64::NAN, 2).is_nan());
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("삼성전자", 10), "삼성전자");
        assert_eq!(truncate_with_ellipsis("hello world", 5), "hello...");
        assert_eq!(truncate_with_ellipsis("", 3), "");
    }

    #[test]
    fn test_canonical_bytes_survives_unserializable_values() {
        use std::collections::BTreeMap;

        // Tuple keys are rejected by serde_json.
        let a: BTreeMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        let b: BTreeMap<(u8, u8), u8> = [((1, 2), 4)].into_iter().collect();
        assert!(serde_json::to_vec(&a).is_err());

        let bytes_a = canonical_bytes(&a);
        assert!(!bytes_a.is_empty());
        assert_ne!(bytes_a, canonical_bytes(&b));
        assert_ne!(sha256_hex(&bytes_a), sha256_hex(&canonical_bytes(&b)));
    }

    #[test]
    fn test_canonical_bytes_prefers_json() {
        assert_eq!(canonical_bytes(&vec![1, 2]), b"[1,2]".to_vec());
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(expand_path("/tmp/x.jsonl"), PathBuf::from("/tmp/x.jsonl"));
    }

    proptest! {
        #[test]
        fn prop_round_to_stays_within_half_unit(v in -1.0e6f64..1.0e6, decimals in 0u32..6) {
            let rounded = round_to(v, decimals);
            let half = 0.5 / 10f64.powi(decimals as i32);
            prop_assert!((rounded - v).abs() <= half + 1e-9);
            prop_assert_eq!(round_to(rounded, decimals), rounded);
        }

        #[test]
        fn prop_truncate_respects_char_limit(s in "\\PC{0,40}", max in 0usize..30) {
            let out = truncate_with_ellipsis(&s, max);
            prop_assert!(out.chars().count() <= max + 3);
        }
    }
}
