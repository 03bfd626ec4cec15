//! Content fingerprints
//!
//! SHA-256 over the UTF-8 bytes of the content, lowercase hex encoded.

use sha2::{Digest, Sha256};

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 64;

/// Compute the fingerprint of a text
pub fn fingerprint(content: &str) -> String {
    fingerprint_bytes(content.as_bytes())
}

/// Compute the fingerprint of raw bytes
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_string() {
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_text_and_bytes_agree() {
        let body = "<html>v1</html>";
        assert_eq!(fingerprint(body), fingerprint_bytes(body.as_bytes()));
    }

    proptest! {
        #[test]
        fn prop_deterministic(s in ".*") {
            prop_assert_eq!(fingerprint(&s), fingerprint(&s));
        }

        #[test]
        fn prop_fixed_length_lowercase_hex(s in ".*") {
            let fp = fingerprint(&s);
            prop_assert_eq!(fp.len(), FINGERPRINT_LEN);
            prop_assert!(fp.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }

        #[test]
        fn prop_distinct_inputs(a in ".{0,64}", b in ".{0,64}") {
            prop_assume!(a != b);
            prop_assert_ne!(fingerprint(&a), fingerprint(&b));
        }
    }
}
