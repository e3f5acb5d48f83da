// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request fingerprints for duplicate suppression.
//!
//! `fingerprint = digest(UPPER(method) + ":" + url + ":" + normalize(body))`
//!
//! SHA-256 (hex) is the default digest. DJB2 (base36) is kept as a fast
//! non-cryptographic alternative; collisions only cause a spurious
//! duplicate suppression, so stability is all that matters.
//!
//! # Example
//!
//! ```
//! use retry_queue::{fingerprint, RequestBody};
//!
//! let a = fingerprint("post", "/api/items", Some(&RequestBody::from("x")));
//! let b = fingerprint("POST", "/api/items", Some(&RequestBody::from("x")));
//! assert_eq!(a, b);
//! assert_eq!(a.len(), 64);
//! ```

use sha2::{Digest, Sha256};

use crate::request::RequestBody;

/// Digest used to fingerprint requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintAlgorithm {
    /// SHA-256, lowercase hex (64 chars)
    #[default]
    Sha256,
    /// DJB2 xor variant over UTF-16 code units, base36
    Djb2,
}

/// Fingerprint with the default digest (SHA-256).
#[must_use]
pub fn fingerprint(method: &str, url: &str, body: Option<&RequestBody>) -> String {
    fingerprint_with(FingerprintAlgorithm::Sha256, method, url, body)
}

/// Fingerprint with an explicit digest.
#[must_use]
pub fn fingerprint_with(
    algorithm: FingerprintAlgorithm,
    method: &str,
    url: &str,
    body: Option<&RequestBody>,
) -> String {
    let input = canonical_input(method, url, body);
    match algorithm {
        FingerprintAlgorithm::Sha256 => hex::encode(Sha256::digest(input.as_bytes())),
        FingerprintAlgorithm::Djb2 => djb2(&input),
    }
}

/// The string that gets hashed.
#[must_use]
pub fn canonical_input(method: &str, url: &str, body: Option<&RequestBody>) -> String {
    let body = body.map(RequestBody::render).unwrap_or_default();
    format!("{}:{}:{}", method.to_ascii_uppercase(), url, body)
}

fn djb2(input: &str) -> String {
    let mut hash: u32 = 5381;
    for unit in input.encode_utf16() {
        hash = hash.wrapping_mul(33) ^ u32::from(unit);
    }
    to_base36(hash)
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_input() {
        assert_eq!(canonical_input("get", "/a", None), "GET:/a:");
        assert_eq!(
            canonical_input("post", "/a", Some(&RequestBody::from("raw"))),
            "POST:/a:raw"
        );
        assert_eq!(
            canonical_input("put", "/a", Some(&RequestBody::from(json!({"z": 1, "a": [1, 2]})))),
            r#"PUT:/a:{"a":[1,2],"z":1}"#
        );
    }

    #[test]
    fn test_sha256_known_vector() {
        // sha256("GET:/a:")
        let expected = hex::encode(Sha256::digest(b"GET:/a:"));
        assert_eq!(fingerprint("GET", "/a", None), expected);
    }

    #[test]
    fn test_method_case_insensitive() {
        assert_eq!(fingerprint("delete", "/x", None), fingerprint("DELETE", "/x", None));
    }

    #[test]
    fn test_different_inputs_differ() {
        let base = fingerprint("POST", "/x", Some(&RequestBody::from("1")));
        assert_ne!(base, fingerprint("PUT", "/x", Some(&RequestBody::from("1"))));
        assert_ne!(base, fingerprint("POST", "/y", Some(&RequestBody::from("1"))));
        assert_ne!(base, fingerprint("POST", "/x", Some(&RequestBody::from("2"))));
    }

    #[test]
    fn test_json_key_order_does_not_matter() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(
            fingerprint("POST", "/x", Some(&RequestBody::Json(a))),
            fingerprint("POST", "/x", Some(&RequestBody::Json(b)))
        );
    }

    #[test]
    fn test_djb2_stable() {
        let a = fingerprint_with(FingerprintAlgorithm::Djb2, "GET", "/a", None);
        let b = fingerprint_with(FingerprintAlgorithm::Djb2, "get", "/a", None);
        assert_eq!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_djb2_empty_input() {
        // 5381 in base36
        assert_eq!(djb2(""), "45h");
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
