use serde_json::Value;
use sha2::{Digest, Sha256};

use irrl_core::types::{ContentId, CONTENT_ID_PREFIX};

use crate::canonical::canonical_bytes;

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Derive the content id of a record: `"cid_" + sha256(canonical(record))`.
pub fn content_id(record: &Value) -> ContentId {
    format!("{}{}", CONTENT_ID_PREFIX, sha256_hex(&canonical_bytes(record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_id_is_key_order_invariant() {
        let a: Value = serde_json::from_str(r#"{"claim":"x","subject":"s"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"subject":"s","claim":"x"}"#).unwrap();
        assert_eq!(content_id(&a), content_id(&b));
        assert!(content_id(&a).starts_with("cid_"));
    }

    #[test]
    fn content_id_differs_on_any_field_change() {
        let a = json!({"subject": "s", "claim": "x"});
        let b = json!({"subject": "s", "claim": "y"});
        assert_ne!(content_id(&a), content_id(&b));
    }

    #[test]
    fn sha256_matches_known_vector() {
        // sha256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
