//! Canonical JSON encoding.
//!
//! Every content id, signature and audit hash in the system is computed over
//! this encoding, so it must be byte-identical across instances for
//! semantically equal inputs: object keys sorted lexicographically, no
//! insignificant whitespace, UTF-8, shortest exact decimal form for numbers,
//! array order preserved. NaN and Infinity are unrepresentable in
//! `serde_json::Value` and therefore cannot reach the encoder.

use serde_json::Value;

/// Serialize `value` into its canonical JSON text.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Canonical JSON text as UTF-8 bytes — the sign/hash input for records.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    canonical_json(value).into_bytes()
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        // serde_json renders integers exactly and floats in shortest
        // round-trip decimal form, which is the canonical contract.
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(key, out);
                out.push(':');
                write_value(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

fn write_escaped(s: &str, out: &mut String) {
    // serde_json's string escaping is already deterministic.
    out.push_str(&serde_json::to_string(s).expect("string serialization is infallible"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_recursively() {
        let v = json!({"b": {"z": 1, "a": 2}, "a": [3, 1, 2]});
        assert_eq!(canonical_json(&v), r#"{"a":[3,1,2],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn key_order_does_not_change_output() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":{"p":true,"q":null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":{"q":null,"p":true},"x":1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn array_order_is_preserved() {
        let v = json!(["c", "a", "b"]);
        assert_eq!(canonical_json(&v), r#"["c","a","b"]"#);
    }

    #[test]
    fn numbers_use_shortest_exact_form() {
        assert_eq!(canonical_json(&json!(42)), "42");
        assert_eq!(canonical_json(&json!(0.5)), "0.5");
        assert_eq!(canonical_json(&json!(-7)), "-7");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(canonical_json(&json!("a\"b\n")), r#""a\"b\n""#);
    }

    #[test]
    fn no_insignificant_whitespace() {
        let v = json!({"k": [1, {"m": 2}]});
        assert!(!canonical_json(&v).contains(' '));
    }
}
