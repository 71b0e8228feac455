//! JCS-style canonical JSON (RFC 8785 subset): object keys sorted by UTF-16
//! code unit, no insignificant whitespace, integers in shortest form, strings
//! with minimal escaping. Only the data model the protocol actually emits is
//! supported: objects, arrays, strings, booleans, null, and integers that fit
//! in an `i64`/`u64`. Larger values travel as decimal strings at the call
//! site and are never produced by this canonicalizer, matching the contract
//! in §4.1.

use serde_json::Value;

use crate::error::CryptoError;

/// Canonicalize `value` to its JCS byte representation.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>, CryptoError> {
    let mut out = String::new();
    write_value(value, &mut out)?;
    Ok(out.into_bytes())
}

fn write_value(value: &Value, out: &mut String) -> Result<(), CryptoError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| utf16_units(a).cmp(&utf16_units(b)));
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(&map[*key], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn utf16_units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn write_number(n: &serde_json::Number, out: &mut String) -> Result<(), CryptoError> {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
        return Ok(());
    }
    Err(CryptoError::NotCanonicalizable(format!(
        "non-integer or out-of-range number: {n}"
    )))
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let v = json!({"b": 1, "a": 2, "c": 3});
        let bytes = canonicalize(&v).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"a":2,"b":1,"c":3}"#);
    }

    #[test]
    fn no_whitespace_is_inserted() {
        let v = json!({"arr": [1, 2, 3], "nested": {"x": null}});
        let bytes = canonicalize(&v).unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert!(!s.contains(' '));
        assert_eq!(s, r#"{"arr":[1,2,3],"nested":{"x":null}}"#);
    }

    #[test]
    fn strings_use_minimal_escaping() {
        let v = json!({"s": "line1\nline2\t\"quoted\""});
        let bytes = canonicalize(&v).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"s":"line1\nline2\t\"quoted\""}"#
        );
    }

    #[test]
    fn same_object_different_key_order_canonicalizes_identically() {
        let a = json!({"z": 1, "a": 2});
        let b = json!({"a": 2, "z": 1});
        assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
    }

    #[test]
    fn non_integer_number_is_rejected() {
        let v = json!({"x": 1.5});
        assert!(canonicalize(&v).is_err());
    }
}
