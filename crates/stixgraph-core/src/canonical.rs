//! # Canonical Encoding
//!
//! Deterministic byte encoding of JSON values.
//!
//! The encoding is the hash input of the identifier generator and the size
//! function of the splitter, so it must not depend on property order, the
//! platform, or the float formatter of the day:
//! - object keys sorted by UTF-16 code units, recursively
//! - no insignificant whitespace
//! - strings escaped minimally (`"`, `\`, control characters)
//! - numbers in ECMAScript shortest round-trip form (`5.0` -> `5`)

use crate::types::StixObject;
use serde_json::{Number, Value};

// =============================================================================
// ENCODER
// =============================================================================

/// Encode a value to canonical bytes.
#[must_use]
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = String::new();
    write_value(&mut out, value);
    out.into_bytes()
}

/// Length in bytes of the canonical encoding of a value.
#[must_use]
pub fn canonical_len(value: &Value) -> usize {
    let mut out = String::new();
    write_value(&mut out, value);
    out.len()
}

/// Canonical byte size of an object, `type` and `id` included.
///
/// This is the splitter's size function.
#[must_use]
pub fn object_len(object: &StixObject) -> usize {
    let object_type = Value::String(object.object_type.clone());
    let id = Value::String(object.id.clone());
    let header = [("type", &object_type), ("id", &id)];

    let mut out = String::new();
    write_entries(
        &mut out,
        header
            .into_iter()
            .chain(object.properties.iter().map(|(k, v)| (k.as_str(), v))),
    );
    out.len()
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_entries(out, map.iter().map(|(k, v)| (k.as_str(), v))),
    }
}

fn write_entries<'a>(out: &mut String, entries: impl Iterator<Item = (&'a str, &'a Value)>) {
    let mut entries: Vec<(&str, &Value)> = entries.collect();
    entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));

    out.push('{');
    for (idx, (key, item)) in entries.into_iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        write_string(out, key);
        out.push(':');
        write_value(out, item);
    }
    out.push('}');
}

fn write_string(out: &mut String, s: &str) {
    // serde_json escapes exactly the canonical set; a str never fails to serialize.
    if let Ok(encoded) = serde_json::to_string(s) {
        out.push_str(&encoded);
    }
}

// =============================================================================
// NUMBERS
// =============================================================================

fn write_number(out: &mut String, n: &Number) {
    if let Some(v) = n.as_u64() {
        out.push_str(&v.to_string());
    } else if let Some(v) = n.as_i64() {
        out.push_str(&v.to_string());
    } else if let Some(v) = n.as_f64() {
        out.push_str(&format_f64(v));
    }
}

/// Format a finite float the way ECMAScript `Number.prototype.toString` does.
///
/// Rust's `{:e}` already yields the shortest round-trip digit string; only
/// the placement of the decimal point differs.
pub(crate) fn format_f64(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:e}", v.abs());
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    let k = digits.len() as i32;
    let n = exponent + 1;

    let mut out = String::new();
    if v.is_sign_negative() {
        out.push('-');
    }

    if k <= n && n <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat_n('0', (n - k) as usize));
    } else if 0 < n && n <= 21 {
        let (int_part, frac_part) = digits.split_at(n as usize);
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac_part);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat_n('0', (-n) as usize));
        out.push_str(&digits);
    } else {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        out.push('e');
        out.push(if n - 1 < 0 { '-' } else { '+' });
        out.push_str(&(n - 1).abs().to_string());
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canon(value: Value) -> String {
        String::from_utf8(to_canonical_bytes(&value)).expect("utf8")
    }

    #[test]
    fn keys_are_sorted_recursively() {
        assert_eq!(
            canon(json!({"b": 1, "a": {"d": true, "c": null}})),
            r#"{"a":{"c":null,"d":true},"b":1}"#
        );
    }

    #[test]
    fn encoding_ignores_property_order() {
        let a = json!({"name": "lyon", "x_opencti_location_type": "City"});
        let b = json!({"x_opencti_location_type": "City", "name": "lyon"});
        assert_eq!(to_canonical_bytes(&a), to_canonical_bytes(&b));
    }

    #[test]
    fn strings_keep_non_ascii_and_escape_controls() {
        assert_eq!(canon(json!("été")), "\"été\"");
        assert_eq!(canon(json!("a\"b\\c\n\u{1f}")), r#""a\"b\\c\n\u001f""#);
        assert_eq!(canon(json!("a/b")), r#""a/b""#);
        assert_eq!(canon(json!("\u{8}\u{c}\r\t")), r#""\b\f\r\t""#);
    }

    #[test]
    fn floats_use_shortest_ecmascript_form() {
        assert_eq!(format_f64(5.12), "5.12");
        assert_eq!(format_f64(5.0), "5");
        assert_eq!(format_f64(-0.0), "0");
        assert_eq!(format_f64(-45.5), "-45.5");
        assert_eq!(format_f64(0.000001), "0.000001");
        assert_eq!(format_f64(0.0000001), "1e-7");
        assert_eq!(format_f64(1e21), "1e+21");
        assert_eq!(format_f64(123456789012345680000.0), "123456789012345680000");
        assert_eq!(format_f64(1.5e300), "1.5e+300");
    }

    #[test]
    fn integers_are_plain() {
        assert_eq!(canon(json!([1, -2, 18446744073709551615u64])), "[1,-2,18446744073709551615]");
    }

    #[test]
    fn object_len_counts_type_and_id() {
        let object = StixObject::new("malware", "malware--a").with("name", "a");
        let expected = r#"{"id":"malware--a","name":"a","type":"malware"}"#;
        assert_eq!(object_len(&object), expected.len());
    }

    #[test]
    fn canonical_len_matches_bytes() {
        let value = json!({"name": "émotet", "aliases": ["a", "b"]});
        assert_eq!(canonical_len(&value), to_canonical_bytes(&value).len());
    }
}
