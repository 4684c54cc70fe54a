//! # Canonical Identifier Generator
//!
//! Pure function: (object type, field values) -> stable identifier.
//!
//! 1. Look up the type's rule in the [`table`].
//! 2. Select the first key set whose fields are all present and non-empty.
//! 3. Normalize those fields into a mapping restricted to exactly that set.
//! 4. Canonicalize the mapping and hash it with UUIDv5 under the family
//!    namespace.
//! 5. Emit `<type>--<uuid>`.
//!
//! The same type and the same normalized values always give the same
//! identifier, independent of property order, process or machine.

pub mod table;

use crate::canonical::to_canonical_bytes;
use crate::types::{StixError, StixObject, format_id};
use serde_json::{Map, Number, Value};
use table::{KeyField, Normalizer, rule_for};
use uuid::Uuid;

pub use table::{Family, is_supported, supported_types};

// =============================================================================
// GENERATOR
// =============================================================================

/// Generate the canonical identifier for an object of `object_type` with
/// the given properties.
///
/// # Errors
/// - `StixError::UnsupportedType` when no rule covers the type
/// - `StixError::InvalidKey` when no candidate key set is fully present;
///   `missing` lists every absent field across the candidates
pub fn generate_id(object_type: &str, fields: &Map<String, Value>) -> Result<String, StixError> {
    let rule = rule_for(object_type, fields)
        .ok_or_else(|| StixError::UnsupportedType(object_type.to_string()))?;

    let mut missing: Vec<String> = Vec::new();
    for key_set in rule.key_sets {
        match resolve_key_set(key_set, fields) {
            Ok(mapping) => {
                let bytes = to_canonical_bytes(&Value::Object(mapping));
                let uuid = Uuid::new_v5(&rule.family.namespace(), &bytes);
                return Ok(format_id(object_type, uuid));
            }
            Err(absent) => {
                for name in absent {
                    if !missing.iter().any(|known| known == name) {
                        missing.push(name.to_string());
                    }
                }
            }
        }
    }

    Err(StixError::InvalidKey {
        object_type: object_type.to_string(),
        missing,
    })
}

/// Generate the canonical identifier of an existing object from its own
/// properties.
pub fn generate_id_for(object: &StixObject) -> Result<String, StixError> {
    generate_id(&object.object_type, &object.properties)
}

// =============================================================================
// KEY SET RESOLUTION
// =============================================================================

/// Build the normalized mapping for a key set, or report which of its
/// fields are absent.
fn resolve_key_set(
    key_set: &[KeyField],
    fields: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<&'static str>> {
    let mut mapping = Map::new();
    let mut absent = Vec::new();

    for key in key_set {
        let value = fields
            .get(key.source)
            .and_then(|raw| normalize(key.normalizer, raw))
            .or_else(|| key.default.map(|default| Value::String(default.to_string())));

        match value {
            Some(value) => {
                mapping.insert(key.canonical.to_string(), value);
            }
            None => absent.push(key.source),
        }
    }

    if absent.is_empty() {
        Ok(mapping)
    } else {
        Err(absent)
    }
}

/// Apply a normalizer. Returns `None` when the result is not "present and
/// non-empty".
fn normalize(normalizer: Normalizer, raw: &Value) -> Option<Value> {
    let value = match (normalizer, raw) {
        (Normalizer::LowerTrim, Value::String(s)) => Value::String(trim(s).to_lowercase()),
        (Normalizer::Lower, Value::String(s)) => Value::String(s.to_lowercase()),
        (Normalizer::Trim, Value::String(s)) => Value::String(trim(s).to_string()),
        (Normalizer::Coordinate, Value::Number(n)) => Value::Number(Number::from_f64(n.as_f64()?)?),
        (Normalizer::Coordinate, Value::String(s)) => {
            Value::Number(Number::from_f64(trim(s).parse::<f64>().ok()?)?)
        }
        (Normalizer::Coordinate, _) => return None,
        (_, other) => other.clone(),
    };

    is_present(&value).then_some(value)
}

/// Strip surrounding whitespace, the ASCII separators `\x1c`..`\x1f`
/// included, so free text trims the same way across producers.
fn trim(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || ('\x1c'..='\x1f').contains(&c))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !trim(s).is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn gen_id(object_type: &str, value: Value) -> String {
        generate_id(object_type, &props(value)).expect("generate")
    }

    #[test]
    fn catalog_key_takes_priority_over_name() {
        let by_key = gen_id("attack-pattern", json!({"x_mitre_id": "MITREID"}));
        let both = gen_id("attack-pattern", json!({"name": "attack", "x_mitre_id": "MITREID"}));
        let by_name = gen_id("attack-pattern", json!({"name": "attack"}));

        assert_eq!(by_key, both);
        assert_ne!(by_key, by_name);
    }

    #[test]
    fn name_is_case_folded_and_trimmed() {
        assert_eq!(
            gen_id("malware", json!({"name": "  Emotet "})),
            gen_id("malware", json!({"name": "emotet"}))
        );
    }

    #[test]
    fn ascii_separators_are_trimmed() {
        assert_eq!(
            gen_id("malware", json!({"name": "\u{1f}Emotet\u{1c} "})),
            gen_id("malware", json!({"name": "emotet"}))
        );
        assert_eq!(
            gen_id("indicator", json!({"pattern": "\u{1d}[ipv4-addr:value = '1.2.3.4']\u{1e}"})),
            gen_id("indicator", json!({"pattern": "[ipv4-addr:value = '1.2.3.4']"}))
        );
        assert!(generate_id("malware", &props(json!({"name": "\u{1f}\u{1c}"}))).is_err());
    }

    #[test]
    fn identity_class_is_case_folded() {
        assert_eq!(
            gen_id("identity", json!({"name": "julien", "identity_class": "Individual"})),
            gen_id("identity", json!({"name": "julien", "identity_class": "individual"}))
        );
    }

    #[test]
    fn empty_values_count_as_missing() {
        let err = generate_id("malware", &props(json!({"name": "   "}))).expect_err("empty");
        assert_eq!(
            err,
            StixError::InvalidKey {
                object_type: "malware".to_string(),
                missing: vec!["name".to_string()],
            }
        );
        assert!(generate_id("observed-data", &props(json!({"object_refs": []}))).is_err());
    }

    #[test]
    fn missing_fields_are_collected_across_candidates() {
        let err = generate_id("relationship", &props(json!({"relationship_type": "uses"})))
            .expect_err("incomplete");
        assert_eq!(
            err,
            StixError::InvalidKey {
                object_type: "relationship".to_string(),
                missing: vec![
                    "source_ref".to_string(),
                    "target_ref".to_string(),
                    "start_time".to_string(),
                    "stop_time".to_string(),
                ],
            }
        );
    }

    #[test]
    fn unsupported_type_is_reported() {
        assert_eq!(
            generate_id("marking-definition", &Map::new()),
            Err(StixError::UnsupportedType("marking-definition".to_string()))
        );
    }

    #[test]
    fn coordinates_accept_numeric_strings() {
        assert_eq!(
            gen_id("location", json!({"latitude": "5.12", "x_opencti_location_type": "Position"})),
            gen_id("location", json!({"latitude": 5.12, "x_opencti_location_type": "Position"}))
        );
    }

    #[test]
    fn integral_coordinates_match_their_float_form() {
        assert_eq!(
            gen_id("location", json!({"latitude": 5, "x_opencti_location_type": "Position"})),
            gen_id("location", json!({"latitude": 5.0, "x_opencti_location_type": "Position"}))
        );
    }

    #[test]
    fn relationship_time_bounds_need_both_ends() {
        let base = json!({
            "relationship_type": "uses",
            "source_ref": "malware--1",
            "target_ref": "attack-pattern--2",
        });
        let mut one_end = base.clone();
        one_end["start_time"] = json!("2022-11-25T19:00:05.000Z");

        assert_eq!(gen_id("relationship", base.clone()), gen_id("relationship", one_end.clone()));

        let mut both_ends = one_end;
        both_ends["stop_time"] = json!("2023-01-01T00:00:00.000Z");
        assert_ne!(gen_id("relationship", base), gen_id("relationship", both_ends));
    }

    #[test]
    fn generate_id_for_reads_object_properties() {
        let object = StixObject::new("tool", "tool--0").with("name", "my-tool");
        assert_eq!(
            generate_id_for(&object).expect("generate"),
            "tool--41cd21d0-f50e-5e3d-83fc-447e0def97b7"
        );
    }
}
