//! # Reference Fields
//!
//! The reference-field model shared by the rewriter and the splitter.
//!
//! A property is a reference field when its key ends with `_ref` (a single
//! identifier) or `_refs` (a list of identifiers). Nested objects and arrays
//! are walked too, so references held by inline objects such as
//! `granular_markings[].marking_ref` are found.

use crate::primitives::{REF_SUFFIX, REFS_SUFFIX};
use crate::types::StixObject;
use serde_json::{Map, Value};

/// A reference found on an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Path of the field, e.g. `created_by_ref` or `granular_markings[0].marking_ref`.
    pub field: String,
    /// The referenced identifier.
    pub target: String,
}

/// Whether a property key names a reference field.
#[must_use]
pub fn is_reference_key(key: &str) -> bool {
    key.ends_with(REF_SUFFIX) || key.ends_with(REFS_SUFFIX)
}

// =============================================================================
// COLLECTION
// =============================================================================

/// Collect every reference of an object, in property order.
#[must_use]
pub fn collect_references(object: &StixObject) -> Vec<Reference> {
    let mut out = Vec::new();
    collect_in_map("", &object.properties, &mut out);
    out
}

/// Collect only the referenced identifiers.
#[must_use]
pub fn referenced_ids(object: &StixObject) -> Vec<String> {
    collect_references(object)
        .into_iter()
        .map(|reference| reference.target)
        .collect()
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn collect_in_map(prefix: &str, map: &Map<String, Value>, out: &mut Vec<Reference>) {
    for (key, value) in map {
        let path = join(prefix, key);
        match value {
            Value::String(target) if key.ends_with(REF_SUFFIX) => out.push(Reference {
                field: path,
                target: target.clone(),
            }),
            Value::Array(items) if key.ends_with(REFS_SUFFIX) => {
                for target in items.iter().filter_map(Value::as_str) {
                    out.push(Reference {
                        field: path.clone(),
                        target: target.to_string(),
                    });
                }
            }
            _ => collect_nested(&path, value, out),
        }
    }
}

fn collect_nested(path: &str, value: &Value, out: &mut Vec<Reference>) {
    match value {
        Value::Object(map) => collect_in_map(path, map, out),
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                collect_nested(&format!("{path}[{idx}]"), item, out);
            }
        }
        _ => {}
    }
}

// =============================================================================
// SUBSTITUTION
// =============================================================================

/// Return a copy of the object with every reference passed through `f`.
///
/// `f` receives the field path and the current identifier and returns the
/// replacement, or `None` to keep the identifier unchanged. The input object
/// is not modified.
#[must_use]
pub fn map_references<F>(object: &StixObject, mut f: F) -> StixObject
where
    F: FnMut(&str, &str) -> Option<String>,
{
    StixObject {
        object_type: object.object_type.clone(),
        id: object.id.clone(),
        properties: map_in_map("", &object.properties, &mut f),
    }
}

fn map_in_map<F>(prefix: &str, map: &Map<String, Value>, f: &mut F) -> Map<String, Value>
where
    F: FnMut(&str, &str) -> Option<String>,
{
    map.iter()
        .map(|(key, value)| {
            let path = join(prefix, key);
            let mapped = match value {
                Value::String(target) if key.ends_with(REF_SUFFIX) => {
                    Value::String(f(&path, target).unwrap_or_else(|| target.clone()))
                }
                Value::Array(items) if key.ends_with(REFS_SUFFIX) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(target) => {
                                Value::String(f(&path, target).unwrap_or_else(|| target.clone()))
                            }
                            other => other.clone(),
                        })
                        .collect(),
                ),
                _ => map_nested(&path, value, f),
            };
            (key.clone(), mapped)
        })
        .collect()
}

fn map_nested<F>(path: &str, value: &Value, f: &mut F) -> Value
where
    F: FnMut(&str, &str) -> Option<String>,
{
    match value {
        Value::Object(map) => Value::Object(map_in_map(path, map, f)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| map_nested(&format!("{path}[{idx}]"), item, f))
                .collect(),
        ),
        other => other.clone(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
