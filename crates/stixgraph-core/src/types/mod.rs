//! # Core Type Definitions
//!
//! This module contains the shared types of the stixgraph bundle engine:
//! - Objects and bundles (`StixObject`, `Bundle`)
//! - Identifier helpers (`parse_id`, `format_id`)
//! - The previous-identifier history (`Lineage`)
//! - Error and diagnostic types (`StixError`, `Diagnostic`, `Severity`)
//!
//! ## Ownership Guarantees
//!
//! Engine operations borrow their input bundle and return new owned values.
//! Nothing in this module hands out interior mutability.

use crate::primitives::{BUNDLE_TYPE, ID_SEPARATOR, LINEAGE_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Split an identifier of the form `<type>--<token>` into its two halves.
///
/// Returns `StixError::InvalidIdentifier` when the separator is missing or
/// either half is empty.
pub fn parse_id(id: &str) -> Result<(&str, &str), StixError> {
    match id.split_once(ID_SEPARATOR) {
        Some((object_type, token)) if !object_type.is_empty() && !token.is_empty() => {
            Ok((object_type, token))
        }
        _ => Err(StixError::InvalidIdentifier(id.to_string())),
    }
}

/// Join a type and a token into an identifier.
#[must_use]
pub fn format_id(object_type: &str, token: impl fmt::Display) -> String {
    format!("{object_type}{ID_SEPARATOR}{token}")
}

// =============================================================================
// STIX OBJECT
// =============================================================================

/// A typed object of an import graph.
///
/// `type` and `id` are lifted into fields; every other property is kept
/// verbatim, in input order, in `properties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StixObject {
    /// The type discriminator (`malware`, `relationship`, ...).
    #[serde(rename = "type")]
    pub object_type: String,

    /// The object identifier, `<type>--<token>`.
    pub id: String,

    /// All remaining properties.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl StixObject {
    /// Create an object with no properties.
    #[must_use]
    pub fn new(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id: id.into(),
            properties: Map::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Get a property by name.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// The lineage recorded on this object (empty when absent).
    #[must_use]
    pub fn lineage(&self) -> Lineage {
        Lineage::from_value(self.properties.get(LINEAGE_FIELD))
    }

    /// Replace the lineage field. An empty lineage removes the field.
    pub fn set_lineage(&mut self, lineage: Lineage) {
        if lineage.is_empty() {
            self.properties.shift_remove(LINEAGE_FIELD);
        } else {
            self.properties
                .insert(LINEAGE_FIELD.to_string(), lineage.into_value());
        }
    }
}

// =============================================================================
// LINEAGE
// =============================================================================

/// Append-only, duplicate-free history of previous identifiers.
///
/// Stored on the object as the `x_opencti_stix_ids` extension field.
/// Insertion order is first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lineage(Vec<String>);

impl Lineage {
    /// Create an empty lineage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a lineage from the raw property value.
    ///
    /// Non-string elements are dropped and duplicates collapse onto their
    /// first occurrence.
    #[must_use]
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut lineage = Self::new();
        if let Some(Value::Array(items)) = value {
            for id in items.iter().filter_map(Value::as_str) {
                lineage.push(id);
            }
        }
        lineage
    }

    /// Append an identifier unless it is already present.
    /// Returns `true` when the identifier was added.
    pub fn push(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id.to_string());
        true
    }

    /// Check whether the identifier is recorded.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|known| known == id)
    }

    /// Number of recorded identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn into_value(self) -> Value {
        Value::Array(self.0.into_iter().map(Value::String).collect())
    }
}

impl<S: AsRef<str>> FromIterator<S> for Lineage {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut lineage = Self::new();
        for id in iter {
            lineage.push(id.as_ref());
        }
        lineage
    }
}

// =============================================================================
// BUNDLE
// =============================================================================

fn bundle_type() -> String {
    BUNDLE_TYPE.to_string()
}

/// An ordered collection of objects forming one unit of import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Always `bundle`.
    #[serde(rename = "type", default = "bundle_type")]
    pub bundle_type: String,

    /// The envelope identifier, carried through every operation unchanged.
    pub id: String,

    /// The objects, in producer order.
    #[serde(default)]
    pub objects: Vec<StixObject>,

    /// Any additional envelope properties (`spec_version`, extensions).
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Bundle {
    /// Create a bundle envelope around the given objects.
    #[must_use]
    pub fn new(id: impl Into<String>, objects: Vec<StixObject>) -> Self {
        Self {
            bundle_type: bundle_type(),
            id: id.into(),
            objects,
            properties: Map::new(),
        }
    }

    /// A bundle with the same envelope and the given objects.
    #[must_use]
    pub fn with_objects(&self, objects: Vec<StixObject>) -> Self {
        Self {
            bundle_type: self.bundle_type.clone(),
            id: self.id.clone(),
            objects,
            properties: self.properties.clone(),
        }
    }

    /// Parse a bundle from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, StixError> {
        serde_json::from_slice(bytes).map_err(|e| StixError::SerializationError(e.to_string()))
    }

    /// Serialize to compact JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, StixError> {
        serde_json::to_vec(self).map_err(|e| StixError::SerializationError(e.to_string()))
    }

    /// Serialize to indented JSON bytes.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, StixError> {
        serde_json::to_vec_pretty(self).map_err(|e| StixError::SerializationError(e.to_string()))
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Find the first object carrying the given identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&StixObject> {
        self.objects.iter().find(|object| object.id == id)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in stixgraph.
///
/// Engine operations (`rewrite`, `split`) never fail as a whole; per-object
/// failures surface as `Diagnostic` values instead. `StixError` is returned
/// by the identifier generator and by parsing/IO helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StixError {
    /// No candidate identifying key set is fully present.
    #[error("Invalid identifying key for {object_type}: missing {}", .missing.join(", "))]
    InvalidKey {
        object_type: String,
        missing: Vec<String>,
    },

    /// The type has no identity rule.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// The identifier is not of the form `<type>--<token>`.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A configuration value could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// =============================================================================
// DIAGNOSTICS
// =============================================================================

/// How loud a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A non-fatal, per-object finding reported alongside an operation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The object lacks every candidate identifying key; its id was kept.
    InvalidKey {
        object_id: String,
        object_type: String,
        missing: Vec<String>,
    },

    /// A reference had no entry in the identity map and was passed through.
    UnresolvedReference {
        object_id: String,
        field: String,
        reference: String,
    },

    /// The object, or the reference group it belongs to, alone exceeds the
    /// chunk byte budget. `object_id` names the largest member, `objects`
    /// counts the group and `size` is the size of the whole group.
    OversizedObject {
        object_id: String,
        objects: usize,
        size: usize,
        limit: usize,
    },
}

impl Diagnostic {
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::InvalidKey { .. } => Severity::Error,
            Self::OversizedObject { .. } => Severity::Warning,
            Self::UnresolvedReference { .. } => Severity::Info,
        }
    }

    /// The object the diagnostic is about.
    #[must_use]
    pub fn object_id(&self) -> &str {
        match self {
            Self::InvalidKey { object_id, .. }
            | Self::UnresolvedReference { object_id, .. }
            | Self::OversizedObject { object_id, .. } => object_id,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey {
                object_id,
                object_type,
                missing,
            } => write!(
                f,
                "{object_id}: no identifying key for {object_type} (missing {})",
                missing.join(", ")
            ),
            Self::UnresolvedReference {
                object_id,
                field,
                reference,
            } => write!(f, "{object_id}: {field} -> {reference} left unchanged"),
            Self::OversizedObject {
                object_id,
                objects: 1,
                size,
                limit,
            } => write!(
                f,
                "{object_id}: {size} bytes exceeds chunk budget of {limit} bytes"
            ),
            Self::OversizedObject {
                object_id,
                objects,
                size,
                limit,
            } => write!(
                f,
                "{object_id}: reference group of {objects} objects totals {size} bytes, \
                 exceeds chunk budget of {limit} bytes"
            ),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_id_splits_on_first_separator() {
        let (object_type, token) =
            parse_id("malware--d650c5b9-4b43-5781-8576-ea52bd6c7ce5").expect("parse");
        assert_eq!(object_type, "malware");
        assert_eq!(token, "d650c5b9-4b43-5781-8576-ea52bd6c7ce5");
    }

    #[test]
    fn parse_id_rejects_malformed() {
        assert!(parse_id("malware").is_err());
        assert!(parse_id("--token").is_err());
        assert!(parse_id("malware--").is_err());
    }

    #[test]
    fn lineage_is_duplicate_free() {
        let mut lineage = Lineage::new();
        assert!(lineage.push("a--1"));
        assert!(lineage.push("a--2"));
        assert!(!lineage.push("a--1"));
        assert_eq!(lineage.iter().collect::<Vec<_>>(), vec!["a--1", "a--2"]);
    }

    #[test]
    fn lineage_round_trips_through_object() {
        let mut object = StixObject::new("malware", "malware--1");
        assert!(object.lineage().is_empty());

        object.set_lineage(["malware--0", "malware--0", "malware--9"].into_iter().collect());
        assert_eq!(
            object.property(LINEAGE_FIELD),
            Some(&json!(["malware--0", "malware--9"]))
        );

        object.set_lineage(Lineage::new());
        assert!(object.property(LINEAGE_FIELD).is_none());
    }

    #[test]
    fn object_serializes_flat() {
        let object = StixObject::new("malware", "malware--1").with("name", "X");
        let value = serde_json::to_value(&object).expect("serialize");
        assert_eq!(
            value,
            json!({"type": "malware", "id": "malware--1", "name": "X"})
        );
    }

    #[test]
    fn bundle_defaults_missing_objects() {
        let bundle = Bundle::from_json(br#"{"type":"bundle","id":"bundle--1"}"#).expect("parse");
        assert!(bundle.is_empty());
        assert_eq!(bundle.bundle_type, "bundle");
    }

    #[test]
    fn bundle_keeps_envelope_properties() {
        let raw = br#"{"type":"bundle","id":"bundle--1","spec_version":"2.1","objects":[]}"#;
        let bundle = Bundle::from_json(raw).expect("parse");
        assert_eq!(bundle.properties.get("spec_version"), Some(&json!("2.1")));
    }

    #[test]
    fn oversized_message_distinguishes_groups() {
        let single = Diagnostic::OversizedObject {
            object_id: "malware--b".to_string(),
            objects: 1,
            size: 300,
            limit: 64,
        };
        let group = Diagnostic::OversizedObject {
            object_id: "malware--b".to_string(),
            objects: 2,
            size: 300,
            limit: 64,
        };

        assert_eq!(
            single.to_string(),
            "malware--b: 300 bytes exceeds chunk budget of 64 bytes"
        );
        assert_eq!(
            group.to_string(),
            "malware--b: reference group of 2 objects totals 300 bytes, exceeds chunk budget of 64 bytes"
        );
        assert_eq!(group.severity(), Severity::Warning);
    }

    #[test]
    fn invalid_key_message_lists_fields() {
        let err = StixError::InvalidKey {
            object_type: "report".to_string(),
            missing: vec!["name".to_string(), "published".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid identifying key for report: missing name, published"
        );
    }

    #[test]
    fn diagnostic_severity_ordering() {
        let invalid = Diagnostic::InvalidKey {
            object_id: "report--1".to_string(),
            object_type: "report".to_string(),
            missing: vec![],
        };
        let unresolved = Diagnostic::UnresolvedReference {
            object_id: "relationship--1".to_string(),
            field: "target_ref".to_string(),
            reference: "malware--2".to_string(),
        };
        assert!(invalid.severity() > unresolved.severity());
        assert_eq!(unresolved.object_id(), "relationship--1");
    }
}
