//! # Identity Rule Table
//!
//! One declarative table: type name -> ordered identifying key sets -> field
//! normalizers. The generator in the parent module is the only consumer.
//!
//! Key sets are tried in order and the first fully present one wins, so the
//! order encodes priority (a catalog key such as `x_mitre_id` before a
//! free-text `name`, a timestamped key before its untimestamped fallback).

use crate::primitives::{DOMAIN_OBJECT_NAMESPACE, RELATIONSHIP_NAMESPACE};
use serde_json::{Map, Value};
use uuid::Uuid;

// =============================================================================
// BUILDING BLOCKS
// =============================================================================

/// Hashing root of an object family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    DomainObject,
    Relationship,
}

impl Family {
    #[must_use]
    pub const fn namespace(self) -> Uuid {
        match self {
            Self::DomainObject => DOMAIN_OBJECT_NAMESPACE,
            Self::Relationship => RELATIONSHIP_NAMESPACE,
        }
    }
}

/// Normalization applied to a field value before canonicalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalizer {
    /// Keep the value as-is.
    Verbatim,
    /// Case-fold and trim free text.
    LowerTrim,
    /// Case-fold a vocabulary value.
    Lower,
    /// Trim surrounding whitespace.
    Trim,
    /// Keep a coordinate as a floating value; numeric strings are parsed.
    Coordinate,
}

/// One field of a key set.
#[derive(Debug, Clone, Copy)]
pub struct KeyField {
    /// Property name read from the object.
    pub source: &'static str,
    /// Key written into the canonical mapping.
    pub canonical: &'static str,
    pub normalizer: Normalizer,
    /// Value used when the property is absent.
    pub default: Option<&'static str>,
}

const fn field(name: &'static str) -> KeyField {
    KeyField {
        source: name,
        canonical: name,
        normalizer: Normalizer::Verbatim,
        default: None,
    }
}

const fn normalized(name: &'static str, normalizer: Normalizer) -> KeyField {
    KeyField {
        source: name,
        canonical: name,
        normalizer,
        default: None,
    }
}

const fn renamed(source: &'static str, canonical: &'static str) -> KeyField {
    KeyField {
        source,
        canonical,
        normalizer: Normalizer::Verbatim,
        default: None,
    }
}

const fn with_default(field: KeyField, default: &'static str) -> KeyField {
    KeyField {
        default: Some(default),
        ..field
    }
}

const NAME: KeyField = normalized("name", Normalizer::LowerTrim);
const CREATED: KeyField = field("created");

/// A property that must hold an exact value for a rule to apply.
#[derive(Debug, Clone, Copy)]
pub struct Guard {
    pub field: &'static str,
    pub equals: &'static str,
}

impl Guard {
    fn matches(&self, fields: &Map<String, Value>) -> bool {
        fields.get(self.field).and_then(Value::as_str) == Some(self.equals)
    }
}

/// Identity rule for one or more types.
#[derive(Debug, Clone, Copy)]
pub struct IdentityRule {
    pub types: &'static [&'static str],
    pub family: Family,
    pub guard: Option<Guard>,
    pub key_sets: &'static [&'static [KeyField]],
}

// =============================================================================
// THE TABLE
// =============================================================================

const NAMED_TYPES: &[&str] = &[
    "campaign",
    "channel",
    "data-component",
    "data-source",
    "event",
    "infrastructure",
    "intrusion-set",
    "language",
    "malware",
    "narrative",
    "tool",
    "vulnerability",
];

const CASE_TYPES: &[&str] = &["incident", "case-incident", "case-rfi", "case-rft", "task"];

/// Every identity rule, scanned in order. Guarded rules precede the
/// unguarded rule for the same type.
pub static RULES: &[IdentityRule] = &[
    IdentityRule {
        types: NAMED_TYPES,
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[NAME]],
    },
    IdentityRule {
        types: &["attack-pattern", "course-of-action"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[field("x_mitre_id")], &[NAME]],
    },
    IdentityRule {
        types: &["identity"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[NAME, normalized("identity_class", Normalizer::Lower)]],
    },
    IdentityRule {
        types: &["location"],
        family: Family::DomainObject,
        guard: Some(Guard {
            field: "x_opencti_location_type",
            equals: "Position",
        }),
        key_sets: &[
            &[
                normalized("latitude", Normalizer::Coordinate),
                normalized("longitude", Normalizer::Coordinate),
            ],
            &[normalized("latitude", Normalizer::Coordinate)],
            &[normalized("longitude", Normalizer::Coordinate)],
            &[NAME],
        ],
    },
    IdentityRule {
        types: &["location"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[NAME, field("x_opencti_location_type")]],
    },
    IdentityRule {
        types: &["threat-actor"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[
            NAME,
            with_default(
                renamed("x_opencti_type", "opencti_type"),
                "Threat-Actor-Group",
            ),
        ]],
    },
    IdentityRule {
        types: &["note"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[field("content"), CREATED], &[field("content")]],
    },
    IdentityRule {
        types: &["opinion"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[field("opinion"), CREATED], &[field("opinion")]],
    },
    IdentityRule {
        types: &["report"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[NAME, field("published")]],
    },
    IdentityRule {
        types: CASE_TYPES,
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[NAME, CREATED], &[NAME]],
    },
    IdentityRule {
        types: &["grouping"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[NAME, field("context")]],
    },
    IdentityRule {
        types: &["malware-analysis"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[
            &[
                normalized("result_name", Normalizer::LowerTrim),
                field("product"),
                field("submitted"),
            ],
            &[
                normalized("result_name", Normalizer::LowerTrim),
                field("product"),
            ],
        ],
    },
    IdentityRule {
        types: &["vocabulary"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[NAME, field("category")]],
    },
    IdentityRule {
        types: &["indicator"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[normalized("pattern", Normalizer::Trim)]],
    },
    IdentityRule {
        types: &["observed-data"],
        family: Family::DomainObject,
        guard: None,
        key_sets: &[&[renamed("object_refs", "objects")]],
    },
    IdentityRule {
        types: &["relationship"],
        family: Family::Relationship,
        guard: None,
        key_sets: &[
            &[
                field("relationship_type"),
                field("source_ref"),
                field("target_ref"),
                field("start_time"),
                field("stop_time"),
            ],
            &[
                field("relationship_type"),
                field("source_ref"),
                field("target_ref"),
            ],
        ],
    },
    IdentityRule {
        types: &["sighting"],
        family: Family::Relationship,
        guard: None,
        key_sets: &[
            &[
                field("sighting_of_ref"),
                field("where_sighted_refs"),
                field("first_seen"),
                field("last_seen"),
            ],
            &[field("sighting_of_ref"), field("where_sighted_refs")],
        ],
    },
];

// =============================================================================
// LOOKUP
// =============================================================================

/// Find the rule governing an object of the given type and properties.
#[must_use]
pub fn rule_for(object_type: &str, fields: &Map<String, Value>) -> Option<&'static IdentityRule> {
    RULES.iter().find(|rule| {
        rule.types.contains(&object_type) && rule.guard.is_none_or(|guard| guard.matches(fields))
    })
}

/// Whether any rule covers the type.
#[must_use]
pub fn is_supported(object_type: &str) -> bool {
    RULES.iter().any(|rule| rule.types.contains(&object_type))
}

/// Every type covered by the table, sorted and deduplicated.
#[must_use]
pub fn supported_types() -> Vec<&'static str> {
    let mut types: Vec<&'static str> = RULES
        .iter()
        .flat_map(|rule| rule.types.iter().copied())
        .collect();
    types.sort_unstable();
    types.dedup();
    types
}

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

    #[test]
    fn position_guard_selects_coordinate_rule() {
        let position = props(json!({"x_opencti_location_type": "Position"}));
        let city = props(json!({"x_opencti_location_type": "City"}));

        let rule = rule_for("location", &position).expect("rule");
        assert_eq!(rule.key_sets.len(), 4);

        let rule = rule_for("location", &city).expect("rule");
        assert_eq!(rule.key_sets.len(), 1);
    }

    #[test]
    fn relationship_types_use_relationship_family() {
        let empty = Map::new();
        for object_type in ["relationship", "sighting"] {
            let rule = rule_for(object_type, &empty).expect("rule");
            assert_eq!(rule.family, Family::Relationship);
        }
        let rule = rule_for("malware", &empty).expect("rule");
        assert_eq!(rule.family, Family::DomainObject);
    }

    #[test]
    fn unknown_types_have_no_rule() {
        assert!(rule_for("marking-definition", &Map::new()).is_none());
        assert!(!is_supported("ipv4-addr"));
    }

    #[test]
    fn supported_types_are_unique() {
        let types = supported_types();
        assert!(types.contains(&"malware"));
        assert!(types.contains(&"sighting"));
        assert_eq!(types.iter().filter(|t| **t == "location").count(), 1);
    }
}
