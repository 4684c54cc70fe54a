//! # Bundle Identity Rewriter
//!
//! Re-identifies every object of a bundle with its canonical identifier and
//! propagates the changes through every reference field.
//!
//! - Pass 1 (compute): each object's new identifier is generated from its
//!   own **pre-rewrite** properties, reference values included. A failure
//!   keeps the original identifier and records no mapping.
//! - Pass 2 (propagate): every reference is substituted through the
//!   identity map; unknown identifiers pass through unchanged.
//!
//! This is deliberately a single pass. An object whose key includes a
//! reference (a relationship's endpoints, an observed-data member list)
//! hashes the reference as it was in the input, never the identifier assigned
//! to the target in the same call. Iterating to a fixed point would change
//! the identifiers other implementations derive for the same input.

use crate::identity::generate_id_for;
use crate::references::map_references;
use crate::types::{Bundle, Diagnostic, StixError, StixObject};
use std::collections::BTreeMap;

// =============================================================================
// OPTIONS
// =============================================================================

/// Options of a rewrite call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Record replaced identifiers in `x_opencti_stix_ids`. Default: `false`,
    /// which clears that field on every re-identified object.
    pub keep_lineage: bool,
}

impl RewriteOptions {
    #[must_use]
    pub fn keep_lineage(keep_lineage: bool) -> Self {
        Self { keep_lineage }
    }
}

// =============================================================================
// IDENTITY MAP
// =============================================================================

/// Mapping old identifier -> new identifier, local to one rewrite call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    entries: BTreeMap<String, String>,
}

impl IdentityMap {
    /// Record a mapping. The first mapping recorded for an identifier wins.
    /// Returns `false` when the identifier was already mapped.
    fn insert(&mut self, old_id: &str, new_id: &str) -> bool {
        if self.entries.contains_key(old_id) {
            return false;
        }
        self.entries.insert(old_id.to_string(), new_id.to_string());
        true
    }

    /// The new identifier for an old one.
    #[must_use]
    pub fn get(&self, old_id: &str) -> Option<&str> {
        self.entries.get(old_id).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All mappings, sorted by old identifier.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(old, new)| (old.as_str(), new.as_str()))
    }

    /// Only the mappings that change the identifier.
    pub fn changed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(old, new)| old != new)
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Result of a rewrite call.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// The rewritten bundle (a new value; the input is untouched).
    pub bundle: Bundle,
    /// Every mapping computed in pass 1.
    pub identity_map: IdentityMap,
    /// Per-object findings.
    pub diagnostics: Vec<Diagnostic>,
}

impl RewriteOutcome {
    /// Number of objects whose identifier changed.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.identity_map.changed().count()
    }
}

// =============================================================================
// REWRITER
// =============================================================================

/// Rewrites a bundle's identifiers to their canonical form.
#[derive(Debug, Clone, Default)]
pub struct BundleRewriter {
    options: RewriteOptions,
}

impl BundleRewriter {
    #[must_use]
    pub fn new(options: RewriteOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> RewriteOptions {
        self.options
    }

    /// Rewrite a bundle. Never fails; see the outcome's diagnostics.
    #[must_use]
    pub fn rewrite(&self, bundle: &Bundle) -> RewriteOutcome {
        let mut diagnostics = Vec::new();
        let (identity_map, assigned) = Self::compute(bundle, &mut diagnostics);

        let objects: Vec<StixObject> = bundle
            .objects
            .iter()
            .zip(assigned)
            .map(|(object, new_id)| {
                self.propagate(object, new_id, &identity_map, &mut diagnostics)
            })
            .collect();

        tracing::debug!(
            bundle = %bundle.id,
            objects = objects.len(),
            mapped = identity_map.len(),
            changed = identity_map.changed().count(),
            diagnostics = diagnostics.len(),
            "bundle rewritten"
        );

        RewriteOutcome {
            bundle: bundle.with_objects(objects),
            identity_map,
            diagnostics,
        }
    }

    /// Pass 1: generate every object's identifier from its input properties.
    fn compute(
        bundle: &Bundle,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> (IdentityMap, Vec<Option<String>>) {
        let mut identity_map = IdentityMap::default();
        let mut assigned = Vec::with_capacity(bundle.objects.len());

        for object in &bundle.objects {
            match generate_id_for(object) {
                Ok(new_id) => {
                    if !identity_map.insert(&object.id, &new_id) {
                        tracing::warn!(
                            id = %object.id,
                            "identifier appears more than once; references follow its first occurrence"
                        );
                    }
                    assigned.push(Some(new_id));
                }
                Err(StixError::InvalidKey {
                    object_type,
                    missing,
                }) => {
                    diagnostics.push(Diagnostic::InvalidKey {
                        object_id: object.id.clone(),
                        object_type,
                        missing,
                    });
                    assigned.push(None);
                }
                Err(err) => {
                    tracing::trace!(id = %object.id, error = %err, "kept as-is");
                    assigned.push(None);
                }
            }
        }

        (identity_map, assigned)
    }

    /// Pass 2: substitute references and apply the object's own new id.
    fn propagate(
        &self,
        object: &StixObject,
        new_id: Option<String>,
        identity_map: &IdentityMap,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> StixObject {
        let mut rewritten = map_references(object, |field, target| match identity_map.get(target) {
            Some(mapped) => Some(mapped.to_string()),
            None => {
                diagnostics.push(Diagnostic::UnresolvedReference {
                    object_id: object.id.clone(),
                    field: field.to_string(),
                    reference: target.to_string(),
                });
                None
            }
        });

        let Some(new_id) = new_id else {
            return rewritten;
        };
        if new_id == object.id {
            return rewritten;
        }

        if self.options.keep_lineage {
            let mut lineage = object.lineage();
            lineage.push(&object.id);
            rewritten.set_lineage(lineage);
        } else {
            rewritten.set_lineage(Default::default());
        }
        rewritten.id = new_id;
        rewritten
    }
}

/// Rewrite a bundle with the given lineage policy.
#[must_use]
pub fn rewrite(bundle: &Bundle, keep_lineage: bool) -> RewriteOutcome {
    BundleRewriter::new(RewriteOptions::keep_lineage(keep_lineage)).rewrite(bundle)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::generate_id;
    use crate::primitives::LINEAGE_FIELD;
    use serde_json::{Map, Value, json};

    fn malware(id: &str, name: &str) -> StixObject {
        StixObject::new("malware", id).with("name", name)
    }

    fn uses(id: &str, source: &str, target: &str) -> StixObject {
        StixObject::new("relationship", id)
            .with("relationship_type", "uses")
            .with("source_ref", source)
            .with("target_ref", target)
    }

    fn expected_id(object_type: &str, fields: Value) -> String {
        let fields: Map<String, Value> = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        generate_id(object_type, &fields).expect("generate")
    }

    #[test]
    fn rewrites_id_and_records_lineage() {
        let bundle = Bundle::new(
            "bundle--1",
            vec![malware("malware--d650c5b9-4b43-5781-8576-ea52bd6c7ce5", "X")],
        );

        let outcome = rewrite(&bundle, true);
        let object = &outcome.bundle.objects[0];

        assert_eq!(object.id, expected_id("malware", json!({"name": "X"})));
        assert_eq!(
            object.property(LINEAGE_FIELD),
            Some(&json!(["malware--d650c5b9-4b43-5781-8576-ea52bd6c7ce5"]))
        );
        assert_eq!(outcome.changed_count(), 1);
    }

    #[test]
    fn lineage_is_cleared_when_not_kept() {
        let bundle = Bundle::new(
            "bundle--1",
            vec![malware("malware--old", "X").with(LINEAGE_FIELD, json!(["malware--older"]))],
        );

        let outcome = rewrite(&bundle, false);
        assert!(outcome.bundle.objects[0].property(LINEAGE_FIELD).is_none());
    }

    #[test]
    fn unchanged_objects_keep_their_lineage() {
        let id = expected_id("malware", json!({"name": "X"}));
        let bundle = Bundle::new(
            "bundle--1",
            vec![malware(&id, "X").with(LINEAGE_FIELD, json!(["malware--older"]))],
        );

        let outcome = rewrite(&bundle, false);
        assert_eq!(outcome.bundle.objects[0], bundle.objects[0]);
    }

    #[test]
    fn references_follow_rewritten_ids() {
        let bundle = Bundle::new(
            "bundle--1",
            vec![
                malware("malware--a", "emotet"),
                uses("relationship--r", "malware--a", "tool--external"),
            ],
        );

        let outcome = rewrite(&bundle, false);
        let new_malware = &outcome.bundle.objects[0].id;
        let relationship = &outcome.bundle.objects[1];

        assert_eq!(relationship.property("source_ref"), Some(&json!(new_malware)));
        assert_eq!(relationship.property("target_ref"), Some(&json!("tool--external")));
        assert!(outcome.diagnostics.contains(&Diagnostic::UnresolvedReference {
            object_id: "relationship--r".to_string(),
            field: "target_ref".to_string(),
            reference: "tool--external".to_string(),
        }));
    }

    #[test]
    fn relationship_id_uses_pre_rewrite_endpoints() {
        let bundle = Bundle::new(
            "bundle--1",
            vec![
                malware("malware--a", "emotet"),
                uses("relationship--r", "malware--a", "tool--b"),
            ],
        );

        let outcome = rewrite(&bundle, false);
        let expected = expected_id(
            "relationship",
            json!({
                "relationship_type": "uses",
                "source_ref": "malware--a",
                "target_ref": "tool--b",
            }),
        );
        assert_eq!(outcome.bundle.objects[1].id, expected);
    }

    #[test]
    fn invalid_key_keeps_id_and_reports() {
        let bundle = Bundle::new(
            "bundle--1",
            vec![
                StixObject::new("report", "report--1").with("name", "Report"),
                uses("relationship--r", "report--1", "malware--x"),
            ],
        );

        let outcome = rewrite(&bundle, true);
        assert_eq!(outcome.bundle.objects[0].id, "report--1");
        assert!(outcome.bundle.objects[0].property(LINEAGE_FIELD).is_none());
        assert_eq!(
            outcome.bundle.objects[1].property("source_ref"),
            Some(&json!("report--1"))
        );
        assert!(matches!(
            outcome.diagnostics.first(),
            Some(Diagnostic::InvalidKey { object_id, missing, .. })
                if object_id == "report--1" && missing == &vec!["published".to_string()]
        ));
    }

    #[test]
    fn unsupported_types_pass_through() {
        let marking = StixObject::new("marking-definition", "marking-definition--m")
            .with("definition_type", "tlp");
        let bundle = Bundle::new("bundle--1", vec![marking.clone()]);

        let outcome = rewrite(&bundle, true);
        assert_eq!(outcome.bundle.objects, vec![marking]);
        assert!(outcome.identity_map.is_empty());
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn input_bundle_is_not_mutated() {
        let bundle = Bundle::new(
            "bundle--1",
            vec![
                malware("malware--a", "emotet"),
                uses("relationship--r", "malware--a", "tool--b"),
            ],
        );
        let snapshot = bundle.clone();

        let _ = rewrite(&bundle, true);
        assert_eq!(bundle, snapshot);
    }

    #[test]
    fn second_rewrite_unions_lineage() {
        let bundle = Bundle::new(
            "bundle--1",
            vec![
                malware("malware--a", "emotet"),
                uses("relationship--r", "malware--a", "tool--b"),
            ],
        );

        let first = rewrite(&bundle, true).bundle;
        let second = rewrite(&first, true).bundle;

        // The malware id is stable, so its lineage does not grow.
        assert_eq!(second.objects[0].lineage(), first.objects[0].lineage());

        // The relationship now hashes its rewritten source, so it moves again
        // and keeps both previous identifiers in first-seen order.
        let lineage = second.objects[1].lineage();
        let actual: Vec<&str> = lineage.iter().collect();
        assert_eq!(actual, vec!["relationship--r", first.objects[1].id.as_str()]);
    }

    #[test]
    fn envelope_is_preserved() {
        let mut bundle = Bundle::new("bundle--env", vec![malware("malware--a", "x")]);
        bundle
            .properties
            .insert("spec_version".to_string(), json!("2.1"));

        let outcome = rewrite(&bundle, false);
        assert_eq!(outcome.bundle.id, "bundle--env");
        assert_eq!(
            outcome.bundle.properties.get("spec_version"),
            Some(&json!("2.1"))
        );
    }
}
