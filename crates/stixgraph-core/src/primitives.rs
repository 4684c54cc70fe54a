//! # Compiled-In Primitives
//!
//! Fixed constants of the stixgraph wire contract.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! The namespace UUIDs are the hashing roots of every derived identifier:
//! changing one of them changes every identifier of its family and is a
//! breaking wire-format change.

use uuid::{Uuid, uuid};

// =============================================================================
// HASHING NAMESPACES
// =============================================================================

/// Namespace of domain objects identified by name, content or catalog key.
pub const DOMAIN_OBJECT_NAMESPACE: Uuid = uuid!("00abedb4-aa42-466c-9c01-fed23315a9b7");

/// Namespace of relationship-shaped objects (`relationship`, `sighting`).
pub const RELATIONSHIP_NAMESPACE: Uuid = uuid!("b639ff3b-00eb-42ed-aa36-a8dd6f8fb4cf");

// =============================================================================
// OBJECT MODEL
// =============================================================================

/// Separator between the type and the token of an identifier.
pub const ID_SEPARATOR: &str = "--";

/// Extension field holding the previous identifiers of an object.
pub const LINEAGE_FIELD: &str = "x_opencti_stix_ids";

/// Suffix of single-valued reference fields.
pub const REF_SUFFIX: &str = "_ref";

/// Suffix of list-valued reference fields.
pub const REFS_SUFFIX: &str = "_refs";

/// Type discriminator of the bundle envelope.
pub const BUNDLE_TYPE: &str = "bundle";

/// Envelope field carrying a chunk's 1-based position in a split sequence.
pub const CHUNK_SEQUENCE_FIELD: &str = "x_opencti_seq";

// =============================================================================
// SPLIT LIMITS
// =============================================================================

/// Default maximum number of objects per chunk.
pub const DEFAULT_MAX_OBJECTS_PER_CHUNK: usize = 500;

/// Default maximum canonical byte size per chunk (5 MiB).
pub const DEFAULT_MAX_BYTES_PER_CHUNK: usize = 5 * 1024 * 1024;
