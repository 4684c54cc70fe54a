//! # stixgraph-core
//!
//! The deterministic bundle engine for stixgraph.
//!
//! This crate turns STIX 2.1 bundles into deterministic, order-safe payloads:
//! - `identity` derives content-based identifiers (UUIDv5 over a canonical
//!   encoding of each type's identifying properties)
//! - `rewrite` re-identifies every object of a bundle and follows the new
//!   identifiers through every reference field
//! - `split` partitions a bundle into size-bounded chunks in which every
//!   reference resolves to the same or an earlier chunk
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network, no filesystem
//! - Every operation takes its input by reference and returns a new value
//! - Malformed objects are reported as diagnostics; no operation aborts a
//!   whole bundle because of one object

// =============================================================================
// MODULES
// =============================================================================

pub mod canonical;
pub mod identity;
pub mod primitives;
pub mod references;
pub mod rewrite;
pub mod split;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{Bundle, Diagnostic, Lineage, Severity, StixError, StixObject, format_id, parse_id};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use identity::{Family, generate_id, generate_id_for, is_supported, supported_types};
pub use references::{Reference, collect_references, referenced_ids};
pub use rewrite::{BundleRewriter, IdentityMap, RewriteOptions, RewriteOutcome, rewrite};
pub use split::{BundleSplitter, Chunk, SplitOptions, SplitOutcome, split};
