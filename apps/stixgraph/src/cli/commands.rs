//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use stixgraph_core::{
    Bundle, BundleRewriter, BundleSplitter, Diagnostic, RewriteOptions, Severity, SplitOptions,
    StixError, collect_references, generate_id,
};

// =============================================================================
// FILE LIMITS
// =============================================================================

/// Maximum input bundle size (500 MB).
///
/// Bundles are parsed in memory; larger files are rejected before reading.
pub const MAX_BUNDLE_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), StixError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| StixError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(StixError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path and make sure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, StixError> {
    let canonical = path.canonicalize().map_err(|e| {
        StixError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(StixError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path whose parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, StixError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        StixError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(StixError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| StixError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read and parse a bundle file.
pub fn read_bundle(path: &Path) -> Result<Bundle, StixError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_BUNDLE_FILE_SIZE)?;

    let data = std::fs::read(&validated)
        .map_err(|e| StixError::IoError(format!("Read file: {}", e)))?;
    let bundle = Bundle::from_json(&data)?;

    tracing::info!(path = %validated.display(), objects = bundle.len(), "bundle loaded");
    Ok(bundle)
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), StixError> {
    std::fs::write(path, data)
        .map_err(|e| StixError::IoError(format!("Write file '{}': {}", path.display(), e)))
}

/// Log every diagnostic at a level matching its severity.
fn report_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.severity() {
            Severity::Error | Severity::Warning => tracing::warn!("{}", diagnostic),
            Severity::Info => tracing::debug!("{}", diagnostic),
        }
    }
}

// =============================================================================
// ID COMMAND
// =============================================================================

/// Print the canonical identifier of a type and its properties.
pub fn cmd_id(object_type: &str, fields: &str) -> Result<(), StixError> {
    let fields: Map<String, Value> = serde_json::from_str(fields)
        .map_err(|e| StixError::SerializationError(format!("--fields must be a JSON object: {}", e)))?;

    println!("{}", generate_id(object_type, &fields)?);
    Ok(())
}

// =============================================================================
// REWRITE COMMAND
// =============================================================================

/// Rewrite a bundle and write it to `output`, or stdout.
pub fn cmd_rewrite(
    input: &Path,
    output: Option<&Path>,
    options: RewriteOptions,
    quiet: bool,
) -> Result<(), StixError> {
    let validated_output = output.map(validate_output_path).transpose()?;
    let bundle = read_bundle(input)?;

    let outcome = BundleRewriter::new(options).rewrite(&bundle);
    report_diagnostics(&outcome.diagnostics);
    let data = outcome.bundle.to_json_pretty()?;

    match validated_output {
        Some(path) => {
            write_file(&path, &data)?;
            if !quiet {
                println!(
                    "Rewrote {} of {} objects ({} diagnostics) to {:?}",
                    outcome.changed_count(),
                    outcome.bundle.len(),
                    outcome.diagnostics.len(),
                    path
                );
            }
        }
        None => println!("{}", String::from_utf8_lossy(&data)),
    }

    Ok(())
}

// =============================================================================
// SPLIT COMMAND
// =============================================================================

/// File name of the chunk with the given 1-based sequence number.
#[must_use]
pub fn chunk_file_name(sequence: usize) -> String {
    format!("chunk-{:04}.json", sequence)
}

/// Split a bundle into chunk files, optionally rewriting it first.
pub fn cmd_split(
    input: &Path,
    output_dir: &Path,
    options: SplitOptions,
    rewrite: Option<RewriteOptions>,
    quiet: bool,
) -> Result<(), StixError> {
    let mut bundle = read_bundle(input)?;

    if let Some(rewrite_options) = rewrite {
        let outcome = BundleRewriter::new(rewrite_options).rewrite(&bundle);
        report_diagnostics(&outcome.diagnostics);
        bundle = outcome.bundle;
    }

    let outcome = BundleSplitter::new(options).split(&bundle);
    report_diagnostics(&outcome.diagnostics);

    std::fs::create_dir_all(output_dir).map_err(|e| {
        StixError::IoError(format!(
            "Create directory '{}': {}",
            output_dir.display(),
            e
        ))
    })?;

    for (idx, chunk_bundle) in outcome.bundles(&bundle).iter().enumerate() {
        let path = output_dir.join(chunk_file_name(idx + 1));
        write_file(&path, &chunk_bundle.to_json()?)?;
        tracing::debug!(path = %path.display(), objects = chunk_bundle.len(), "chunk written");
    }

    if !quiet {
        println!(
            "Split {} objects into {} chunks in {:?}",
            outcome.expectations(),
            outcome.chunks.len(),
            output_dir
        );
    }

    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// A reference whose target is not an object of the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingReference {
    pub object_id: String,
    pub field: String,
    pub target: String,
}

/// Summary of a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleReport {
    pub bundle_id: String,
    pub object_count: usize,
    pub type_counts: BTreeMap<String, usize>,
    pub duplicate_ids: Vec<String>,
    pub dangling_references: Vec<DanglingReference>,
}

/// Summarize a bundle.
#[must_use]
pub fn inspect(bundle: &Bundle) -> BundleReport {
    let mut ids: BTreeSet<&str> = BTreeSet::new();
    let mut duplicates: BTreeSet<String> = BTreeSet::new();
    let mut type_counts: BTreeMap<String, usize> = BTreeMap::new();

    for object in &bundle.objects {
        if !ids.insert(object.id.as_str()) {
            duplicates.insert(object.id.clone());
        }
        *type_counts.entry(object.object_type.clone()).or_default() += 1;
    }

    let dangling_references = bundle
        .objects
        .iter()
        .flat_map(|object| {
            collect_references(object)
                .into_iter()
                .map(move |reference| (object, reference))
        })
        .filter(|(_, reference)| !ids.contains(reference.target.as_str()))
        .map(|(object, reference)| DanglingReference {
            object_id: object.id.clone(),
            field: reference.field,
            target: reference.target,
        })
        .collect();

    BundleReport {
        bundle_id: bundle.id.clone(),
        object_count: bundle.len(),
        type_counts,
        duplicate_ids: duplicates.into_iter().collect(),
        dangling_references,
    }
}

/// Print a bundle summary, as text or as a JSON report.
pub fn cmd_inspect(input: &Path, json_mode: bool) -> Result<(), StixError> {
    let bundle = read_bundle(input)?;
    let report = inspect(&bundle);

    if json_mode {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| StixError::SerializationError(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    println!("Bundle {}", report.bundle_id);
    println!("==================");
    println!("Objects: {}", report.object_count);
    for (object_type, count) in &report.type_counts {
        println!("  {:<24} {}", object_type, count);
    }
    println!();
    println!("Duplicate ids:        {}", report.duplicate_ids.len());
    for id in &report.duplicate_ids {
        println!("  {}", id);
    }
    println!("Unresolved references: {}", report.dangling_references.len());
    for dangling in &report.dangling_references {
        println!(
            "  {} {} -> {}",
            dangling.object_id, dangling.field, dangling.target
        );
    }

    Ok(())
}
