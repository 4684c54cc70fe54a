//! # stixgraph CLI Module
//!
//! This module implements the CLI interface for stixgraph.
//!
//! ## Available Commands
//!
//! - `id` - Compute the canonical identifier of a type and its properties
//! - `rewrite` - Re-identify every object of a bundle
//! - `split` - Split a bundle into dependency-ordered chunk files
//! - `inspect` - Summarize a bundle

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stixgraph_core::StixError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// stixgraph - deterministic STIX bundle identity and ordering
///
/// Derives content-based identifiers, rewrites bundles to use them and
/// splits bundles into chunks that can be imported in order.
#[derive(Parser, Debug)]
#[command(name = "stixgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress summary output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file (default: ./stixgraph.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the canonical identifier for a type and its properties
    Id {
        /// Object type (e.g. malware, location, relationship)
        #[arg(short = 't', long = "type")]
        object_type: String,

        /// Properties as a JSON object
        #[arg(short, long)]
        fields: String,
    },

    /// Rewrite every object of a bundle to its canonical identifier
    Rewrite {
        /// Input bundle file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Record replaced identifiers in x_opencti_stix_ids
        /// (`--keep-lineage=false` overrides the config file)
        #[arg(short, long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
        keep_lineage: Option<bool>,
    },

    /// Split a bundle into dependency-ordered chunk files
    Split {
        /// Input bundle file
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving chunk-0001.json, chunk-0002.json, ...
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Maximum number of objects per chunk
        #[arg(long)]
        max_objects: Option<usize>,

        /// Maximum canonical byte size per chunk
        #[arg(long)]
        max_bytes: Option<usize>,

        /// Rewrite identifiers before splitting
        #[arg(short, long)]
        rewrite: bool,

        /// Record replaced identifiers when rewriting
        /// (`--keep-lineage=false` overrides the config file)
        #[arg(short, long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
        keep_lineage: Option<bool>,
    },

    /// Show object counts and unresolved references of a bundle
    Inspect {
        /// Input bundle file
        #[arg(short, long)]
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), StixError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Id {
            object_type,
            fields,
        } => cmd_id(&object_type, &fields),
        Commands::Rewrite {
            input,
            output,
            keep_lineage,
        } => cmd_rewrite(
            &input,
            output.as_deref(),
            config.rewrite_options(keep_lineage),
            quiet,
        ),
        Commands::Split {
            input,
            output_dir,
            max_objects,
            max_bytes,
            rewrite,
            keep_lineage,
        } => {
            let rewrite_options = rewrite.then(|| config.rewrite_options(keep_lineage));
            cmd_split(
                &input,
                &output_dir,
                config.split_options(max_objects, max_bytes),
                rewrite_options,
                quiet,
            )
        }
        Commands::Inspect { input, json } => cmd_inspect(&input, json),
    }
}
