//! # stixgraph
//!
//! The main binary for the stixgraph bundle engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │           apps/stixgraph (THE BINARY)         │
//! │                                               │
//! │   ┌─────────────┐        ┌───────────────┐    │
//! │   │   CLI       │        │    Config     │    │
//! │   │  (clap)     │        │   (toml)      │    │
//! │   └──────┬──────┘        └───────┬───────┘    │
//! │          └───────────┬───────────┘            │
//! │                      ▼                        │
//! │             ┌─────────────────┐               │
//! │             │ stixgraph-core  │               │
//! │             │  (THE LOGIC)    │               │
//! │             └─────────────────┘               │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! stixgraph id --type location --fields '{"name":"Lyon","x_opencti_location_type":"City"}'
//! stixgraph rewrite --input bundle.json --output rewritten.json --keep-lineage
//! stixgraph split --input bundle.json --output-dir chunks/ --max-objects 100 --rewrite
//! stixgraph inspect --input bundle.json
//! ```

use clap::Parser;
use stixgraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Logs go to stderr so bundle output on stdout stays clean.
    // STIXGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("STIXGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stixgraph=info,stixgraph_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
