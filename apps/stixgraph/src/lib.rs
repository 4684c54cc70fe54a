//! # stixgraph
//!
//! Command-line front end for stixgraph-core.
//!
//! - `cli` parses arguments and runs commands against bundle files
//! - `config` loads the optional `stixgraph.toml`

pub mod cli;
pub mod config;
