//! # Configuration
//!
//! Optional TOML configuration for the engine options.
//!
//! ```toml
//! [rewrite]
//! keep_lineage = true
//!
//! [split]
//! max_objects_per_chunk = 500
//! max_bytes_per_chunk = 5242880
//! ```
//!
//! Command-line flags override file values. Absent values fall back to the
//! engine defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use stixgraph_core::{RewriteOptions, SplitOptions, StixError};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "stixgraph.toml";

/// `[rewrite]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteSection {
    pub keep_lineage: Option<bool>,
}

/// `[split]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitSection {
    pub max_objects_per_chunk: Option<usize>,
    pub max_bytes_per_chunk: Option<usize>,
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub rewrite: RewriteSection,
    pub split: SplitSection,
}

impl AppConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, StixError> {
        toml::from_str(contents).map_err(|e| StixError::ConfigError(e.to_string()))
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one, `stixgraph.toml` in the
    /// working directory is used when present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, StixError> {
        let path: PathBuf = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            StixError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&contents).map_err(|e| {
            StixError::ConfigError(format!("failed to parse {}: {e}", path.display()))
        })?;

        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Rewrite options; an explicit `keep_lineage` flag wins over the file.
    #[must_use]
    pub fn rewrite_options(&self, keep_lineage: Option<bool>) -> RewriteOptions {
        RewriteOptions::keep_lineage(
            keep_lineage
                .or(self.rewrite.keep_lineage)
                .unwrap_or_default(),
        )
    }

    /// Split options; flags take precedence over file values.
    #[must_use]
    pub fn split_options(&self, max_objects: Option<usize>, max_bytes: Option<usize>) -> SplitOptions {
        let defaults = SplitOptions::default();
        SplitOptions::new(
            max_objects
                .or(self.split.max_objects_per_chunk)
                .unwrap_or(defaults.max_objects_per_chunk),
            max_bytes
                .or(self.split.max_bytes_per_chunk)
                .unwrap_or(defaults.max_bytes_per_chunk),
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_engine_defaults() {
        let config = AppConfig::from_toml("").expect("parse");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.split_options(None, None), SplitOptions::default());
        assert!(!config.rewrite_options(None).keep_lineage);
    }

    #[test]
    fn file_values_are_read() {
        let config = AppConfig::from_toml(
            "[rewrite]\nkeep_lineage = true\n\n[split]\nmax_objects_per_chunk = 20\n",
        )
        .expect("parse");

        assert!(config.rewrite_options(None).keep_lineage);
        let split = config.split_options(None, None);
        assert_eq!(split.max_objects_per_chunk, 20);
        assert_eq!(
            split.max_bytes_per_chunk,
            SplitOptions::default().max_bytes_per_chunk
        );
    }

    #[test]
    fn flags_override_file_values() {
        let config = AppConfig::from_toml("[split]\nmax_objects_per_chunk = 20\nmax_bytes_per_chunk = 10\n")
            .expect("parse");
        assert_eq!(config.split_options(Some(3), None), SplitOptions::new(3, 10));
    }

    #[test]
    fn lineage_flag_overrides_file_both_ways() {
        let on = AppConfig::from_toml("[rewrite]\nkeep_lineage = true\n").expect("parse");
        assert!(!on.rewrite_options(Some(false)).keep_lineage);
        assert!(on.rewrite_options(None).keep_lineage);

        let off = AppConfig::default();
        assert!(off.rewrite_options(Some(true)).keep_lineage);
    }

    #[test]
    fn parse_errors_are_reported_once() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("stixgraph.toml");
        std::fs::write(&path, "[split]\nmax_objects_per_chunk = \"many\"\n").expect("write");

        let message = AppConfig::load(Some(&path)).expect_err("invalid").to_string();
        assert!(message.starts_with("Configuration error: failed to parse"));
        assert_eq!(message.matches("Configuration error").count(), 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AppConfig::from_toml("[split]\nmax_chunk = 1\n").expect_err("unknown key");
        assert!(matches!(err, StixError::ConfigError(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/stixgraph.toml")));
        assert!(matches!(result, Err(StixError::ConfigError(_))));
    }
}
