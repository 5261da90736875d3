// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for casetrace.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.casetrace/config.json or config.yaml
//! - Workspace config: .casetrace.json, .casetrace.yaml, or .casetrace/config.json
//! - Explicit file: passed on the command line
//!
//! Configuration is merged with precedence (explicit > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    find_workspace_root, get_global_config_dir, load_config_file, load_global_config,
    load_workspace_config, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILES,
};

pub use merger::{default_config, merge_config, validate};

pub use types::{
    LayerConfigPartial, ObservabilityConfig, ResolvedConfig, ResolvedTelemetry, TelemetrySettings,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a workspace.
///
/// This is the main entry point for configuration loading.
pub fn load_config(workspace_root: &Path, explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;
    let explicit = explicit.map(load_config_file).transpose()?;

    merge_config(global, workspace, explicit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_no_files() {
        let temp = TempDir::new().unwrap();
        // A global config on the host may add overrides; defaults still validate.
        assert!(load_config(temp.path(), None).is_ok());
    }

    #[test]
    fn test_load_config_explicit_wins() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".casetrace.json"),
            r#"{"performanceThresholds": {"service": 0.8}}"#,
        )
        .unwrap();
        let explicit = temp.path().join("override.yaml");
        std::fs::write(&explicit, "performanceThresholds:\n  service: 0.9\n").unwrap();

        let config = load_config(temp.path(), Some(&explicit)).unwrap();
        assert_eq!(config.performance_thresholds["service"], 0.9);
    }

    #[test]
    fn test_load_config_missing_explicit() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.json");
        assert!(matches!(
            load_config(temp.path(), Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
    }
}
