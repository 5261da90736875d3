// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in various locations.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::ObservabilityConfig;

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".casetrace.json",
    ".casetrace.yaml",
    ".casetrace.yml",
    ".casetrace/config.json",
];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".casetrace";

/// Global config file names, JSON first.
pub const GLOBAL_CONFIG_FILES: &[&str] = &["config.json", "config.yaml"];

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Load global configuration from ~/.casetrace/config.{json,yaml}.
pub fn load_global_config() -> Result<Option<ObservabilityConfig>, ConfigError> {
    match get_global_config_dir() {
        Some(dir) => load_first(&dir, GLOBAL_CONFIG_FILES),
        None => Ok(None),
    }
}

/// Load workspace configuration from the workspace root.
///
/// Searches for config files in the following order:
/// 1. .casetrace.json
/// 2. .casetrace.yaml / .casetrace.yml
/// 3. .casetrace/config.json
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<ObservabilityConfig>, ConfigError> {
    load_first(workspace_root, CONFIG_FILES)
}

fn load_first(dir: &Path, names: &[&str]) -> Result<Option<ObservabilityConfig>, ConfigError> {
    for name in names {
        let path = dir.join(name);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<ObservabilityConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Find the workspace root by searching for config files.
///
/// Walks up the directory tree from `start` until it finds a directory
/// containing a config file or reaches the filesystem root.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if CONFIG_FILES.iter().any(|name| current.join(name).exists()) {
            return Some(current);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}
