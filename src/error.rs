// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for casetrace.
//!
//! These are the coordinator's own failure modes, not the application errors
//! it observes. Application errors flow through [`crate::logging::ErrorInfo`].

use thiserror::Error;

/// Errors raised when a layer name cannot be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("Invalid layer: {0} (expected one of api, service, core, infrastructure)")]
    InvalidLayer(String),
}

/// Errors raised by a recovery strategy.
///
/// These never escape [`crate::logging::ErrorContext`]; they are recorded as
/// failed recovery actions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("Recovery strategy not registered: {0}")]
    UnknownStrategy(String),

    #[error("Recovery failed: {0}")]
    Failed(String),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("Logging coordinator already initialized")]
    AlreadyInitialized,
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

impl From<LayerError> for ConfigError {
    fn from(err: LayerError) -> Self {
        match err {
            LayerError::InvalidLayer(name) => Self::invalid("layer", name),
        }
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_error_display() {
        let err = LayerError::InvalidLayer("database".to_string());
        let display = err.to_string();
        assert!(display.contains("database"));
        assert!(display.contains("infrastructure"));
    }

    #[test]
    fn test_config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::NotFound(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{broken");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_config_error_from_layer() {
        let config_err: ConfigError = LayerError::InvalidLayer("db".to_string()).into();
        match config_err {
            ConfigError::InvalidValue { field, message } => {
                assert_eq!(field, "layer");
                assert_eq!(message, "db");
            }
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }
}
