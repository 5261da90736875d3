// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! File configuration is all-optional and merged onto built-in defaults to
//! produce a [`ResolvedConfig`]. JSON and YAML are both accepted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::logging::{
    default_layer_configs, default_thresholds, CoordinatorSettings, LayerErrorConfig,
    RecoveryRegistry, SeverityWeights,
};
use crate::telemetry::TelemetryConfig;

/// Observability configuration as written in a config file.
///
/// Found in `.casetrace.json`, `.casetrace.yaml` or `.casetrace/config.json`
/// in the workspace, or `~/.casetrace/config.json` globally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityConfig {
    /// Per-layer slow-operation thresholds, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_thresholds: Option<HashMap<String, f64>>,

    /// Per-layer error-handling overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<HashMap<String, LayerConfigPartial>>,

    /// Subscriber settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetrySettings>,
}

/// Partial override of a layer's error-handling profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_threshold_per_minute: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_threshold: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_recovery: Option<bool>,

    /// Replaces the layer's strategy list when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_strategies: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_weights: Option<SeverityWeights>,
}

/// Subscriber settings as written in a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySettings {
    /// trace, debug, info, warn or error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compact: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ansi: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_events: Option<bool>,

    /// `EnvFilter` directive, overriding `level`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Fully resolved configuration, with every default filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub performance_thresholds: BTreeMap<String, f64>,
    pub layers: BTreeMap<String, LayerErrorConfig>,
    pub telemetry: ResolvedTelemetry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTelemetry {
    pub level: String,
    pub compact: bool,
    pub ansi: bool,
    pub span_events: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for ResolvedTelemetry {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            compact: true,
            ansi: true,
            span_events: false,
            filter: None,
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            performance_thresholds: default_thresholds().into_iter().collect(),
            layers: default_layer_configs().into_iter().collect(),
            telemetry: ResolvedTelemetry::default(),
        }
    }
}

impl ResolvedConfig {
    /// Settings for a [`crate::logging::LoggingCoordinator`].
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            performance_thresholds: self
                .performance_thresholds
                .iter()
                .map(|(layer, secs)| (layer.clone(), *secs))
                .collect(),
            layer_configs: Arc::new(
                self.layers
                    .iter()
                    .map(|(layer, config)| (layer.clone(), config.clone()))
                    .collect(),
            ),
            recovery_registry: Arc::new(RecoveryRegistry::default()),
        }
    }

    /// Subscriber configuration. Unparseable levels fall back to `INFO`.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let level = self.telemetry.level.parse::<Level>().unwrap_or(Level::INFO);
        let mut config = TelemetryConfig::default()
            .with_level(level)
            .with_ansi(self.telemetry.ansi);
        config.compact = self.telemetry.compact;
        config.include_span_events = self.telemetry.span_events;
        if let Some(filter) = &self.telemetry.filter {
            config = config.with_filter(filter.clone());
        }
        config
    }
}
