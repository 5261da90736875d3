// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging and validation.

use tracing::Level;

use crate::error::ConfigError;
use crate::logging::{Layer, LayerErrorConfig, RecoveryRegistry};

use super::types::{LayerConfigPartial, ObservabilityConfig, ResolvedConfig, TelemetrySettings};

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge configurations onto the defaults.
///
/// Precedence (highest to lowest):
/// 1. Explicit file (`--config`)
/// 2. Workspace config (.casetrace.json)
/// 3. Global config (~/.casetrace/config.json)
/// 4. Default values
pub fn merge_config(
    global: Option<ObservabilityConfig>,
    workspace: Option<ObservabilityConfig>,
    explicit: Option<ObservabilityConfig>,
) -> Result<ResolvedConfig, ConfigError> {
    let mut result = default_config();

    for config in [global, workspace, explicit].into_iter().flatten() {
        apply_config(&mut result, &config)?;
    }

    validate(&result)?;
    Ok(result)
}

fn apply_config(result: &mut ResolvedConfig, config: &ObservabilityConfig) -> Result<(), ConfigError> {
    if let Some(ref thresholds) = config.performance_thresholds {
        for (layer, secs) in thresholds {
            result
                .performance_thresholds
                .insert(canonical_layer(layer)?, *secs);
        }
    }

    if let Some(ref layers) = config.layers {
        for (layer, partial) in layers {
            let layer = canonical_layer(layer)?;
            let entry = result
                .layers
                .entry(layer)
                .or_insert_with(LayerErrorConfig::fallback);
            apply_layer(entry, partial);
        }
    }

    if let Some(ref telemetry) = config.telemetry {
        apply_telemetry(result, telemetry);
    }

    Ok(())
}

fn canonical_layer(name: &str) -> Result<String, ConfigError> {
    Ok(name.parse::<Layer>()?.as_str().to_string())
}

fn apply_layer(config: &mut LayerErrorConfig, partial: &LayerConfigPartial) {
    if let Some(limit) = partial.error_threshold_per_minute {
        config.error_threshold_per_minute = limit;
    }
    if let Some(threshold) = partial.escalation_threshold {
        config.escalation_threshold = threshold;
    }
    if let Some(auto) = partial.auto_recovery {
        config.auto_recovery = auto;
    }
    if let Some(ref strategies) = partial.recovery_strategies {
        config.recovery_strategies = strategies.clone();
    }
    if let Some(weights) = partial.severity_weights {
        config.severity_weights = weights;
    }
}

fn apply_telemetry(result: &mut ResolvedConfig, telemetry: &TelemetrySettings) {
    let resolved = &mut result.telemetry;
    if let Some(ref level) = telemetry.level {
        resolved.level = level.to_lowercase();
    }
    if let Some(compact) = telemetry.compact {
        resolved.compact = compact;
    }
    if let Some(ansi) = telemetry.ansi {
        resolved.ansi = ansi;
    }
    if let Some(span_events) = telemetry.span_events {
        resolved.span_events = span_events;
    }
    if telemetry.filter.is_some() {
        resolved.filter = telemetry.filter.clone();
    }
}

/// Check values the type system cannot.
pub fn validate(config: &ResolvedConfig) -> Result<(), ConfigError> {
    for (layer, secs) in &config.performance_thresholds {
        if !secs.is_finite() || *secs <= 0.0 {
            return Err(ConfigError::invalid(
                format!("performanceThresholds.{layer}"),
                format!("must be a positive number of seconds, got {secs}"),
            ));
        }
    }

    let registry = RecoveryRegistry::default();
    for (layer, profile) in &config.layers {
        if profile.escalation_threshold == 0 {
            return Err(ConfigError::invalid(
                format!("layers.{layer}.escalationThreshold"),
                "must be at least 1",
            ));
        }
        if let Some(unknown) = profile
            .recovery_strategies
            .iter()
            .find(|name| !registry.contains(name))
        {
            return Err(ConfigError::invalid(
                format!("layers.{layer}.recoveryStrategies"),
                format!("unknown strategy: {unknown}"),
            ));
        }
    }

    if config.telemetry.level.parse::<Level>().is_err() {
        return Err(ConfigError::invalid(
            "telemetry.level",
            format!("unknown level: {}", config.telemetry.level),
        ));
    }

    Ok(())
}
