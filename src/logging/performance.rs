// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-layer timing thresholds and violation detection.

use std::collections::HashMap;

use serde::Serialize;

/// Threshold used for layers with no configured threshold, in seconds.
pub const DEFAULT_THRESHOLD_SECS: f64 = 1.0;

/// Built-in per-layer thresholds in seconds.
pub fn default_thresholds() -> HashMap<String, f64> {
    HashMap::from([
        ("api".to_string(), 0.1),
        ("service".to_string(), 0.5),
        ("core".to_string(), 0.3),
        ("infrastructure".to_string(), 1.0),
    ])
}

/// Result of recording one timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingOutcome {
    /// Whether the duration was strictly above the threshold.
    pub exceeded: bool,
    /// Threshold that applied, in seconds.
    pub threshold: f64,
}

/// Last-write-wins timing table for one request.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    layer_timings: HashMap<String, f64>,
    thresholds: HashMap<String, f64>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::with_thresholds(default_thresholds())
    }

    pub fn with_thresholds(thresholds: HashMap<String, f64>) -> Self {
        Self {
            layer_timings: HashMap::new(),
            thresholds,
        }
    }

    /// Threshold for `layer`, falling back to [`DEFAULT_THRESHOLD_SECS`].
    pub fn threshold_for(&self, layer: &str) -> f64 {
        self.thresholds
            .get(layer)
            .copied()
            .unwrap_or(DEFAULT_THRESHOLD_SECS)
    }

    /// Store `duration_secs` under `"{layer}.{operation}"`, replacing any
    /// earlier value for that key, and report whether it broke the threshold.
    pub fn record_timing(&mut self, layer: &str, operation: &str, duration_secs: f64) -> TimingOutcome {
        self.layer_timings
            .insert(format!("{layer}.{operation}"), duration_secs);
        let threshold = self.threshold_for(layer);
        TimingOutcome {
            exceeded: duration_secs > threshold,
            threshold,
        }
    }

    /// Last recorded duration for a `layer.operation` key.
    pub fn timing(&self, key: &str) -> Option<f64> {
        self.layer_timings.get(key).copied()
    }

    pub fn timings(&self) -> &HashMap<String, f64> {
        &self.layer_timings
    }

    /// Number of stored timings above their layer's threshold.
    pub fn violation_count(&self) -> usize {
        self.layer_timings
            .iter()
            .filter(|(key, duration)| {
                let layer = key.split('.').next().unwrap_or_default();
                **duration > self.threshold_for(layer)
            })
            .count()
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_timing_thresholds() {
        let mut tracker = PerformanceTracker::new();
        assert_eq!(
            tracker.record_timing("api", "x", 0.05),
            TimingOutcome { exceeded: false, threshold: 0.1 }
        );
        assert_eq!(
            tracker.record_timing("api", "x", 0.2),
            TimingOutcome { exceeded: true, threshold: 0.1 }
        );
        assert_eq!(
            tracker.record_timing("unknown_layer", "y", 1.5),
            TimingOutcome { exceeded: true, threshold: 1.0 }
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut tracker = PerformanceTracker::new();
        assert!(!tracker.record_timing("service", "load_case", 0.5).exceeded);
        assert!(tracker.record_timing("service", "load_case", 0.5001).exceeded);
    }

    #[test]
    fn test_last_write_wins_per_key() {
        let mut tracker = PerformanceTracker::new();
        tracker.record_timing("core", "rank", 0.9);
        tracker.record_timing("core", "rank", 0.1);
        tracker.record_timing("core", "score", 0.2);

        assert_eq!(tracker.timing("core.rank"), Some(0.1));
        assert_eq!(tracker.timing("core.score"), Some(0.2));
        assert_eq!(tracker.timings().len(), 2);
        assert_eq!(tracker.violation_count(), 0);
    }

    #[test]
    fn test_violation_count() {
        let mut tracker = PerformanceTracker::new();
        tracker.record_timing("api", "list_cases", 0.3);
        tracker.record_timing("infrastructure", "redis_get", 0.2);
        tracker.record_timing("mystery", "op", 2.0);
        assert_eq!(tracker.violation_count(), 2);

        // Overwriting with a fast value clears the violation.
        tracker.record_timing("api", "list_cases", 0.01);
        assert_eq!(tracker.violation_count(), 1);
    }

    #[test]
    fn test_custom_thresholds() {
        let mut thresholds = default_thresholds();
        thresholds.insert("api".to_string(), 2.0);
        let mut tracker = PerformanceTracker::with_thresholds(thresholds);
        assert!(!tracker.record_timing("api", "slow_ok", 1.5).exceeded);
        assert_eq!(tracker.threshold_for("nowhere"), DEFAULT_THRESHOLD_SECS);
    }
}
