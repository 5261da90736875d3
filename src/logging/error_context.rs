// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-request, per-layer error accumulation.
//!
//! [`ErrorContext`] is the cascade-suppression authority: once a layer has
//! logged an error, later errors at that layer stay quiet until a recovery
//! attempt has been made for it. It also tracks a monotonically rising
//! escalation level, runs pattern detection over the error timeline, and
//! drives automatic recovery for layers configured for it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::fields::Fields;
use super::patterns::{detect_patterns, ErrorPattern, PatternType, TimelineEntry};
use super::recovery::{
    RecoveryAction, RecoveryOutcome, RecoveryRegistry, CIRCUIT_BREAKER, GRACEFUL_DEGRADATION,
    RETRY_WITH_BACKOFF,
};

/// Automatic recovery rounds allowed per request inside the trailing window.
///
/// A round runs a layer's strategies in order and may record several actions.
const MAX_RECOVERY_ATTEMPTS: usize = 3;

/// Trailing window for the recovery attempt limit, in minutes.
const RECOVERY_WINDOW_MINUTES: i64 = 5;

/// Error severity. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// One step more severe, saturating at `Critical`.
    pub fn raised(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High | Severity::Critical => Severity::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// An application error as seen by the coordinator: a type name and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub error_type: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Capture an error value, using its Rust type name as the error type.
    pub fn from_error<E: fmt::Display + ?Sized>(error: &E) -> Self {
        Self::new(short_type_name::<E>(), error.to_string())
    }
}

/// Last path segment of a type name, ignoring generic arguments.
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Weight added to a layer's score per error of each severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityWeights {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            low: 0.5,
            medium: 1.0,
            high: 2.0,
            critical: 4.0,
        }
    }
}

/// Error-handling profile for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerErrorConfig {
    /// Errors per minute above which the layer counts as failing fast.
    pub error_threshold_per_minute: u32,
    /// Error count at which errors for the layer escalate.
    pub escalation_threshold: u32,
    /// Whether automatic recovery runs for this layer.
    pub auto_recovery: bool,
    /// Strategies tried in order, by registry name.
    pub recovery_strategies: Vec<String>,
    pub severity_weights: SeverityWeights,
}

impl LayerErrorConfig {
    pub fn api() -> Self {
        Self {
            error_threshold_per_minute: 20,
            escalation_threshold: 10,
            auto_recovery: false,
            recovery_strategies: Vec::new(),
            severity_weights: SeverityWeights::default(),
        }
    }

    pub fn service() -> Self {
        Self {
            error_threshold_per_minute: 10,
            escalation_threshold: 5,
            auto_recovery: false,
            recovery_strategies: vec![RETRY_WITH_BACKOFF.to_string()],
            severity_weights: SeverityWeights::default(),
        }
    }

    pub fn core() -> Self {
        Self {
            error_threshold_per_minute: 5,
            escalation_threshold: 3,
            auto_recovery: true,
            recovery_strategies: vec![GRACEFUL_DEGRADATION.to_string()],
            severity_weights: SeverityWeights {
                low: 0.5,
                medium: 1.5,
                high: 2.5,
                critical: 4.0,
            },
        }
    }

    pub fn infrastructure() -> Self {
        Self {
            error_threshold_per_minute: 3,
            escalation_threshold: 2,
            auto_recovery: true,
            recovery_strategies: vec![RETRY_WITH_BACKOFF.to_string(), CIRCUIT_BREAKER.to_string()],
            severity_weights: SeverityWeights {
                low: 1.0,
                medium: 2.0,
                high: 3.0,
                critical: 5.0,
            },
        }
    }

    /// Profile applied to layer names without a configured profile.
    pub fn fallback() -> Self {
        Self {
            auto_recovery: false,
            recovery_strategies: Vec::new(),
            ..Self::infrastructure()
        }
    }
}

/// Built-in per-layer profiles.
pub fn default_layer_configs() -> HashMap<String, LayerErrorConfig> {
    HashMap::from([
        ("api".to_string(), LayerErrorConfig::api()),
        ("service".to_string(), LayerErrorConfig::service()),
        ("core".to_string(), LayerErrorConfig::core()),
        ("infrastructure".to_string(), LayerErrorConfig::infrastructure()),
    ])
}

/// One recorded error at a layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub error: ErrorInfo,
    pub severity: Severity,
}

/// Aggregate error state for one layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerErrorRecord {
    pub last_message: String,
    pub last_error_type: String,
    pub last_timestamp: DateTime<Utc>,
    pub count: u32,
    pub weighted_score: f64,
    /// Recovery attempts made for this layer. Non-zero re-enables logging.
    pub recovery_attempts: u32,
    pub errors: Vec<LayerErrorEntry>,
}

/// Serializable overview of an [`ErrorContext`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub layers: BTreeMap<String, LayerSummary>,
    pub escalation_level: Option<Severity>,
    pub patterns: Vec<ErrorPattern>,
    pub recovery_actions: usize,
    pub successful_recoveries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub count: u32,
    pub weighted_score: f64,
    pub recovery_attempts: u32,
    pub last_error_type: String,
}

/// Error state for one request.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    layer_errors: HashMap<String, LayerErrorRecord>,
    error_timeline: Vec<TimelineEntry>,
    detected_patterns: Vec<ErrorPattern>,
    escalation_level: Option<Severity>,
    recovery_actions: Vec<RecoveryAction>,
    /// Start time of each recovery round that ran at least one strategy.
    recovery_rounds: Vec<DateTime<Utc>>,
    configs: Arc<HashMap<String, LayerErrorConfig>>,
    registry: Arc<RecoveryRegistry>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::with_config(
            Arc::new(default_layer_configs()),
            Arc::new(RecoveryRegistry::default()),
        )
    }

    pub fn with_config(
        configs: Arc<HashMap<String, LayerErrorConfig>>,
        registry: Arc<RecoveryRegistry>,
    ) -> Self {
        Self {
            layer_errors: HashMap::new(),
            error_timeline: Vec::new(),
            detected_patterns: Vec::new(),
            escalation_level: None,
            recovery_actions: Vec::new(),
            recovery_rounds: Vec::new(),
            configs,
            registry,
        }
    }

    /// Record an error at `layer` now.
    pub fn add_layer_error(
        &mut self,
        layer: &str,
        error: ErrorInfo,
        severity: Severity,
        metadata: Option<Fields>,
    ) {
        self.add_layer_error_at(layer, error, severity, metadata, Utc::now());
    }

    /// Record an error at `layer` with an explicit timestamp.
    pub fn add_layer_error_at(
        &mut self,
        layer: &str,
        error: ErrorInfo,
        severity: Severity,
        metadata: Option<Fields>,
        at: DateTime<Utc>,
    ) {
        let config = self.config_for(layer);

        self.error_timeline.push(TimelineEntry {
            timestamp: at,
            layer: layer.to_string(),
            error: error.clone(),
            severity,
            metadata: metadata.unwrap_or_default(),
        });

        let record = self
            .layer_errors
            .entry(layer.to_string())
            .or_insert_with(|| LayerErrorRecord {
                last_message: String::new(),
                last_error_type: String::new(),
                last_timestamp: at,
                count: 0,
                weighted_score: 0.0,
                recovery_attempts: 0,
                errors: Vec::new(),
            });
        record.last_message = error.message.clone();
        record.last_error_type = error.error_type.clone();
        record.last_timestamp = at;
        record.count += 1;
        record.weighted_score += config.severity_weights.weight(severity);
        record.errors.push(LayerErrorEntry {
            timestamp: at,
            error: error.clone(),
            severity,
        });
        let count = record.count;

        self.update_escalation(layer, &config, count, severity, at);
        self.update_patterns();

        if config.auto_recovery && self.recent_recovery_count(at) < MAX_RECOVERY_ATTEMPTS {
            self.attempt_recovery_at(layer, &error, &config.recovery_strategies, at);
        }
    }

    /// Whether an error at `layer` should be logged.
    ///
    /// True for the first error at a layer, and again once a recovery attempt
    /// has been made for it.
    pub fn should_log_error(&self, layer: &str) -> bool {
        match self.layer_errors.get(layer) {
            None => true,
            Some(record) => record.count == 0 || record.recovery_attempts > 0,
        }
    }

    /// Whether errors at `layer` warrant escalation. Unknown layers always do.
    pub fn should_escalate_error(&self, layer: &str) -> bool {
        let Some(config) = self.configs.get(layer) else {
            return true;
        };

        if let Some(record) = self.layer_errors.get(layer) {
            let threshold = config.escalation_threshold;
            if record.count >= threshold || record.weighted_score >= f64::from(threshold) * 2.0 {
                return true;
            }
        }

        self.detected_patterns.iter().any(|pattern| {
            pattern.confidence > 0.8
                && matches!(
                    pattern.pattern_type,
                    PatternType::Cascade | PatternType::Degradation
                )
        })
    }

    /// Run the named strategies for `layer` in order, stopping at the first success.
    ///
    /// Counts as one recovery attempt for the layer if any strategy ran.
    pub fn attempt_recovery(&mut self, layer: &str, error: &ErrorInfo, strategies: &[String]) -> RecoveryOutcome {
        self.attempt_recovery_at(layer, error, strategies, Utc::now())
    }

    fn attempt_recovery_at(
        &mut self,
        layer: &str,
        error: &ErrorInfo,
        strategies: &[String],
        at: DateTime<Utc>,
    ) -> RecoveryOutcome {
        let mut best = RecoveryOutcome::NotAttempted;
        let mut attempted = false;

        for name in strategies {
            let started = Instant::now();
            let (outcome, detail) = self.registry.run(name, layer, error);
            let duration_secs = started.elapsed().as_secs_f64();

            tracing::debug!(
                layer = %layer,
                strategy = %name,
                outcome = %outcome,
                duration_secs,
                "Recovery attempt"
            );

            self.recovery_actions.push(RecoveryAction {
                strategy: name.clone(),
                layer: layer.to_string(),
                outcome,
                started_at: at,
                duration_secs,
                detail,
            });

            if outcome != RecoveryOutcome::NotAttempted {
                attempted = true;
            }
            best = match (best, outcome) {
                (_, RecoveryOutcome::Success) => RecoveryOutcome::Success,
                (RecoveryOutcome::NotAttempted | RecoveryOutcome::Failed, RecoveryOutcome::Partial) => {
                    RecoveryOutcome::Partial
                }
                (RecoveryOutcome::NotAttempted, RecoveryOutcome::Failed) => RecoveryOutcome::Failed,
                (current, _) => current,
            };
            if outcome == RecoveryOutcome::Success {
                break;
            }
        }

        if attempted {
            self.recovery_rounds.push(at);
            if let Some(record) = self.layer_errors.get_mut(layer) {
                record.recovery_attempts += 1;
            }
        }
        best
    }

    /// Mark that a recovery attempt was made for `layer` outside automatic recovery.
    pub fn record_recovery_attempt(&mut self, layer: &str) {
        if let Some(record) = self.layer_errors.get_mut(layer) {
            record.recovery_attempts += 1;
        }
    }

    /// Errors recorded for `layer` within the minute before its latest error.
    pub fn errors_last_minute(&self, layer: &str) -> usize {
        let Some(record) = self.layer_errors.get(layer) else {
            return 0;
        };
        let window_start = record.last_timestamp - Duration::minutes(1);
        record
            .errors
            .iter()
            .filter(|entry| entry.timestamp >= window_start)
            .count()
    }

    /// Whether `layer` is producing errors faster than its per-minute threshold.
    pub fn is_rate_exceeded(&self, layer: &str) -> bool {
        let config = self.config_for(layer);
        self.errors_last_minute(layer) > config.error_threshold_per_minute as usize
    }

    pub fn layer_record(&self, layer: &str) -> Option<&LayerErrorRecord> {
        self.layer_errors.get(layer)
    }

    pub fn layer_record_mut(&mut self, layer: &str) -> Option<&mut LayerErrorRecord> {
        self.layer_errors.get_mut(layer)
    }

    /// Number of distinct layers with at least one error.
    pub fn layers_with_errors(&self) -> usize {
        self.layer_errors.values().filter(|r| r.count > 0).count()
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.error_timeline
    }

    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.detected_patterns
    }

    /// Highest escalation reached, or `None` if no error was recorded.
    pub fn escalation_level(&self) -> Option<Severity> {
        self.escalation_level
    }

    pub fn recovery_actions(&self) -> &[RecoveryAction] {
        &self.recovery_actions
    }

    pub fn is_empty(&self) -> bool {
        self.error_timeline.is_empty()
    }

    pub fn summary(&self) -> ErrorSummary {
        let layers = self
            .layer_errors
            .iter()
            .map(|(name, record)| {
                (
                    name.clone(),
                    LayerSummary {
                        count: record.count,
                        weighted_score: record.weighted_score,
                        recovery_attempts: record.recovery_attempts,
                        last_error_type: record.last_error_type.clone(),
                    },
                )
            })
            .collect();

        ErrorSummary {
            total_errors: self.error_timeline.len(),
            layers,
            escalation_level: self.escalation_level,
            patterns: self.detected_patterns.clone(),
            recovery_actions: self.recovery_actions.len(),
            successful_recoveries: self
                .recovery_actions
                .iter()
                .filter(|a| a.outcome == RecoveryOutcome::Success)
                .count(),
        }
    }

    fn config_for(&self, layer: &str) -> LayerErrorConfig {
        self.configs
            .get(layer)
            .cloned()
            .unwrap_or_else(LayerErrorConfig::fallback)
    }

    fn update_escalation(
        &mut self,
        layer: &str,
        config: &LayerErrorConfig,
        count: u32,
        severity: Severity,
        at: DateTime<Utc>,
    ) {
        let mut candidate = severity;
        if count >= config.escalation_threshold {
            candidate = candidate.raised();
        }
        if self.is_rate_exceeded(layer) {
            candidate = candidate.max(Severity::High);
        }

        let raised = self.escalation_level.map_or(true, |current| candidate > current);
        if raised {
            tracing::debug!(
                layer = %layer,
                from = ?self.escalation_level,
                to = %candidate,
                at = %at,
                "Escalation level raised"
            );
            self.escalation_level = Some(candidate);
        }
    }

    fn update_patterns(&mut self) {
        for pattern in detect_patterns(&self.error_timeline) {
            let known = self
                .detected_patterns
                .iter()
                .any(|existing| existing.same_identity(&pattern));
            if !known {
                self.detected_patterns.push(pattern);
            }
        }
    }

    fn recent_recovery_count(&self, now: DateTime<Utc>) -> usize {
        let window_start = now - Duration::minutes(RECOVERY_WINDOW_MINUTES);
        self.recovery_rounds
            .iter()
            .filter(|started| **started >= window_start)
            .count()
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecoveryError;
    use crate::logging::recovery::RecoveryStrategy;

    fn err(ty: &str) -> ErrorInfo {
        ErrorInfo::new(ty, format!("{ty} happened"))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_error_info_from_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let info = ErrorInfo::from_error(&io);
        assert_eq!(info.error_type, "Error");
        assert_eq!(info.message, "disk on fire");

        let parse = "x".parse::<i32>().unwrap_err();
        assert_eq!(ErrorInfo::from_error(&parse).error_type, "ParseIntError");
    }

    #[test]
    fn test_cascade_suppression() {
        let mut ctx = ErrorContext::new();
        assert!(ctx.should_log_error("service"));

        ctx.add_layer_error("service", err("CaseLoadFailed"), Severity::Medium, None);
        assert!(!ctx.should_log_error("service"));

        ctx.layer_record_mut("service").unwrap().recovery_attempts = 1;
        assert!(ctx.should_log_error("service"));
    }

    #[test]
    fn test_suppression_is_per_layer() {
        let mut ctx = ErrorContext::new();
        ctx.add_layer_error("api", err("BadRequest"), Severity::Low, None);
        assert!(!ctx.should_log_error("api"));
        assert!(ctx.should_log_error("service"));
    }

    #[test]
    fn test_layer_record_aggregates() {
        let mut ctx = ErrorContext::new();
        ctx.add_layer_error("service", err("First"), Severity::Low, None);
        ctx.add_layer_error("service", err("Second"), Severity::Critical, None);

        let record = ctx.layer_record("service").unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.last_error_type, "Second");
        assert_eq!(record.errors.len(), 2);
        assert!((record.weighted_score - 4.5).abs() < 1e-9);
        assert_eq!(ctx.timeline().len(), 2);
        assert_eq!(ctx.layers_with_errors(), 1);
    }

    #[test]
    fn test_escalation_monotonic() {
        let mut ctx = ErrorContext::new();
        let mut previous = None;
        for severity in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
            ctx.add_layer_error("api", err("E"), severity, None);
            let level = ctx.escalation_level();
            assert!(level >= previous);
            previous = level;
        }
        assert_eq!(ctx.escalation_level(), Some(Severity::Critical));

        ctx.add_layer_error("api", err("E"), Severity::Low, None);
        assert_eq!(ctx.escalation_level(), Some(Severity::Critical));
    }

    #[test]
    fn test_escalation_bumped_at_threshold() {
        let mut ctx = ErrorContext::new();
        // infrastructure escalates at 2 errors
        ctx.add_layer_error("infrastructure", err("Redis"), Severity::Low, None);
        assert_eq!(ctx.escalation_level(), Some(Severity::Low));
        ctx.add_layer_error("infrastructure", err("Redis"), Severity::Low, None);
        assert_eq!(ctx.escalation_level(), Some(Severity::Medium));
    }

    #[test]
    fn test_should_escalate() {
        let mut ctx = ErrorContext::new();
        assert!(ctx.should_escalate_error("nonexistent_layer"));
        assert!(!ctx.should_escalate_error("service"));

        for _ in 0..4 {
            ctx.add_layer_error("service", err("Timeout"), Severity::Low, None);
        }
        assert!(!ctx.should_escalate_error("service"));
        ctx.add_layer_error("service", err("Timeout"), Severity::Low, None);
        assert!(ctx.should_escalate_error("service"));
    }

    #[test]
    fn test_should_escalate_on_weighted_score() {
        let mut ctx = ErrorContext::new();
        // service threshold 5 -> score 10 escalates; 3 criticals = 12
        for _ in 0..3 {
            ctx.add_layer_error("service", err("Fatal"), Severity::Critical, None);
        }
        assert!(ctx.should_escalate_error("service"));
    }

    #[test]
    fn test_patterns_recorded_once() {
        let mut ctx = ErrorContext::new();
        for i in 0..4 {
            ctx.add_layer_error_at(
                "api",
                err("Timeout"),
                Severity::Medium,
                None,
                t0() + Duration::minutes(10 * i),
            );
        }
        let recurring: Vec<_> = ctx
            .patterns()
            .iter()
            .filter(|p| p.pattern_type == PatternType::Recurring)
            .collect();
        assert_eq!(recurring.len(), 1);
    }

    #[test]
    fn test_automatic_recovery_for_infrastructure() {
        let mut ctx = ErrorContext::new();
        ctx.add_layer_error(
            "infrastructure",
            ErrorInfo::new("RedisError", "connection refused"),
            Severity::High,
            None,
        );

        let actions = ctx.recovery_actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].strategy, RETRY_WITH_BACKOFF);
        assert_eq!(actions[0].outcome, RecoveryOutcome::Success);
        assert_eq!(ctx.layer_record("infrastructure").unwrap().recovery_attempts, 1);
        // Recovery re-enables logging for the layer.
        assert!(ctx.should_log_error("infrastructure"));
    }

    #[test]
    fn test_recovery_continues_after_failure() {
        let mut ctx = ErrorContext::new();
        ctx.add_layer_error(
            "infrastructure",
            ErrorInfo::new("SchemaError", "column missing"),
            Severity::High,
            None,
        );

        let outcomes: Vec<_> = ctx.recovery_actions().iter().map(|a| a.outcome).collect();
        assert_eq!(outcomes, vec![RecoveryOutcome::Failed, RecoveryOutcome::Partial]);
    }

    #[test]
    fn test_recovery_rate_limited() {
        let mut ctx = ErrorContext::new();
        for _ in 0..6 {
            ctx.add_layer_error_at(
                "core",
                err("RankingFailed"),
                Severity::Medium,
                None,
                t0(),
            );
        }
        assert_eq!(ctx.recovery_actions().len(), MAX_RECOVERY_ATTEMPTS);

        // Outside the window recovery resumes.
        ctx.add_layer_error_at(
            "core",
            err("RankingFailed"),
            Severity::Medium,
            None,
            t0() + Duration::minutes(6),
        );
        assert_eq!(ctx.recovery_actions().len(), MAX_RECOVERY_ATTEMPTS + 1);
    }

    #[test]
    fn test_recovery_limit_counts_rounds_not_strategies() {
        let mut ctx = ErrorContext::new();
        for _ in 0..5 {
            ctx.add_layer_error_at(
                "infrastructure",
                err("SchemaError"),
                Severity::High,
                None,
                t0(),
            );
        }

        // Each round runs retry (fails) then circuit breaker (partial).
        assert_eq!(ctx.recovery_actions().len(), MAX_RECOVERY_ATTEMPTS * 2);
        assert_eq!(
            ctx.layer_record("infrastructure").unwrap().recovery_attempts,
            MAX_RECOVERY_ATTEMPTS as u32
        );
    }

    #[test]
    fn test_no_automatic_recovery_for_service() {
        let mut ctx = ErrorContext::new();
        ctx.add_layer_error("service", err("Timeout"), Severity::Medium, None);
        assert!(ctx.recovery_actions().is_empty());
    }

    #[test]
    fn test_custom_strategy_errors_recorded() {
        struct AlwaysFails;
        impl RecoveryStrategy for AlwaysFails {
            fn name(&self) -> &str {
                "always_fails"
            }
            fn attempt(&self, _: &str, _: &ErrorInfo) -> Result<RecoveryOutcome, RecoveryError> {
                Err(RecoveryError::Failed("nope".to_string()))
            }
        }

        let mut registry = RecoveryRegistry::empty();
        registry.register(Arc::new(AlwaysFails));
        let mut configs = default_layer_configs();
        configs.insert(
            "service".to_string(),
            LayerErrorConfig {
                auto_recovery: true,
                recovery_strategies: vec!["always_fails".to_string()],
                ..LayerErrorConfig::service()
            },
        );

        let mut ctx = ErrorContext::with_config(Arc::new(configs), Arc::new(registry));
        ctx.add_layer_error("service", err("Boom"), Severity::Medium, None);

        let action = &ctx.recovery_actions()[0];
        assert_eq!(action.outcome, RecoveryOutcome::Failed);
        assert_eq!(action.detail.as_deref(), Some("Recovery failed: nope"));
        // A failed attempt is still an attempt.
        assert!(ctx.should_log_error("service"));
    }

    #[test]
    fn test_rate_exceeded() {
        let mut ctx = ErrorContext::new();
        for _ in 0..4 {
            ctx.add_layer_error_at("api", err("E"), Severity::Low, None, t0());
        }
        assert!(!ctx.is_rate_exceeded("api"));

        let mut ctx = ErrorContext::new();
        for i in 0..4 {
            ctx.add_layer_error_at(
                "infrastructure",
                err("E"),
                Severity::Low,
                None,
                t0() + Duration::seconds(i),
            );
        }
        assert_eq!(ctx.errors_last_minute("infrastructure"), 4);
        assert!(ctx.is_rate_exceeded("infrastructure"));
        assert!(ctx.escalation_level() >= Some(Severity::High));
    }

    #[test]
    fn test_summary() {
        let mut ctx = ErrorContext::new();
        assert!(ctx.is_empty());
        ctx.add_layer_error("api", err("A"), Severity::Low, None);
        ctx.add_layer_error("core", err("B"), Severity::High, None);

        let summary = ctx.summary();
        assert_eq!(summary.total_errors, 2);
        assert_eq!(summary.layers.len(), 2);
        assert_eq!(summary.layers["core"].last_error_type, "B");
        assert_eq!(summary.escalation_level, Some(Severity::High));
        assert_eq!(summary.recovery_actions, 1);
        assert_eq!(summary.successful_recoveries, 1);
    }

    #[test]
    fn test_metadata_kept_on_timeline() {
        let mut ctx = ErrorContext::new();
        let metadata = crate::fields! { "case_id" => "c-9" };
        ctx.add_layer_error("api", err("A"), Severity::Low, Some(metadata));
        assert_eq!(ctx.timeline()[0].metadata["case_id"], "c-9");
    }
}
