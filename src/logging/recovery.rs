// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Automatic recovery strategies.
//!
//! Recovery is best-effort: a strategy that fails (or panics) is recorded as a
//! [`RecoveryOutcome::Failed`] action and never propagates into the caller.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error_context::ErrorInfo;
use crate::error::RecoveryError;

pub const RETRY_WITH_BACKOFF: &str = "retry_with_backoff";
pub const CIRCUIT_BREAKER: &str = "circuit_breaker";
pub const GRACEFUL_DEGRADATION: &str = "graceful_degradation";

/// Result of one recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Success,
    Partial,
    Failed,
    NotAttempted,
}

impl fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryOutcome::Success => "success",
            RecoveryOutcome::Partial => "partial",
            RecoveryOutcome::Failed => "failed",
            RecoveryOutcome::NotAttempted => "not_attempted",
        };
        f.write_str(s)
    }
}

/// A recorded recovery attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAction {
    pub strategy: String,
    pub layer: String,
    pub outcome: RecoveryOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub detail: Option<String>,
}

/// A named recovery technique.
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Try to recover from `error` observed at `layer`.
    fn attempt(&self, layer: &str, error: &ErrorInfo) -> Result<RecoveryOutcome, RecoveryError>;
}

/// Signals that a transient failure can be retried by the caller.
#[derive(Debug, Default)]
pub struct RetryWithBackoff;

impl RetryWithBackoff {
    const TRANSIENT_MARKERS: &'static [&'static str] = &[
        "timeout",
        "timed out",
        "connection",
        "unavailable",
        "temporar",
        "rate limit",
        "reset",
    ];

    fn is_transient(error: &ErrorInfo) -> bool {
        let haystack = format!("{} {}", error.error_type, error.message).to_lowercase();
        Self::TRANSIENT_MARKERS
            .iter()
            .any(|marker| haystack.contains(marker))
    }
}

impl RecoveryStrategy for RetryWithBackoff {
    fn name(&self) -> &str {
        RETRY_WITH_BACKOFF
    }

    fn attempt(&self, _layer: &str, error: &ErrorInfo) -> Result<RecoveryOutcome, RecoveryError> {
        if Self::is_transient(error) {
            Ok(RecoveryOutcome::Success)
        } else {
            Err(RecoveryError::Failed(format!(
                "{} is not transient",
                error.error_type
            )))
        }
    }
}

/// Stops traffic to the failing dependency; the layer keeps serving degraded.
#[derive(Debug, Default)]
pub struct CircuitBreaker;

impl RecoveryStrategy for CircuitBreaker {
    fn name(&self) -> &str {
        CIRCUIT_BREAKER
    }

    fn attempt(&self, _layer: &str, _error: &ErrorInfo) -> Result<RecoveryOutcome, RecoveryError> {
        Ok(RecoveryOutcome::Partial)
    }
}

/// Falls back to reduced functionality for the rest of the request.
#[derive(Debug, Default)]
pub struct GracefulDegradation;

impl RecoveryStrategy for GracefulDegradation {
    fn name(&self) -> &str {
        GRACEFUL_DEGRADATION
    }

    fn attempt(&self, _layer: &str, _error: &ErrorInfo) -> Result<RecoveryOutcome, RecoveryError> {
        Ok(RecoveryOutcome::Success)
    }
}

/// Named strategies available to automatic recovery.
#[derive(Clone)]
pub struct RecoveryRegistry {
    strategies: HashMap<String, Arc<dyn RecoveryStrategy>>,
}

impl RecoveryRegistry {
    /// Registry without any strategies.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn register(&mut self, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RecoveryStrategy>> {
        self.strategies.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Run the named strategy, converting errors and panics into outcomes.
    pub fn run(&self, name: &str, layer: &str, error: &ErrorInfo) -> (RecoveryOutcome, Option<String>) {
        let Some(strategy) = self.get(name) else {
            return (
                RecoveryOutcome::NotAttempted,
                Some(RecoveryError::UnknownStrategy(name.to_string()).to_string()),
            );
        };

        match panic::catch_unwind(AssertUnwindSafe(|| strategy.attempt(layer, error))) {
            Ok(Ok(outcome)) => (outcome, None),
            Ok(Err(err)) => (RecoveryOutcome::Failed, Some(err.to_string())),
            Err(_) => (
                RecoveryOutcome::Failed,
                Some(format!("recovery strategy {name} panicked")),
            ),
        }
    }
}

impl Default for RecoveryRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RetryWithBackoff));
        registry.register(Arc::new(CircuitBreaker));
        registry.register(Arc::new(GracefulDegradation));
        registry
    }
}

impl fmt::Debug for RecoveryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.strategies.keys().collect();
        names.sort();
        f.debug_struct("RecoveryRegistry")
            .field("strategies", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exploding;

    impl RecoveryStrategy for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn attempt(&self, _layer: &str, _error: &ErrorInfo) -> Result<RecoveryOutcome, RecoveryError> {
            panic!("strategy blew up");
        }
    }

    #[test]
    fn test_default_registry() {
        let registry = RecoveryRegistry::default();
        assert!(registry.contains(RETRY_WITH_BACKOFF));
        assert!(registry.contains(CIRCUIT_BREAKER));
        assert!(registry.contains(GRACEFUL_DEGRADATION));
        assert!(!RecoveryRegistry::empty().contains(RETRY_WITH_BACKOFF));
    }

    #[test]
    fn test_retry_transient_vs_permanent() {
        let registry = RecoveryRegistry::default();
        let transient = ErrorInfo::new("RedisError", "connection reset by peer");
        let permanent = ErrorInfo::new("ValidationError", "case title is empty");

        let (outcome, detail) = registry.run(RETRY_WITH_BACKOFF, "infrastructure", &transient);
        assert_eq!(outcome, RecoveryOutcome::Success);
        assert!(detail.is_none());

        let (outcome, detail) = registry.run(RETRY_WITH_BACKOFF, "infrastructure", &permanent);
        assert_eq!(outcome, RecoveryOutcome::Failed);
        assert!(detail.unwrap().contains("ValidationError"));
    }

    #[test]
    fn test_unknown_strategy_not_attempted() {
        let registry = RecoveryRegistry::default();
        let (outcome, detail) = registry.run("reboot_universe", "core", &ErrorInfo::new("E", "m"));
        assert_eq!(outcome, RecoveryOutcome::NotAttempted);
        assert!(detail.unwrap().contains("reboot_universe"));
    }

    #[test]
    fn test_panicking_strategy_is_contained() {
        let mut registry = RecoveryRegistry::empty();
        registry.register(Arc::new(Exploding));
        let (outcome, detail) = registry.run("exploding", "core", &ErrorInfo::new("E", "m"));
        assert_eq!(outcome, RecoveryOutcome::Failed);
        assert!(detail.unwrap().contains("panicked"));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(RecoveryOutcome::NotAttempted.to_string(), "not_attempted");
        assert_eq!(RecoveryOutcome::Partial.to_string(), "partial");
    }
}
