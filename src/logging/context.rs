// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The per-request unit of coordination.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::error_context::{ErrorContext, ErrorSummary};
use super::fields::Fields;
use super::performance::PerformanceTracker;
use crate::telemetry::CorrelationId;

/// Attribute keys lifted out of the free-form map into semantic tags.
const SESSION_ID: &str = "session_id";
const USER_ID: &str = "user_id";
const INVESTIGATION_ID: &str = "investigation_id";
const AGENT_PHASE: &str = "agent_phase";

/// State for one inbound unit of work.
///
/// Owned by the coordinator that created it and shared as `Arc<RequestContext>`
/// with code running inside the request. Interior state sits behind
/// per-request mutexes; nothing is shared between two requests.
#[derive(Debug)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    session_id: Option<String>,
    user_id: Option<String>,
    investigation_id: Option<String>,
    agent_phase: Option<String>,
    start_time: DateTime<Utc>,
    started: Instant,
    attributes: Mutex<Fields>,
    logged_operations: Mutex<HashSet<String>>,
    error_context: Mutex<ErrorContext>,
    performance_tracker: Mutex<PerformanceTracker>,
}

impl RequestContext {
    /// Create a context with default error and performance configuration.
    pub fn new(attributes: Fields) -> Self {
        Self::with_parts(attributes, ErrorContext::new(), PerformanceTracker::new())
    }

    /// Create a context around pre-configured error and performance state.
    ///
    /// `session_id`, `user_id`, `investigation_id` and `agent_phase` string
    /// entries are moved out of `attributes` into their dedicated tags.
    pub fn with_parts(
        mut attributes: Fields,
        error_context: ErrorContext,
        performance_tracker: PerformanceTracker,
    ) -> Self {
        let mut take_tag = |key: &str| match attributes.remove(key) {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        let session_id = take_tag(SESSION_ID);
        let user_id = take_tag(USER_ID);
        let investigation_id = take_tag(INVESTIGATION_ID);
        let agent_phase = take_tag(AGENT_PHASE);

        Self {
            correlation_id: CorrelationId::new(),
            session_id,
            user_id,
            investigation_id,
            agent_phase,
            start_time: Utc::now(),
            started: Instant::now(),
            attributes: Mutex::new(attributes),
            logged_operations: Mutex::new(HashSet::new()),
            error_context: Mutex::new(error_context),
            performance_tracker: Mutex::new(performance_tracker),
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn investigation_id(&self) -> Option<&str> {
        self.investigation_id.as_deref()
    }

    pub fn agent_phase(&self) -> Option<&str> {
        self.agent_phase.as_deref()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Seconds since the context was created.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Copy of the free-form attributes.
    pub fn attributes(&self) -> Fields {
        lock(&self.attributes).clone()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<Value>) {
        lock(&self.attributes).insert(key.into(), value.into());
    }

    /// Whether `operation_key` was already emitted in this request.
    pub fn has_logged(&self, operation_key: &str) -> bool {
        lock(&self.logged_operations).contains(operation_key)
    }

    /// Record `operation_key` as emitted. Returns `false` if it already was.
    pub fn mark_logged(&self, operation_key: impl Into<String>) -> bool {
        lock(&self.logged_operations).insert(operation_key.into())
    }

    pub fn logged_count(&self) -> usize {
        lock(&self.logged_operations).len()
    }

    /// Exclusive access to this request's error state.
    pub fn error_context(&self) -> MutexGuard<'_, ErrorContext> {
        lock(&self.error_context)
    }

    /// Exclusive access to this request's timing table.
    pub fn performance_tracker(&self) -> MutexGuard<'_, PerformanceTracker> {
        lock(&self.performance_tracker)
    }

    /// Fields identifying this request, attached to every emission inside it.
    pub fn identity_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "correlation_id".to_string(),
            Value::from(self.correlation_id.to_string()),
        );
        let tags = [
            (SESSION_ID, &self.session_id),
            (USER_ID, &self.user_id),
            (INVESTIGATION_ID, &self.investigation_id),
            (AGENT_PHASE, &self.agent_phase),
        ];
        for (key, value) in tags {
            if let Some(value) = value {
                fields.insert(key.to_string(), Value::from(value.as_str()));
            }
        }
        fields
    }

    /// Aggregate for the end of the request.
    pub fn summary(&self) -> RequestSummary {
        let error_context = self.error_context();
        let error_summary = (!error_context.is_empty()).then(|| error_context.summary());

        RequestSummary {
            correlation_id: self.correlation_id.to_string(),
            duration_seconds: self.elapsed_secs(),
            operations_logged: self.logged_count(),
            errors_encountered: error_context.layers_with_errors(),
            performance_violations: self.performance_tracker().violation_count(),
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            investigation_id: self.investigation_id.clone(),
            agent_phase: self.agent_phase.clone(),
            error_summary,
            attributes: self.attributes(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One-per-request aggregate produced by `end_request`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub correlation_id: String,
    pub duration_seconds: f64,
    pub operations_logged: usize,
    /// Distinct layers with at least one error.
    pub errors_encountered: usize,
    /// Timings above their layer's threshold.
    pub performance_violations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<ErrorSummary>,
    /// Free-form request attributes, nested so they cannot shadow summary keys.
    #[serde(skip_serializing_if = "Fields::is_empty")]
    pub attributes: Fields,
}

impl RequestSummary {
    /// The summary as a field map; attributes sit under `attributes`.
    pub fn to_fields(&self) -> Fields {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Fields::new(),
        }
    }

    /// Emit the summary as a single `INFO` event.
    pub fn log(&self) {
        let summary = Value::Object(self.to_fields());
        tracing::info!(
            target: "casetrace",
            correlation_id = %self.correlation_id,
            duration_seconds = self.duration_seconds,
            operations_logged = self.operations_logged,
            errors_encountered = self.errors_encountered,
            performance_violations = self.performance_violations,
            summary = %summary,
            "Request completed"
        );
    }
}
