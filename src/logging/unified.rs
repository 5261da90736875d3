// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Layer-bound logger facade.
//!
//! A [`UnifiedLogger`] turns semantic calls (boundary crossings, timed
//! operations, metrics, events) into emissions mediated by the ambient
//! request. Boundary crossings and operation start/end lines are deduplicated
//! per request by operation key; metrics and events carry a per-call token
//! and are never deduplicated.
//!
//! Without an ambient request every helper still emits. Only the
//! coordinator's raw [`log_once`](super::coordinator::log_once) suppresses in
//! that case.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use once_cell::sync::Lazy;
use serde_json::Value;
use uuid::Uuid;

use super::context::RequestContext;
use super::coordinator::get_context;
use super::error_context::{ErrorInfo, Severity};
use super::fields::{merge_missing, summarize_payload, Fields};
use super::layer::Layer;
use super::sink::{LogLevel, LogRecord, LogSink, TracingSink};
use crate::error::LayerError;
use crate::telemetry::metrics::{note, note_operation, Emission};

/// Direction of a boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inbound" | "in" => Ok(Direction::Inbound),
            "outbound" | "out" => Ok(Direction::Outbound),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

pub fn boundary_key(layer: Layer, operation: &str, direction: Direction) -> String {
    format!("{layer}.boundary.{operation}.{direction}")
}

/// Key for the `start` or `end` line of a timed operation.
pub fn operation_key(layer: Layer, name: &str, phase: &str) -> String {
    format!("{layer}.operation.{name}.{phase}")
}

/// Metric keys are unique per call.
pub fn metric_key(layer: Layer, name: &str) -> String {
    format!("{layer}.metric.{name}.{}", call_token())
}

/// Event keys are unique per call.
pub fn event_key(layer: Layer, event_type: &str, name: &str) -> String {
    format!("{layer}.event.{event_type}.{name}.{}", call_token())
}

fn call_token() -> String {
    let mut buf = Uuid::encode_buffer();
    Uuid::new_v4().simple().encode_lower(&mut buf)[..8].to_string()
}

/// Field map the body of an operation may add to while it runs.
///
/// Entries present when the operation ends are attached to its end line.
#[derive(Debug, Clone, Default)]
pub struct OperationContext(Arc<Mutex<Fields>>);

impl OperationContext {
    fn new(fields: Fields) -> Self {
        Self(Arc::new(Mutex::new(fields)))
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn snapshot(&self) -> Fields {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Logger bound to a module name and a layer.
pub struct UnifiedLogger {
    name: String,
    layer: Layer,
    sink: Arc<dyn LogSink>,
}

impl fmt::Debug for UnifiedLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnifiedLogger")
            .field("name", &self.name)
            .field("layer", &self.layer)
            .finish_non_exhaustive()
    }
}

impl UnifiedLogger {
    /// Create a logger writing to `tracing`.
    ///
    /// Fails if `layer` is not one of `api`, `service`, `core`, `infrastructure`.
    pub fn new(name: impl Into<String>, layer: &str) -> Result<Self, LayerError> {
        Ok(Self::for_layer(name, layer.parse()?))
    }

    pub fn for_layer(name: impl Into<String>, layer: Layer) -> Self {
        Self {
            name: name.into(),
            layer,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    fn emit(&self, request: Option<&RequestContext>, level: LogLevel, message: &str, extra: Fields) {
        let mut fields = request.map(RequestContext::identity_fields).unwrap_or_default();
        fields.insert("layer".to_string(), self.layer.as_str().into());
        merge_missing(&mut fields, extra);
        self.sink.emit(LogRecord::new(level, self.name.as_str(), message, fields));
        note(Emission::Emitted);
    }

    /// Emit unless `key` was already logged in `request`. Returns whether it emitted.
    fn emit_keyed(
        &self,
        request: Option<&RequestContext>,
        key: &str,
        level: LogLevel,
        message: &str,
        mut extra: Fields,
    ) -> bool {
        if let Some(ctx) = request {
            if !ctx.mark_logged(key) {
                note(Emission::Deduplicated);
                return false;
            }
        }
        extra.insert("operation_key".to_string(), key.into());
        self.emit(request, level, message, extra);
        true
    }

    /// Log a crossing of this layer's boundary, once per request.
    ///
    /// `data` is described by shape only, never logged verbatim.
    pub fn log_boundary(
        &self,
        operation: &str,
        direction: Direction,
        data: Option<&Value>,
        extra: Fields,
    ) {
        let request = get_context();
        let key = boundary_key(self.layer, operation, direction);

        let mut fields = Fields::new();
        fields.insert("event_type".to_string(), "service_boundary".into());
        fields.insert("operation".to_string(), operation.into());
        fields.insert("direction".to_string(), direction.as_str().into());
        if let Some(data) = data {
            fields.insert("data_summary".to_string(), summarize_payload(data));
        }
        merge_missing(&mut fields, extra);

        let message = format!("{} {operation} {direction}", self.layer);
        self.emit_keyed(request.as_deref(), &key, LogLevel::Info, &message, fields);
    }

    /// Run `body` as a timed operation.
    ///
    /// Start and end lines are deduplicated per request by name. On failure
    /// the error is recorded in the request's error context, logged unless
    /// cascade suppression applies, and returned unchanged.
    pub fn operation<T, E, F>(&self, name: &str, fields: Fields, body: F) -> Result<T, E>
    where
        F: FnOnce(&OperationContext) -> Result<T, E>,
        E: fmt::Display,
    {
        let scope = OperationScope::begin(self, name, fields);
        match body(&scope.context) {
            Ok(value) => {
                scope.succeed();
                Ok(value)
            }
            Err(error) => {
                scope.fail(ErrorInfo::from_error(&error));
                Err(error)
            }
        }
    }

    /// Async counterpart of [`operation`](Self::operation).
    ///
    /// Dropping the returned future before it completes is logged as a
    /// `Cancelled` failure.
    pub async fn operation_async<T, E, F, Fut>(&self, name: &str, fields: Fields, body: F) -> Result<T, E>
    where
        F: FnOnce(OperationContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let scope = OperationScope::begin(self, name, fields);
        match body(scope.context.clone()).await {
            Ok(value) => {
                scope.succeed();
                Ok(value)
            }
            Err(error) => {
                scope.fail(ErrorInfo::from_error(&error));
                Err(error)
            }
        }
    }

    /// Log a measurement. Every call emits.
    pub fn log_metric(&self, name: &str, value: f64, unit: &str, tags: Fields) {
        let request = get_context();
        let key = metric_key(self.layer, name);

        let mut fields = Fields::new();
        fields.insert("event_type".to_string(), "metric".into());
        fields.insert("metric_name".to_string(), name.into());
        fields.insert("value".to_string(), value.into());
        fields.insert("unit".to_string(), unit.into());
        if !tags.is_empty() {
            fields.insert("tags".to_string(), Value::Object(tags));
        }

        let message = format!("Metric {name}={value} {unit}");
        self.emit_keyed(request.as_deref(), &key, LogLevel::Info, &message, fields);
    }

    /// Log a business or technical event. Every call emits.
    pub fn log_event(&self, event_type: &str, name: &str, level: LogLevel, data: Option<Value>) {
        let request = get_context();
        let key = event_key(self.layer, event_type, name);

        let mut fields = Fields::new();
        fields.insert("event_type".to_string(), event_type.into());
        fields.insert("event_name".to_string(), name.into());
        if let Some(data) = data {
            fields.insert("data".to_string(), data);
        }

        let message = format!("Event {event_type}: {name}");
        self.emit_keyed(request.as_deref(), &key, level, &message, fields);
    }

    pub fn debug(&self, message: &str, fields: Fields) {
        self.emit(get_context().as_deref(), LogLevel::Debug, message, fields);
    }

    pub fn info(&self, message: &str, fields: Fields) {
        self.emit(get_context().as_deref(), LogLevel::Info, message, fields);
    }

    pub fn warning(&self, message: &str, fields: Fields) {
        self.emit(get_context().as_deref(), LogLevel::Warning, message, fields);
    }

    /// Log and record an error for this layer unless suppressed as a cascade.
    pub fn error(&self, message: &str, error: Option<&ErrorInfo>, fields: Fields) {
        self.report_error(LogLevel::Error, Severity::Medium, message, error, fields);
    }

    /// Like [`error`](Self::error) at critical severity.
    pub fn critical(&self, message: &str, error: Option<&ErrorInfo>, fields: Fields) {
        self.report_error(LogLevel::Critical, Severity::Critical, message, error, fields);
    }

    fn report_error(
        &self,
        level: LogLevel,
        severity: Severity,
        message: &str,
        error: Option<&ErrorInfo>,
        mut fields: Fields,
    ) {
        let info = error
            .cloned()
            .unwrap_or_else(|| ErrorInfo::new("Error", message));
        fields.insert("error_type".to_string(), info.error_type.as_str().into());
        fields.insert("error_message".to_string(), info.message.as_str().into());

        let request = get_context();
        if record_error(request.as_deref(), self.layer, info, severity, &fields) {
            self.emit(request.as_deref(), level, message, fields);
        } else {
            note(Emission::ErrorSuppressed);
        }
    }
}

/// Record `error` against `layer` unless it is a cascade of an earlier one.
///
/// Returns whether it was recorded and should be logged. Suppressed errors
/// leave the error context untouched.
fn record_error(
    request: Option<&RequestContext>,
    layer: Layer,
    error: ErrorInfo,
    severity: Severity,
    metadata: &Fields,
) -> bool {
    let Some(ctx) = request else {
        return true;
    };
    let mut errors = ctx.error_context();
    if !errors.should_log_error(layer.as_str()) {
        return false;
    }
    errors.add_layer_error(layer.as_str(), error, severity, Some(metadata.clone()));
    true
}

/// Bookkeeping shared by the sync and async operation wrappers.
///
/// Dropped without [`succeed`](Self::succeed) or [`fail`](Self::fail), it
/// reports the operation as cancelled (or panicked).
struct OperationScope<'a> {
    logger: &'a UnifiedLogger,
    name: String,
    context: OperationContext,
    request: Option<Arc<RequestContext>>,
    started: Instant,
    finished: bool,
}

impl<'a> OperationScope<'a> {
    fn begin(logger: &'a UnifiedLogger, name: &str, fields: Fields) -> Self {
        let request = get_context();
        let context = OperationContext::new(fields);

        let mut start_fields = context.snapshot();
        start_fields.insert("event_type".to_string(), "operation_start".into());
        start_fields.insert("operation".to_string(), name.into());
        logger.emit_keyed(
            request.as_deref(),
            &operation_key(logger.layer, name, "start"),
            LogLevel::Info,
            &format!("Starting {name}"),
            start_fields,
        );

        Self {
            logger,
            name: name.to_string(),
            context,
            request,
            started: Instant::now(),
            finished: false,
        }
    }

    fn metrics_key(&self) -> String {
        format!("{}.{}", self.logger.layer, self.name)
    }

    fn succeed(mut self) {
        self.finished = true;
        let elapsed = self.started.elapsed();
        let secs = elapsed.as_secs_f64();
        let layer = self.logger.layer;

        let timing = self
            .request
            .as_ref()
            .map(|ctx| ctx.performance_tracker().record_timing(layer.as_str(), &self.name, secs));
        let exceeded = timing.is_some_and(|t| t.exceeded);

        let mut fields = self.context.snapshot();
        fields.insert("event_type".to_string(), "operation_end".into());
        fields.insert("operation".to_string(), self.name.as_str().into());
        fields.insert("duration_seconds".to_string(), secs.into());
        if let Some(timing) = timing {
            fields.insert("threshold_seconds".to_string(), timing.threshold.into());
            fields.insert("threshold_exceeded".to_string(), timing.exceeded.into());
        }

        let (level, message) = if exceeded {
            (LogLevel::Warning, format!("Completed {} (slow: {secs:.3}s)", self.name))
        } else {
            (LogLevel::Info, format!("Completed {}", self.name))
        };
        self.logger.emit_keyed(
            self.request.as_deref(),
            &operation_key(layer, &self.name, "end"),
            level,
            &message,
            fields,
        );
        note_operation(&self.metrics_key(), elapsed, exceeded, false);
    }

    fn fail(mut self, error: ErrorInfo) {
        self.finished = true;
        self.report_failure(error);
    }

    fn report_failure(&self, error: ErrorInfo) {
        let elapsed = self.started.elapsed();
        let secs = elapsed.as_secs_f64();

        let mut fields = self.context.snapshot();
        fields.insert("event_type".to_string(), "operation_failed".into());
        fields.insert("operation".to_string(), self.name.as_str().into());
        fields.insert("duration_seconds".to_string(), secs.into());
        fields.insert("error_type".to_string(), error.error_type.as_str().into());
        fields.insert("error_message".to_string(), error.message.as_str().into());

        let request = self.request.as_deref();
        if record_error(request, self.logger.layer, error, Severity::Medium, &fields) {
            let message = format!("Failed {}", self.name);
            self.logger.emit(request, LogLevel::Error, &message, fields);
        } else {
            note(Emission::ErrorSuppressed);
        }
        note_operation(&self.metrics_key(), elapsed, false, true);
    }
}

impl Drop for OperationScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let error = if std::thread::panicking() {
            ErrorInfo::new("Panic", "operation panicked")
        } else {
            ErrorInfo::new("Cancelled", "operation dropped before completion")
        };
        self.report_failure(error);
    }
}

static LOGGERS: Lazy<Mutex<HashMap<(String, Layer), Arc<UnifiedLogger>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Shared logger for `(name, layer)`. Repeated calls return the same instance.
pub fn get_logger(name: &str, layer: &str) -> Result<Arc<UnifiedLogger>, LayerError> {
    let layer: Layer = layer.parse()?;
    let mut loggers = LOGGERS.lock().unwrap_or_else(PoisonError::into_inner);
    let logger = loggers
        .entry((name.to_string(), layer))
        .or_insert_with(|| Arc::new(UnifiedLogger::for_layer(name, layer)));
    Ok(Arc::clone(logger))
}

/// Drop every cached logger.
pub fn clear_logger_cache() {
    LOGGERS.lock().unwrap_or_else(PoisonError::into_inner).clear();
}
