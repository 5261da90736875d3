// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Emission sinks.
//!
//! The coordinator decides *whether* something is logged; a [`LogSink`]
//! decides *where* it goes. [`TracingSink`] forwards to the `tracing`
//! ecosystem and is the default. [`MemorySink`] keeps records in memory for
//! tests and the demo CLI.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::fields::Fields;

/// Severity of an emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }

    /// Parse a severity label; unknown labels map to `Info`.
    pub fn from_label(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "debug" | "trace" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            "critical" | "fatal" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single emission handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    /// Name of the logger that produced the record.
    pub logger: String,
    pub message: String,
    pub fields: Fields,
}

impl LogRecord {
    pub fn new(
        level: LogLevel,
        logger: impl Into<String>,
        message: impl Into<String>,
        fields: Fields,
    ) -> Self {
        Self {
            level,
            logger: logger.into(),
            message: message.into(),
            fields,
        }
    }

    /// Look up a string field.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Destination for emitted records.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: LogRecord);
}

/// Sink that forwards records to `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

macro_rules! tracing_emit {
    ($macro:ident, $record:expr, $fields:expr, $critical:expr) => {
        tracing::$macro!(
            target: "casetrace",
            logger = %$record.logger,
            layer = $record.field_str("layer"),
            correlation_id = $record.field_str("correlation_id"),
            critical = $critical,
            fields = %$fields,
            "{}",
            $record.message
        )
    };
}

impl LogSink for TracingSink {
    fn emit(&self, record: LogRecord) {
        let fields = Value::Object(record.fields.clone());
        match record.level {
            LogLevel::Debug => tracing_emit!(debug, record, fields, false),
            LogLevel::Info => tracing_emit!(info, record, fields, false),
            LogLevel::Warning => tracing_emit!(warn, record, fields, false),
            LogLevel::Error => tracing_emit!(error, record, fields, false),
            LogLevel::Critical => tracing_emit!(error, record, fields, true),
        }
    }
}

/// Sink that stores records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record emitted so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of records whose message equals `message`.
    pub fn count_message(&self, message: &str) -> usize {
        self.lock().iter().filter(|r| r.message == message).count()
    }

    /// Number of records matching a predicate.
    pub fn count_where(&self, predicate: impl Fn(&LogRecord) -> bool) -> usize {
        self.lock().iter().filter(|r| predicate(r)).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: LogRecord) {
        self.lock().push(record);
    }
}
