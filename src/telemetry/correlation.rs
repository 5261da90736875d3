// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Correlation IDs naming one inbound unit of work.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Header used to propagate correlation IDs to callers and downstream services.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Opaque identifier for one request, carried on every log line it produces.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// First 8 hex characters, for compact display.
    pub fn short(&self) -> String {
        let mut buf = Uuid::encode_buffer();
        self.0.simple().encode_lower(&mut buf)[..8].to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", self.short())
    }
}

impl FromStr for CorrelationId {
    type Err = uuid::Error;

    /// Parse an ID received in a [`CORRELATION_HEADER`] value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl serde::Serialize for CorrelationId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// Extension trait for attaching correlation IDs to tracing spans.
pub trait CorrelationIdExt {
    /// Record the ID into the span's `correlation_id` field.
    ///
    /// The span must declare the field (usually as `tracing::field::Empty`).
    fn record_correlation_id(&self, id: &CorrelationId);
}

impl CorrelationIdExt for tracing::Span {
    fn record_correlation_id(&self, id: &CorrelationId) {
        self.record("correlation_id", id.to_string().as_str());
    }
}
