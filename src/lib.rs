// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! casetrace - request-scoped logging for an AI incident-investigation backend.
//!
//! An investigation request fans out through four layers (API handlers,
//! services, core agent logic, infrastructure adapters) and each of them wants
//! to log. casetrace keeps that output to one line per event per request,
//! correlated by a single ID, with cascading errors collapsed and slow
//! operations flagged.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`logging`] - Request contexts, the coordinator, and layer-bound loggers
//! - [`telemetry`] - Subscriber setup, correlation IDs, and process-wide metrics
//! - [`config`] - Configuration loading and merging
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```rust,ignore
//! use casetrace::fields;
//! use casetrace::logging::{get_logger, LoggingCoordinator};
//!
//! let coordinator = LoggingCoordinator::new();
//! let log = get_logger("hypotheses", "core")?;
//!
//! let (ranked, summary) = coordinator.run_request_sync(fields! { "investigation_id" => "inv-9" }, || {
//!     log.operation("rank_hypotheses", fields! {}, |_| rank())
//! });
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod telemetry;

#[doc(hidden)]
pub use serde_json as __serde_json;

// Re-export commonly used types at crate root
pub use error::{ConfigError, LayerError, RecoveryError, Result};
pub use logging::{
    end_request, get_context, get_logger, log_once, start_request, Direction, Fields, Layer,
    LogLevel, LoggingCoordinator, RequestContext, RequestSummary, UnifiedLogger,
};
pub use telemetry::{init_telemetry, CorrelationId, TelemetryConfig};

/// casetrace version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
