// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request-scoped log coordination.
//!
//! Every inbound request gets a [`RequestContext`] that travels implicitly with
//! the code handling it. Layer-bound [`UnifiedLogger`]s consult it so that each
//! boundary crossing and operation start/end is logged once per request, errors
//! that cascade through layers are logged once, and slow operations are
//! flagged against per-layer thresholds.
//!
//! # Architecture
//!
//! ```text
//! LoggingCoordinator ──▶ RequestContext ──┬── logged operation keys
//!        │                    ▲           ├── ErrorContext ── patterns, recovery
//!        │                    │           └── PerformanceTracker
//!        │             get_context()
//!        ▼                    │
//!   end_request()      UnifiedLogger (api / service / core / infrastructure)
//!   RequestSummary            │
//!                             ▼
//!                          LogSink (tracing by default)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use casetrace::fields;
//! use casetrace::logging::{get_logger, Direction, LoggingCoordinator};
//!
//! let coordinator = LoggingCoordinator::new();
//! let log = get_logger("cases", "api")?;
//!
//! let (result, summary) = coordinator
//!     .run_request(fields! { "session_id" => "s-1" }, async {
//!         log.log_boundary("create_case", Direction::Inbound, None, fields! {});
//!         log.operation_async("create_case", fields! {}, |_| handle()).await
//!     })
//!     .await;
//! ```

mod context;
mod coordinator;
mod error_context;
mod fields;
mod layer;
mod patterns;
mod performance;
mod recovery;
mod sink;
mod unified;

pub use context::{RequestContext, RequestSummary};
pub use coordinator::{
    coordinator, current_correlation_id, end_request, get_context, in_current_request,
    init_coordinator, log_once, start_request, with_request_scope, CoordinatorSettings,
    LoggingCoordinator,
};
pub use error_context::{
    default_layer_configs, ErrorContext, ErrorInfo, ErrorSummary, LayerErrorConfig,
    LayerErrorEntry, LayerErrorRecord, LayerSummary, Severity, SeverityWeights,
};
pub use fields::{summarize_payload, Fields};
pub use layer::Layer;
pub use patterns::{detect_patterns, ErrorPattern, PatternType, TimelineEntry, MIN_ERRORS_FOR_DETECTION};
pub use performance::{default_thresholds, PerformanceTracker, TimingOutcome, DEFAULT_THRESHOLD_SECS};
pub use recovery::{
    CircuitBreaker, GracefulDegradation, RecoveryAction, RecoveryOutcome, RecoveryRegistry,
    RecoveryStrategy, RetryWithBackoff, CIRCUIT_BREAKER, GRACEFUL_DEGRADATION, RETRY_WITH_BACKOFF,
};
pub use sink::{LogLevel, LogRecord, LogSink, MemorySink, TracingSink};
pub use unified::{
    boundary_key, clear_logger_cache, event_key, get_logger, metric_key, operation_key, Direction,
    OperationContext, UnifiedLogger,
};
