// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry plumbing underneath the logging coordinator.
//!
//! - **Subscriber**: installs the `tracing` subscriber the default sink writes to
//! - **Correlation IDs**: one per request, propagated to callers
//! - **Metrics**: process-wide histograms and emission counters
//!
//! # Usage
//!
//! ```rust,ignore
//! use casetrace::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::development())?;
//! ```

mod correlation;
mod init;
pub mod metrics;

pub use correlation::{CorrelationId, CorrelationIdExt, CORRELATION_HEADER};
pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{
    Emission, EmissionCounts, Histogram, Metrics, MetricsSnapshot, OperationMetrics,
    GLOBAL_METRICS,
};
