// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide metrics across requests.
//!
//! Per-request state lives in [`crate::logging::RequestContext`] and dies with
//! the request. This module keeps the long-running view: latency histograms
//! per `layer.operation` and counters for what the coordinator emitted,
//! deduplicated, or suppressed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Coordinator outcomes counted in [`EmissionCounts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// A record reached the sink.
    Emitted,
    /// A record was dropped because its operation key was already logged.
    Deduplicated,
    /// An error record was dropped by cascade suppression.
    ErrorSuppressed,
    /// `log_once` ran without an ambient request.
    NoContext,
}

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    operations: RwLock<HashMap<String, OperationMetrics>>,
    emitted: AtomicU64,
    deduplicated: AtomicU64,
    errors_suppressed: AtomicU64,
    no_context: AtomicU64,
    requests: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            emitted: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            errors_suppressed: AtomicU64::new(0),
            no_context: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed or failed operation under its `layer.operation` key.
    pub fn record_operation(&self, key: &str, duration: Duration, exceeded: bool, failed: bool) {
        let mut ops = self.operations.write().unwrap_or_else(PoisonError::into_inner);
        ops.entry(key.to_string())
            .or_default()
            .record(duration, exceeded, failed);
    }

    pub fn record_emission(&self, emission: Emission) {
        let counter = match emission {
            Emission::Emitted => &self.emitted,
            Emission::Deduplicated => &self.deduplicated,
            Emission::ErrorSuppressed => &self.errors_suppressed,
            Emission::NoContext => &self.no_context,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn operation_metrics(&self, key: &str) -> Option<OperationMetrics> {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn emission_counts(&self) -> EmissionCounts {
        EmissionCounts {
            emitted: self.emitted.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            errors_suppressed: self.errors_suppressed.load(Ordering::Relaxed),
            no_context: self.no_context.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations: self
                .operations
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            counts: self.emission_counts(),
            uptime: self.uptime(),
        }
    }

    pub fn reset(&self) {
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        for counter in [
            &self.emitted,
            &self.deduplicated,
            &self.errors_suppressed,
            &self.no_context,
            &self.requests,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmissionCounts {
    pub emitted: u64,
    pub deduplicated: u64,
    pub errors_suppressed: u64,
    pub no_context: u64,
    pub requests: u64,
}

/// Latency and outcome aggregate for one `layer.operation`.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    pub count: u64,
    pub failures: u64,
    /// Runs slower than the layer's threshold.
    pub violations: u64,
    pub total_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub histogram: Histogram,
}

impl OperationMetrics {
    pub fn new() -> Self {
        Self {
            count: 0,
            failures: 0,
            violations: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            histogram: Histogram::default(),
        }
    }

    pub fn record(&mut self, duration: Duration, exceeded: bool, failed: bool) {
        self.count += 1;
        self.failures += u64::from(failed);
        self.violations += u64::from(exceeded);
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.histogram.record(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_duration / n,
            Err(_) => Duration::from_secs_f64(self.total_duration.as_secs_f64() / self.count as f64),
        }
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-bucket latency histogram.
///
/// Bucket bounds are upper limits in microseconds; one overflow bucket
/// follows the last bound.
#[derive(Debug, Clone)]
pub struct Histogram {
    bounds: Vec<u64>,
    counts: Vec<u64>,
}

impl Histogram {
    pub fn with_buckets(bounds: Vec<u64>) -> Self {
        let counts = vec![0; bounds.len() + 1];
        Self { bounds, counts }
    }

    pub fn record(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let idx = self.bounds.partition_point(|&bound| bound < micros);
        self.counts[idx] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Upper bound of the bucket containing the `p`th percentile.
    ///
    /// The overflow bucket reports ten times the last bound.
    pub fn percentile(&self, p: f64) -> Duration {
        let total = self.total();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = ((total as f64 * p / 100.0).ceil() as u64).max(1);
        let mut seen = 0u64;
        for (idx, count) in self.counts.iter().enumerate() {
            seen += count;
            if seen >= target {
                let micros = self
                    .bounds
                    .get(idx)
                    .copied()
                    .unwrap_or_else(|| self.bounds.last().copied().unwrap_or(0) * 10);
                return Duration::from_micros(micros);
            }
        }
        Duration::ZERO
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    pub fn p90(&self) -> Duration {
        self.percentile(90.0)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}

impl Default for Histogram {
    /// 1ms, 10ms, 50ms, 100ms, 300ms, 500ms, 1s, 5s. Includes every layer threshold.
    fn default() -> Self {
        Self::with_buckets(vec![
            1_000, 10_000, 50_000, 100_000, 300_000, 500_000, 1_000_000, 5_000_000,
        ])
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub operations: HashMap<String, OperationMetrics>,
    pub counts: EmissionCounts,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Human-readable report, operations sorted by key.
    pub fn format_report(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Coordination Metrics ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));
        report.push_str(&format!(
            "Requests: {}  Emitted: {}  Deduplicated: {}  Errors suppressed: {}  Without context: {}\n",
            self.counts.requests,
            self.counts.emitted,
            self.counts.deduplicated,
            self.counts.errors_suppressed,
            self.counts.no_context
        ));

        if !self.operations.is_empty() {
            report.push_str("\nOperations:\n");
            let mut keys: Vec<&String> = self.operations.keys().collect();
            keys.sort();
            for key in keys {
                let m = &self.operations[key];
                report.push_str(&format!(
                    "  {key}: {} runs, {} failed, {} slow, avg {:.2?}, p99 {:.2?}\n",
                    m.count,
                    m.failures,
                    m.violations,
                    m.avg_duration(),
                    m.histogram.p99()
                ));
            }
        }

        report
    }
}

/// Count a coordinator outcome in [`GLOBAL_METRICS`] when telemetry is enabled.
#[inline]
pub(crate) fn note(emission: Emission) {
    #[cfg(feature = "telemetry")]
    GLOBAL_METRICS.record_emission(emission);
    #[cfg(not(feature = "telemetry"))]
    let _ = emission;
}

#[inline]
pub(crate) fn note_request() {
    #[cfg(feature = "telemetry")]
    GLOBAL_METRICS.record_request();
}

/// Record an operation in [`GLOBAL_METRICS`] when telemetry is enabled.
#[inline]
pub(crate) fn note_operation(key: &str, duration: Duration, exceeded: bool, failed: bool) {
    #[cfg(feature = "telemetry")]
    GLOBAL_METRICS.record_operation(key, duration, exceeded, failed);
    #[cfg(not(feature = "telemetry"))]
    let _ = (key, duration, exceeded, failed);
}
