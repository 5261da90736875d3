// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request lifecycle and the ambient request context.
//!
//! The ambient [`RequestContext`] lives in a tokio task-local slot when one is
//! installed for the current task, and in a thread-local slot on threads
//! outside the tokio runtime. Tasks on a runtime share their worker threads,
//! so there the thread slot is never used: a task without an installed slot
//! has no ambient request. Two concurrently running requests therefore never
//! see each other's context.
//!
//! ```text
//!  run_request / with_request_scope      start_request()        end_request()
//!  ─────────── installs slot ──────────▶ fills slot ──▶ ... ──▶ empties slot
//!                                             │
//!                     get_context() / log_once() / UnifiedLogger read it
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::Instrument;

use super::context::{RequestContext, RequestSummary};
use super::error_context::{default_layer_configs, ErrorContext, LayerErrorConfig};
use super::fields::{merge_missing, Fields};
use super::performance::{default_thresholds, PerformanceTracker};
use super::recovery::RecoveryRegistry;
use super::sink::{LogLevel, LogRecord, LogSink};
use crate::error::ConfigError;
use crate::telemetry::metrics::{note, note_request, Emission};
use crate::telemetry::{CorrelationId, CorrelationIdExt};

type Slot = RefCell<Option<Arc<RequestContext>>>;

tokio::task_local! {
    static TASK_CONTEXT: Slot;
}

thread_local! {
    static THREAD_CONTEXT: Slot = const { RefCell::new(None) };
}

/// Run `f` against the slot for the current task, or the current thread.
///
/// `None` inside a tokio runtime when the task has no slot installed.
fn with_slot<R>(f: impl FnOnce(&Slot) -> R) -> Option<R> {
    if TASK_CONTEXT.try_with(|_| ()).is_ok() {
        Some(TASK_CONTEXT.with(f))
    } else if tokio::runtime::Handle::try_current().is_ok() {
        None
    } else {
        Some(THREAD_CONTEXT.with(f))
    }
}

/// The ambient request context, if a request is active.
pub fn get_context() -> Option<Arc<RequestContext>> {
    with_slot(|slot| slot.borrow().clone()).flatten()
}

/// Correlation ID of the ambient request, for outgoing headers.
pub fn current_correlation_id() -> Option<CorrelationId> {
    get_context().map(|ctx| ctx.correlation_id())
}

/// Run `fut` with its own empty ambient slot.
///
/// Use this around work that pairs `start_request` / `end_request` itself, or
/// around spawned tasks that should not inherit anything.
pub async fn with_request_scope<F: Future>(fut: F) -> F::Output {
    TASK_CONTEXT.scope(RefCell::new(None), fut).await
}

/// Run `fut` inside the current ambient request.
///
/// Task-locals do not cross `tokio::spawn`; wrap the spawned future with this
/// to carry the request along.
pub fn in_current_request<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    TASK_CONTEXT.scope(RefCell::new(get_context()), fut)
}

/// Configuration applied to every request a coordinator starts.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub performance_thresholds: HashMap<String, f64>,
    pub layer_configs: Arc<HashMap<String, LayerErrorConfig>>,
    pub recovery_registry: Arc<RecoveryRegistry>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            performance_thresholds: default_thresholds(),
            layer_configs: Arc::new(default_layer_configs()),
            recovery_registry: Arc::new(RecoveryRegistry::default()),
        }
    }
}

/// Starts and ends request contexts and owns the `log_once` primitive.
#[derive(Debug, Clone, Default)]
pub struct LoggingCoordinator {
    settings: CoordinatorSettings,
}

impl LoggingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: CoordinatorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Create a context and install it as the ambient one.
    ///
    /// A context already installed in the same slot is replaced without
    /// producing a summary. Inside a tokio runtime the task needs a slot from
    /// [`run_request`](Self::run_request) or [`with_request_scope`]; without
    /// one the context is returned but not installed.
    pub fn start_request(&self, attributes: Fields) -> Arc<RequestContext> {
        let error_context = ErrorContext::with_config(
            Arc::clone(&self.settings.layer_configs),
            Arc::clone(&self.settings.recovery_registry),
        );
        let tracker =
            PerformanceTracker::with_thresholds(self.settings.performance_thresholds.clone());
        let ctx = Arc::new(RequestContext::with_parts(attributes, error_context, tracker));

        if with_slot(|slot| slot.replace(Some(Arc::clone(&ctx)))).is_none() {
            tracing::warn!(
                correlation_id = %ctx.correlation_id(),
                "Request started in a task without a request scope; context not installed"
            );
        }
        note_request();

        tracing::trace!(correlation_id = %ctx.correlation_id(), "Request started");
        ctx
    }

    /// Clear the ambient context and summarize it.
    ///
    /// Returns `None` when no request is active.
    pub fn end_request(&self) -> Option<RequestSummary> {
        let ctx = with_slot(|slot| slot.borrow_mut().take()).flatten()?;
        Some(ctx.summary())
    }

    /// Emit through `sink` unless `operation_key` was already logged in this request.
    ///
    /// Without an ambient request nothing is emitted: there is no ledger to
    /// deduplicate against.
    pub fn log_once(
        &self,
        operation_key: &str,
        sink: &dyn LogSink,
        level: LogLevel,
        message: &str,
        extra: Fields,
    ) {
        let Some(ctx) = get_context() else {
            note(Emission::NoContext);
            return;
        };
        if !ctx.mark_logged(operation_key) {
            note(Emission::Deduplicated);
            return;
        }

        let mut fields = ctx.identity_fields();
        fields.insert("operation_key".to_string(), operation_key.into());
        merge_missing(&mut fields, extra);
        sink.emit(LogRecord::new(level, "casetrace.coordinator", message, fields));
        note(Emission::Emitted);
    }

    /// Run `fut` as one request: fresh slot, start, await, end, log summary.
    ///
    /// The request ends whether `fut` succeeds or fails.
    pub async fn run_request<F: Future>(
        &self,
        attributes: Fields,
        fut: F,
    ) -> (F::Output, Option<RequestSummary>) {
        TASK_CONTEXT
            .scope(RefCell::new(None), async {
                let ctx = self.start_request(attributes);
                let span = tracing::info_span!("request", correlation_id = tracing::field::Empty);
                span.record_correlation_id(&ctx.correlation_id());
                drop(ctx);

                let output = fut.instrument(span).await;
                let summary = self.end_request();
                if let Some(summary) = &summary {
                    summary.log();
                }
                (output, summary)
            })
            .await
    }

    /// Synchronous counterpart of [`run_request`](Self::run_request).
    pub fn run_request_sync<T>(
        &self,
        attributes: Fields,
        f: impl FnOnce() -> T,
    ) -> (T, Option<RequestSummary>) {
        TASK_CONTEXT.sync_scope(RefCell::new(None), || {
            let ctx = self.start_request(attributes);
            let span = tracing::info_span!("request", correlation_id = tracing::field::Empty);
            span.record_correlation_id(&ctx.correlation_id());
            drop(ctx);

            let output = span.in_scope(f);
            let summary = self.end_request();
            if let Some(summary) = &summary {
                summary.log();
            }
            (output, summary)
        })
    }
}

static COORDINATOR: OnceCell<LoggingCoordinator> = OnceCell::new();

/// Install the process-wide coordinator. Only the first call succeeds.
pub fn init_coordinator(settings: CoordinatorSettings) -> Result<(), ConfigError> {
    COORDINATOR
        .set(LoggingCoordinator::with_settings(settings))
        .map_err(|_| ConfigError::AlreadyInitialized)
}

/// The process-wide coordinator, with default settings if never initialized.
pub fn coordinator() -> &'static LoggingCoordinator {
    COORDINATOR.get_or_init(LoggingCoordinator::new)
}

/// [`LoggingCoordinator::start_request`] on the process-wide coordinator.
pub fn start_request(attributes: Fields) -> Arc<RequestContext> {
    coordinator().start_request(attributes)
}

/// [`LoggingCoordinator::end_request`] on the process-wide coordinator.
pub fn end_request() -> Option<RequestSummary> {
    coordinator().end_request()
}

/// [`LoggingCoordinator::log_once`] on the process-wide coordinator.
pub fn log_once(operation_key: &str, sink: &dyn LogSink, level: LogLevel, message: &str, extra: Fields) {
    coordinator().log_once(operation_key, sink, level, message, extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::logging::error_context::{ErrorInfo, Severity};
    use crate::logging::sink::MemorySink;

    #[test]
    fn test_no_context_by_default() {
        std::thread::spawn(|| {
            assert!(get_context().is_none());
            assert!(current_correlation_id().is_none());
            assert!(LoggingCoordinator::new().end_request().is_none());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_start_and_end_on_thread() {
        std::thread::spawn(|| {
            let coordinator = LoggingCoordinator::new();
            let ctx = coordinator.start_request(fields! { "method" => "GET" });
            let ambient = get_context().unwrap();
            assert!(Arc::ptr_eq(&ctx, &ambient));
            assert_eq!(current_correlation_id(), Some(ctx.correlation_id()));

            let summary = coordinator.end_request().unwrap();
            assert_eq!(summary.correlation_id, ctx.correlation_id().to_string());
            assert_eq!(summary.attributes["method"], "GET");
            assert!(get_context().is_none());
            assert!(coordinator.end_request().is_none());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_start_replaces_ambient() {
        std::thread::spawn(|| {
            let coordinator = LoggingCoordinator::new();
            let first = coordinator.start_request(Fields::new());
            let second = coordinator.start_request(Fields::new());
            let ambient = get_context().unwrap();
            assert!(!Arc::ptr_eq(&first, &ambient));
            assert!(Arc::ptr_eq(&second, &ambient));
            coordinator.end_request();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_log_once_dedup() {
        let coordinator = LoggingCoordinator::new();
        let sink = MemorySink::new();
        let (_, summary) = coordinator.run_request_sync(Fields::new(), || {
            for _ in 0..3 {
                coordinator.log_once("core.custom.x", &sink, LogLevel::Info, "x happened", fields! { "n" => 1 });
            }
            coordinator.log_once("core.custom.y", &sink, LogLevel::Info, "y happened", Fields::new());
        });

        assert_eq!(sink.count_message("x happened"), 1);
        assert_eq!(sink.count_message("y happened"), 1);
        assert_eq!(summary.unwrap().operations_logged, 2);

        let record = &sink.records()[0];
        assert_eq!(record.field_str("operation_key"), Some("core.custom.x"));
        assert!(record.field_str("correlation_id").is_some());
        assert_eq!(record.fields["n"], 1);
    }

    #[test]
    fn test_log_once_without_context_is_suppressed() {
        std::thread::spawn(|| {
            let sink = MemorySink::new();
            LoggingCoordinator::new().log_once("api.x", &sink, LogLevel::Error, "lost", Fields::new());
            assert!(sink.is_empty());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_summary_counts() {
        let coordinator = LoggingCoordinator::new();
        let (_, summary) = coordinator.run_request_sync(Fields::new(), || {
            let ctx = get_context().unwrap();
            ctx.mark_logged("one");
            ctx.mark_logged("two");
            ctx.error_context().add_layer_error(
                "service",
                ErrorInfo::new("Timeout", "took too long"),
                Severity::Medium,
                None,
            );
            ctx.performance_tracker().record_timing("api", "list_cases", 0.25);
        });

        let summary = summary.unwrap();
        assert_eq!(summary.operations_logged, 2);
        assert_eq!(summary.errors_encountered, 1);
        assert_eq!(summary.performance_violations, 1);
    }

    #[test]
    fn test_run_request_sync_restores_outer() {
        std::thread::spawn(|| {
            let coordinator = LoggingCoordinator::new();
            let outer = coordinator.start_request(Fields::new());
            let (inner_id, _) = coordinator.run_request_sync(Fields::new(), || {
                current_correlation_id().unwrap()
            });
            assert_ne!(inner_id, outer.correlation_id());
            assert_eq!(current_correlation_id(), Some(outer.correlation_id()));
            coordinator.end_request();
        })
        .join()
        .unwrap();
    }

    #[tokio::test]
    async fn test_run_request_async() {
        let coordinator = LoggingCoordinator::new();
        let (result, summary) = coordinator
            .run_request(fields! { "session_id" => "s-1" }, async {
                tokio::task::yield_now().await;
                let ctx = get_context().unwrap();
                ctx.mark_logged("api.boundary.cases.inbound");
                Err::<(), &str>("handler failed")
            })
            .await;

        assert!(result.is_err());
        let summary = summary.unwrap();
        assert_eq!(summary.operations_logged, 1);
        assert_eq!(summary.session_id.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_in_current_request_crosses_spawn() {
        let coordinator = LoggingCoordinator::new();
        let ((outer, inner), _) = coordinator
            .run_request(Fields::new(), async {
                let outer = current_correlation_id();
                let inner = tokio::spawn(in_current_request(async { current_correlation_id() }))
                    .await
                    .unwrap();
                (outer, inner)
            })
            .await;
        assert!(outer.is_some());
        assert_eq!(outer, inner);
    }

    #[tokio::test]
    async fn test_unscoped_task_gets_no_ambient_context() {
        let ctx = start_request(fields! { "route" => "/unscoped" });
        assert!(get_context().is_none());
        assert!(end_request().is_none());

        // The returned context still works when used directly.
        assert!(ctx.mark_logged("api.boundary.x.inbound"));
        assert_eq!(ctx.summary().operations_logged, 1);
    }

    #[tokio::test]
    async fn test_with_request_scope_isolated() {
        with_request_scope(async {
            assert!(get_context().is_none());
            let ctx = start_request(Fields::new());
            assert_eq!(current_correlation_id(), Some(ctx.correlation_id()));
            assert!(end_request().is_some());
        })
        .await;
    }

    #[test]
    fn test_init_coordinator_once() {
        // The process-wide coordinator may already exist from another test.
        let _ = coordinator();
        assert!(matches!(
            init_coordinator(CoordinatorSettings::default()),
            Err(ConfigError::AlreadyInitialized)
        ));
    }
}
