// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Isolation of concurrent requests across tokio tasks and OS threads.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::time::Duration;

use casetrace::fields;
use casetrace::logging::{
    current_correlation_id, end_request, get_context, in_current_request, start_request,
    with_request_scope, Direction, ErrorInfo, Fields, LoggingCoordinator, MemorySink, Severity,
    UnifiedLogger,
};
use tokio::sync::oneshot;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_do_not_share_context() {
    let (a_marked_tx, a_marked_rx) = oneshot::channel::<()>();

    let task_a = tokio::spawn(with_request_scope(async move {
        let ctx = start_request(fields! { "user_id" => "a" });
        ctx.mark_logged("service.boundary.shared.inbound");
        ctx.error_context().add_layer_error(
            "service",
            ErrorInfo::new("Timeout", "slow"),
            Severity::Medium,
            None,
        );
        let _ = a_marked_tx.send(());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let ambient = get_context().unwrap();
        assert_eq!(ambient.user_id(), Some("a"));
        end_request().unwrap()
    }));

    let task_b = tokio::spawn(with_request_scope(async move {
        let ctx = start_request(fields! { "user_id" => "b" });
        a_marked_rx.await.unwrap();

        assert!(!ctx.has_logged("service.boundary.shared.inbound"));
        assert!(ctx.error_context().should_log_error("service"));
        assert!(ctx.error_context().is_empty());
        assert_eq!(get_context().unwrap().user_id(), Some("b"));
        end_request().unwrap()
    }));

    let (a, b) = (task_a.await.unwrap(), task_b.await.unwrap());
    assert_ne!(a.correlation_id, b.correlation_id);
    assert_eq!(a.operations_logged, 1);
    assert_eq!(b.operations_logged, 0);
    assert_eq!(a.errors_encountered, 1);
    assert_eq!(b.errors_encountered, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn test_unscoped_tasks_on_one_thread_never_share_context() {
    let (b_started_tx, b_started_rx) = oneshot::channel::<String>();

    let task_a = tokio::spawn(async move {
        let ctx = start_request(fields! { "user_id" => "a" });
        let b_id = b_started_rx.await.unwrap();
        let seen = current_correlation_id().map(|id| id.to_string());
        (ctx.correlation_id().to_string(), seen, b_id)
    });

    let task_b = tokio::spawn(async move {
        let ctx = start_request(fields! { "user_id" => "b" });
        ctx.mark_logged("service.boundary.shared.inbound");
        let _ = b_started_tx.send(ctx.correlation_id().to_string());
        get_context().is_some()
    });

    let (a_id, a_sees, b_id) = task_a.await.unwrap();
    let b_installed = task_b.await.unwrap();
    assert_ne!(a_id, b_id);
    assert_ne!(a_sees.as_deref(), Some(b_id.as_str()));
    assert_eq!(a_sees, None);
    assert!(!b_installed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_requests_each_log_their_own_boundary() {
    let sink = Arc::new(MemorySink::new());
    let logger = Arc::new(UnifiedLogger::new("cases", "api").unwrap().with_sink(sink.clone()));
    let coordinator = Arc::new(LoggingCoordinator::new());

    let mut handles = Vec::new();
    for n in 0..16 {
        let logger = Arc::clone(&logger);
        let coordinator = Arc::clone(&coordinator);
        handles.push(tokio::spawn(async move {
            let (_, summary) = coordinator
                .run_request(fields! { "n" => n }, async {
                    for _ in 0..3 {
                        logger.log_boundary("list_cases", Direction::Inbound, None, Fields::new());
                        tokio::task::yield_now().await;
                    }
                })
                .await;
            summary.unwrap()
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let summary = handle.await.unwrap();
        assert_eq!(summary.operations_logged, 1);
        ids.insert(summary.correlation_id);
    }
    assert_eq!(ids.len(), 16);
    assert_eq!(sink.len(), 16);

    let logged_ids: HashSet<String> = sink
        .records()
        .iter()
        .filter_map(|r| r.field_str("correlation_id").map(str::to_string))
        .collect();
    assert_eq!(logged_ids, ids);
}

#[test]
fn test_threads_do_not_share_context() {
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["x", "y"]
        .into_iter()
        .map(|name| {
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let ctx = start_request(fields! { "session_id" => name });
                ctx.mark_logged(format!("core.operation.{name}.start"));
                barrier.wait();

                let ambient = get_context().unwrap();
                assert_eq!(ambient.session_id(), Some(name));
                let other = if name == "x" { "y" } else { "x" };
                assert!(!ambient.has_logged(&format!("core.operation.{other}.start")));
                end_request().unwrap()
            })
        })
        .collect();

    let summaries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(summaries[0].operations_logged, 1);
    assert_eq!(summaries[1].operations_logged, 1);
    assert_ne!(summaries[0].correlation_id, summaries[1].correlation_id);
}

#[tokio::test]
async fn test_spawned_work_joins_request_explicitly() {
    let coordinator = LoggingCoordinator::new();
    let (ids, _) = coordinator
        .run_request(Fields::new(), async {
            let parent = current_correlation_id();
            let detached = tokio::spawn(async { current_correlation_id() }).await.unwrap();
            let joined = tokio::spawn(in_current_request(async { current_correlation_id() }))
                .await
                .unwrap();
            (parent, detached, joined)
        })
        .await;

    let (parent, detached, joined) = ids;
    assert!(parent.is_some());
    assert_ne!(detached, parent);
    assert_eq!(joined, parent);
}
