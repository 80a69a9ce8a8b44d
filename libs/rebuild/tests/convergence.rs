//! Convergence worker behaviour against scripted collaborators.
//!
//! Each scenario queues a single router, runs one worker to completion, and
//! checks how many times the control plane was polled and where the router
//! ended up.

mod support;

use std::sync::Arc;
use std::time::Duration;

use fleet_rebuild::{
    Collaborators, Compute, ConvergenceWorker, MemoryReporter, PollIntervals, RebuildContext,
    RouterRef,
};
use support::{
    eventually, fast_intervals, instance, router_state, FailingCompute, ScriptedCompute,
    StaticControlPlane,
};

fn queued_context() -> Arc<RebuildContext> {
    let ctx = Arc::new(RebuildContext::new());
    ctx.enqueue(RouterRef::new("123", "ak-456"));
    ctx
}

fn worker(
    ctx: &Arc<RebuildContext>,
    control_plane: &Arc<StaticControlPlane>,
    compute: &Arc<ScriptedCompute>,
    reporter: &Arc<MemoryReporter>,
) -> ConvergenceWorker {
    ConvergenceWorker::new(
        0,
        Arc::clone(ctx),
        Collaborators::new(control_plane.clone(), compute.clone()),
        reporter.clone(),
        fast_intervals(),
    )
}

fn worker_with(
    ctx: &Arc<RebuildContext>,
    control_plane: &Arc<StaticControlPlane>,
    compute: Arc<dyn Compute>,
    reporter: &Arc<MemoryReporter>,
    intervals: PollIntervals,
) -> ConvergenceWorker {
    ConvergenceWorker::new(
        0,
        Arc::clone(ctx),
        Collaborators::new(control_plane.clone(), compute),
        reporter.clone(),
        intervals,
    )
}

fn uniform_intervals(period: Duration) -> PollIntervals {
    PollIntervals {
        queue: period,
        poll: period,
        batch: period,
    }
}

async fn run_to_exit(worker: ConvergenceWorker) {
    tokio::time::timeout(Duration::from_secs(5), worker.run())
        .await
        .expect("worker should exit after shutdown");
}

#[tokio::test]
async fn test_converges_only_on_new_active_instance() {
    let ctx = queued_context();
    let control_plane = Arc::new(StaticControlPlane::new(router_state(
        "123", "ak-456", "ACTIVE",
    )));
    let compute = Arc::new(ScriptedCompute::new(vec![
        // baseline
        instance("old", "ACTIVE"),
        // polls
        instance("old", "ACTIVE"),
        None,
        instance("new", "DOWN"),
        instance("new", "BUILD"),
        instance("new", "ACTIVE"),
    ]));
    let reporter = Arc::new(MemoryReporter::new());

    let handle = tokio::spawn(worker(&ctx, &control_plane, &compute, &reporter).run());

    eventually(|| ctx.completed_len() == 1).await;
    ctx.signal_shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker should exit")
        .unwrap();

    assert_eq!(control_plane.show_calls(), 5);
    assert_eq!(compute.calls(), 6);
    assert_eq!(ctx.completed_snapshot(), vec![RouterRef::new("123", "ak-456")]);
    assert_eq!(ctx.pending_len(), 0);
    assert!(reporter.contains("123 is ACTIVE, new instance is new"));
    assert!(reporter.contains("Worker 0 is exiting..."));
}

#[tokio::test]
async fn test_instance_rebooting_stops_at_shutdown() {
    let ctx = queued_context();
    let control_plane = Arc::new(StaticControlPlane::new(router_state(
        "123", "ak-456", "ACTIVE",
    )));
    let compute = Arc::new(
        ScriptedCompute::new(vec![
            instance("123", "ACTIVE"),
            None,
            instance("456", "DOWN"),
            instance("456", "BUILD"),
            instance("456", "ACTIVE"),
        ])
        .shutdown_before_last(Arc::clone(&ctx)),
    );
    let reporter = Arc::new(MemoryReporter::new());

    run_to_exit(worker(&ctx, &control_plane, &compute, &reporter)).await;

    assert_eq!(control_plane.show_calls(), 4);
    assert_eq!(ctx.completed_len(), 1);
}

#[tokio::test]
async fn test_new_instance_booting_without_baseline() {
    let ctx = queued_context();
    let control_plane = Arc::new(StaticControlPlane::new(router_state(
        "123", "ak-456", "ACTIVE",
    )));
    let compute = Arc::new(
        ScriptedCompute::new(vec![
            None,
            None,
            None,
            None,
            instance("123", "DOWN"),
            instance("123", "BUILD"),
            instance("123", "ACTIVE"),
        ])
        .shutdown_before_last(Arc::clone(&ctx)),
    );
    let reporter = Arc::new(MemoryReporter::new());

    run_to_exit(worker(&ctx, &control_plane, &compute, &reporter)).await;

    assert_eq!(control_plane.show_calls(), 6);
    assert_eq!(ctx.completed_len(), 1);
}

#[tokio::test]
async fn test_shutdown_abandons_router_mid_poll() {
    let ctx = queued_context();
    let control_plane = Arc::new(StaticControlPlane::new(router_state(
        "123", "ak-456", "DOWN",
    )));
    let mut script = vec![instance("123", "DOWN")];
    script.extend(std::iter::repeat_n(None, 10));
    let compute = Arc::new(ScriptedCompute::new(script).shutdown_before_last(Arc::clone(&ctx)));
    let reporter = Arc::new(MemoryReporter::new());

    run_to_exit(worker(&ctx, &control_plane, &compute, &reporter)).await;

    assert_eq!(control_plane.show_calls(), 10);
    assert_eq!(ctx.completed_len(), 0);
    assert_eq!(ctx.pending_len(), 0);
}

#[tokio::test]
async fn test_error_requeues_router() {
    let ctx = queued_context();
    let control_plane = Arc::new(
        StaticControlPlane::new(router_state("123", "ak-456", "ACTIVE"))
            .failing(1)
            .shutdown_on_failure(Arc::clone(&ctx)),
    );
    let compute = Arc::new(ScriptedCompute::new(vec![instance("old", "ACTIVE")]));
    let reporter = Arc::new(MemoryReporter::new());

    run_to_exit(worker(&ctx, &control_plane, &compute, &reporter)).await;

    assert_eq!(ctx.pending_snapshot(), vec![RouterRef::new("123", "ak-456")]);
    assert_eq!(ctx.completed_len(), 0);
    assert!(reporter.contains(
        "Worker 0 encountered an error handling router 123: connection reset by peer"
    ));
}

#[tokio::test]
async fn test_requeued_router_is_retried_and_converges() {
    let ctx = queued_context();
    let control_plane = Arc::new(
        StaticControlPlane::new(router_state("123", "ak-456", "ACTIVE")).failing(1),
    );
    let compute = Arc::new(ScriptedCompute::new(vec![
        // baseline, first attempt
        instance("old", "ACTIVE"),
        // baseline, after requeue
        instance("old", "ACTIVE"),
        instance("new", "ACTIVE"),
    ]));
    let reporter = Arc::new(MemoryReporter::new());

    let handle = tokio::spawn(worker(&ctx, &control_plane, &compute, &reporter).run());

    eventually(|| ctx.completed_len() == 1).await;
    ctx.signal_shutdown();
    handle.await.unwrap();

    assert_eq!(control_plane.show_calls(), 2);
    assert_eq!(ctx.pending_len(), 0);
    assert_eq!(reporter.count("encountered an error"), 1);
}

#[tokio::test]
async fn test_idle_worker_exits_promptly_on_shutdown() {
    let ctx = Arc::new(RebuildContext::new());
    let control_plane = Arc::new(StaticControlPlane::new(router_state(
        "123", "ak-456", "ACTIVE",
    )));
    let compute = Arc::new(ScriptedCompute::new(vec![]));
    let reporter = Arc::new(MemoryReporter::new());

    let handle = tokio::spawn(worker(&ctx, &control_plane, &compute, &reporter).run());
    tokio::time::sleep(Duration::from_millis(10)).await;

    ctx.signal_shutdown();
    tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("idle worker should notice shutdown within one interval")
        .unwrap();

    assert_eq!(control_plane.show_calls(), 0);
    assert_eq!(compute.calls(), 0);
    assert_eq!(reporter.lines(), vec!["Worker 0 is exiting...".to_string()]);
}

#[tokio::test]
async fn test_baseline_lookup_failures_are_retried_once_per_interval() {
    let ctx = queued_context();
    let control_plane = Arc::new(StaticControlPlane::new(router_state(
        "123", "ak-456", "ACTIVE",
    )));
    let compute = Arc::new(FailingCompute::new());
    let reporter = Arc::new(MemoryReporter::new());

    let handle = tokio::spawn(
        worker_with(
            &ctx,
            &control_plane,
            compute.clone(),
            &reporter,
            uniform_intervals(Duration::from_millis(50)),
        )
        .run(),
    );
    tokio::time::sleep(Duration::from_millis(250)).await;
    ctx.signal_shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker should exit")
        .unwrap();

    // At most one lookup per 50ms interval, plus the first.
    let calls = compute.calls();
    assert!((1..=6).contains(&calls), "{calls} lookups in 250ms");
    assert_eq!(reporter.count("encountered an error"), calls);
    assert_eq!(control_plane.show_calls(), 0);
    assert_eq!(ctx.pending_snapshot(), vec![RouterRef::new("123", "ak-456")]);
}

#[tokio::test]
async fn test_shutdown_cuts_a_long_queue_interval_short() {
    let ctx = Arc::new(RebuildContext::new());
    let control_plane = Arc::new(StaticControlPlane::new(router_state(
        "123", "ak-456", "ACTIVE",
    )));
    let compute = Arc::new(ScriptedCompute::new(vec![]));
    let reporter = Arc::new(MemoryReporter::new());

    let handle = tokio::spawn(
        worker_with(
            &ctx,
            &control_plane,
            compute.clone(),
            &reporter,
            uniform_intervals(Duration::from_secs(60)),
        )
        .run(),
    );
    tokio::time::sleep(Duration::from_millis(10)).await;

    ctx.signal_shutdown();
    tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("worker should wake on shutdown")
        .unwrap();

    assert_eq!(compute.calls(), 0);
}
