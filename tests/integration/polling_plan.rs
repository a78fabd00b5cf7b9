//! Functional tests for the polling orchestrator.
//!
//! These tests run against a paused tokio clock and exercise session semantics:
//! - At most one session per id, iterations strictly sequential.
//! - stop() cancels the in-flight fetch and pending delay; late answers are dropped.
//! - Transient errors are reported once and retried at the slow cadence.
//! - Terminal statuses fire their callback once and end the session once.

use jobtrack_core::{TaskStatus, TaskStore};
use jobtrack_poller::{
    FetchError, PollingOrchestrator, SessionEvent, StatusReport, StopReason,
    DEFAULT_PROCESSING_INTERVAL, DEFAULT_QUEUED_INTERVAL,
};
use jobtrack_test_utils::{
    analysis_task, memory_store, EventRecorder, HangingFetcher, HookCall, HookRecorder,
    ScriptedFetcher, SlowFetcher,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

/// Helper: orchestrator over a fresh store with every hook recorded.
fn make_orchestrator() -> (Arc<TaskStore>, PollingOrchestrator, HookRecorder) {
    let store = memory_store();
    let orchestrator = PollingOrchestrator::new(Arc::clone(&store));
    let hooks = HookRecorder::new();
    orchestrator.configure(hooks.patch()).unwrap();
    (store, orchestrator, hooks)
}

/// Tenet: starting twice before stop yields one session, and its fetches
/// never overlap.
#[tokio::test(start_paused = true)]
async fn duplicate_start_keeps_one_sequential_session() {
    let (_store, orchestrator, _hooks) = make_orchestrator();
    let fetcher = ScriptedFetcher::new();

    assert!(orchestrator.start("t1", fetcher.clone()));
    assert!(!orchestrator.start("t1", fetcher.clone()));
    assert_eq!(orchestrator.active_count(), 1);

    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(fetcher.call_count(), 6);
    assert_eq!(fetcher.max_concurrency(), 1);
    assert!(fetcher.gaps().iter().all(|g| *g >= DEFAULT_PROCESSING_INTERVAL));

    assert!(orchestrator.stop("t1"));
}

/// Tenet: after stop, a fetch that started earlier and resolves later never
/// touches the store and fires no callback.
#[tokio::test(start_paused = true)]
async fn late_response_after_stop_is_dropped() {
    let (store, orchestrator, hooks) = make_orchestrator();
    store.add(analysis_task("t1"));

    let slow = SlowFetcher::new(Duration::from_secs(10), StatusReport::completed(None));
    orchestrator.start("t1", slow.clone());
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(orchestrator.stop("t1"));
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(slow.completed(), 0);
    assert_eq!(store.get("t1").unwrap().status, TaskStatus::Queued);
    assert_eq!(
        hooks.calls(),
        vec![HookCall::Stopped("t1".into(), StopReason::Requested)]
    );
}

/// Tenet: cancellation reaches the fetcher and is never reported as an error.
#[tokio::test(start_paused = true)]
async fn stop_cancels_in_flight_fetch_silently() {
    let (_store, orchestrator, hooks) = make_orchestrator();
    let hanging = HangingFetcher::new();

    orchestrator.start("t1", hanging.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hanging.started(), 1);

    orchestrator.stop("t1");
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(hanging.started(), 1);
    assert_eq!(hooks.count(|c| matches!(c, HookCall::Error(..))), 0);
    assert!(!orchestrator.is_polling("t1"));
}

/// Tenet: a transient error yields exactly one error callback and a retry at
/// the queued interval; the session keeps running.
#[tokio::test(start_paused = true)]
async fn transient_error_is_reported_once_and_retried() {
    let (store, orchestrator, hooks) = make_orchestrator();
    store.add(analysis_task("t1"));

    let fetcher = ScriptedFetcher::new()
        .then(StatusReport::processing())
        .then_err(FetchError::Timeout)
        .then(StatusReport::processing());
    orchestrator.start("t1", fetcher.clone());

    tokio::time::sleep(Duration::from_secs(8)).await;

    assert_eq!(
        hooks.count(|c| matches!(c, HookCall::Error(_, FetchError::Timeout))),
        1
    );
    assert!(orchestrator.is_polling("t1"));
    let gaps = fetcher.gaps();
    assert!(gaps.len() >= 2);
    assert!(gaps[0] >= DEFAULT_PROCESSING_INTERVAL && gaps[0] < DEFAULT_QUEUED_INTERVAL);
    assert!(gaps[1] >= DEFAULT_QUEUED_INTERVAL);

    orchestrator.stop_all();
}

/// Tenet: queued → processing → completed fires one status change per
/// transition, one completion, and the session ends.
#[tokio::test(start_paused = true)]
async fn completion_scenario_fires_each_callback_once() {
    let (store, orchestrator, hooks) = make_orchestrator();
    store.add(analysis_task("t1"));

    let fetcher = ScriptedFetcher::statuses(&[
        TaskStatus::Queued,
        TaskStatus::Processing,
        TaskStatus::Completed,
    ]);
    orchestrator.start("t1", fetcher.clone());

    let reason = orchestrator.wait_until_stopped("t1").await;

    assert_eq!(reason, Some(StopReason::Completed));
    assert!(!orchestrator.is_polling("t1"));
    assert_eq!(
        hooks.calls_for("t1"),
        vec![
            HookCall::StatusChanged("t1".into(), TaskStatus::Processing),
            HookCall::StatusChanged("t1".into(), TaskStatus::Completed),
            HookCall::Completed("t1".into(), None),
            HookCall::Stopped("t1".into(), StopReason::Completed),
        ]
    );
    assert_eq!(fetcher.call_count(), 3);
    assert_eq!(store.get("t1").unwrap().status, TaskStatus::Completed);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fetcher.call_count(), 3);
}

/// Tenet: a backend failure is authoritative; it is reported with its message
/// and never retried.
#[tokio::test(start_paused = true)]
async fn failed_status_ends_session_with_error_payload() {
    let (store, orchestrator, hooks) = make_orchestrator();
    store.add(analysis_task("t1"));

    let fetcher = ScriptedFetcher::new().then(StatusReport::failed("repository not found"));
    orchestrator.start("t1", fetcher.clone());

    assert_eq!(
        orchestrator.wait_until_stopped("t1").await,
        Some(StopReason::Failed)
    );
    assert!(hooks
        .calls()
        .contains(&HookCall::Failed("t1".into(), "repository not found".into())));
    assert_eq!(store.get("t1").unwrap().status, TaskStatus::Failed);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fetcher.call_count(), 1);
}

/// Tenet: stop is idempotent and stop_all ends every session with exactly one
/// Stopped event each.
#[tokio::test(start_paused = true)]
async fn stop_all_stops_each_session_once() {
    let (_store, orchestrator, _hooks) = make_orchestrator();
    let events: EventRecorder<SessionEvent> = EventRecorder::new();
    let _sub = orchestrator.subscribe_sessions(events.listener());

    for id in ["a", "b", "c"] {
        orchestrator.start(id, ScriptedFetcher::new());
    }
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(orchestrator.stop_all(), 3);
    assert_eq!(orchestrator.stop_all(), 0);
    assert!(!orchestrator.stop("a"));
    assert!(!orchestrator.stop("never-started"));

    let stopped = events
        .events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Stopped { .. }))
        .count();
    assert_eq!(stopped, 3);
    assert_eq!(events.len(), 6);
    assert!(orchestrator.active_ids().is_empty());
}
