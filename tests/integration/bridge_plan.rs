//! Functional tests for the reactive bridge.
//!
//! Presentation code observes the store and polling membership through
//! subscribe/snapshot pairs:
//! - Collection views notify on every relevant change.
//! - Per-id views stay silent when other ids change.
//! - A detached bridge answers with defaults and never fails.

use jobtrack_bridge::{Bridge, Observable};
use jobtrack_core::{TaskId, TaskStatus};
use jobtrack_poller::TaskTracker;
use jobtrack_test_utils::{analysis_task, document_task, memory_store, ScriptedFetcher};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&count);
    (count, move || {
        hits.fetch_add(1, Ordering::SeqCst);
    })
}

/// Tenet: a tracked job moves through the bridge's views from polling to
/// finished without the consumer polling anything.
#[tokio::test(start_paused = true)]
async fn views_follow_a_tracked_job_to_completion() {
    let tracker = TaskTracker::new(memory_store());
    let bridge = Bridge::from_tracker(&tracker);

    let tasks = bridge.tasks();
    let job = bridge.task("t1");
    let flag = bridge.is_polling("t1");

    let (list_hits, on_list) = counter();
    let _list_sub = tasks.on_change(on_list);

    tracker.track(
        analysis_task("t1"),
        ScriptedFetcher::statuses(&[TaskStatus::Processing, TaskStatus::Completed]),
    );
    assert!(flag.snapshot());
    assert_eq!(tasks.snapshot().len(), 1);

    tracker.orchestrator().wait_until_stopped("t1").await;

    assert!(!flag.snapshot());
    let finished = job.snapshot();
    assert_eq!(
        Option::as_ref(&finished).map(|t| t.status),
        Some(TaskStatus::Completed)
    );
    // add, processing, completed
    assert_eq!(list_hits.load(Ordering::SeqCst), 3);
}

/// Tenet: a consumer following job X is not notified when job Y changes,
/// in either the record view or the polling flag.
#[tokio::test(start_paused = true)]
async fn per_id_views_ignore_other_jobs() {
    let tracker = TaskTracker::new(memory_store());
    let bridge = Bridge::from_tracker(&tracker);
    tracker.store().add(analysis_task("x"));

    let (task_hits, on_task) = counter();
    let (flag_hits, on_flag) = counter();
    let _t = bridge.task("x").on_change(on_task);
    let _f = bridge.is_polling("x").on_change(on_flag);

    tracker.track(
        document_task("y"),
        ScriptedFetcher::statuses(&[TaskStatus::Processing, TaskStatus::Failed]),
    );
    tracker.orchestrator().wait_until_stopped("y").await;
    tracker.clear_finished();

    assert_eq!(task_hits.load(Ordering::SeqCst), 0);
    assert_eq!(flag_hits.load(Ordering::SeqCst), 0);
}

/// Tenet: snapshots are shared until something relevant changes.
#[tokio::test(start_paused = true)]
async fn polling_set_snapshot_is_stable_between_changes() {
    let tracker = TaskTracker::new(memory_store());
    let bridge = Bridge::from_tracker(&tracker);
    let set = bridge.polling();

    tracker.track(analysis_task("a"), ScriptedFetcher::new());
    tracker.track(analysis_task("b"), ScriptedFetcher::new());

    let first = set.snapshot();
    assert_eq!(*first, vec![TaskId::from("a"), TaskId::from("b")]);
    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    assert!(Arc::ptr_eq(&first, &set.snapshot()));

    tracker.shutdown();
    assert!(set.snapshot().is_empty());
}

/// Tenet: before the store exists, every accessor yields an empty default.
#[test]
fn detached_bridge_serves_defaults() {
    let bridge = Bridge::detached();
    let (hits, on_change) = counter();
    let _sub = bridge.tasks().on_change(on_change);

    assert!(bridge.tasks().snapshot().is_empty());
    assert!(bridge.task("anything").snapshot().is_none());
    assert!(bridge.polling().snapshot().is_empty());
    assert!(!bridge.is_polling("anything").snapshot());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
