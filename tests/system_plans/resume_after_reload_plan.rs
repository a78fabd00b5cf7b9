//! System plan: a client reloads mid-flight and picks up where it left off.
//!
//! Flow:
//! 1. Jobs are submitted and tracked against a file-backed store.
//! 2. The process "exits": sessions stop, records stay on disk.
//! 3. A new tracker hydrates from disk and resumes polling unfinished jobs.
//! 4. Finished jobs are cleared; the file reflects the final state.

use jobtrack_core::{FileStorage, StoreConfig, TaskId, TaskStatus, TaskStore};
use jobtrack_poller::{StatusFetcher, StatusReport, StopReason, TaskTracker};
use jobtrack_test_utils::{analysis_task, document_task, HookRecorder, ScriptedFetcher};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn open(dir: &Path) -> Arc<TaskStore> {
    let storage = Arc::new(FileStorage::new(dir));
    Arc::new(TaskStore::open(
        storage,
        StoreConfig::new().with_storage_key("dashboard-jobs"),
    ))
}

#[tokio::test(start_paused = true)]
async fn reload_resumes_unfinished_jobs() {
    let dir = tempfile::tempdir().unwrap();

    // First run: one job finishes, two are still running when we exit.
    {
        let tracker = TaskTracker::new(open(dir.path()));
        tracker.track(
            analysis_task("done"),
            ScriptedFetcher::statuses(&[TaskStatus::Completed]),
        );
        tracker.track(
            analysis_task("running"),
            ScriptedFetcher::statuses(&[TaskStatus::Processing]),
        );
        tracker.track(
            document_task("waiting"),
            ScriptedFetcher::new().with_fallback(Ok(StatusReport::queued())),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(tracker.shutdown(), 2);
    }

    // Second run: hydrate and resume.
    let store = open(dir.path());
    assert_eq!(store.len(), 3);
    assert_eq!(store.get("done").unwrap().status, TaskStatus::Completed);
    let running = store.get("running").unwrap();
    assert_eq!(running.status, TaskStatus::Processing);
    // processing start time belongs to the consumer, the poller never sets it
    assert_eq!(running.started_at, None);

    let tracker = TaskTracker::new(store);
    let hooks = HookRecorder::new();
    tracker.orchestrator().configure(hooks.patch()).unwrap();

    let resumed = tracker.resume_active(|task| {
        let script = match task.id.as_str() {
            "running" => ScriptedFetcher::statuses(&[TaskStatus::Processing, TaskStatus::Completed]),
            _ => ScriptedFetcher::statuses(&[TaskStatus::Processing, TaskStatus::Failed]),
        };
        Some(Arc::new(script) as Arc<dyn StatusFetcher>)
    });
    assert_eq!(resumed, 2);

    let orchestrator = tracker.orchestrator();
    assert_eq!(
        orchestrator.wait_until_stopped("running").await,
        Some(StopReason::Completed)
    );
    orchestrator.wait_until_stopped("waiting").await;

    assert_eq!(hooks.status_changes("running"), vec![TaskStatus::Completed]);
    assert_eq!(
        hooks.status_changes("waiting"),
        vec![TaskStatus::Processing, TaskStatus::Failed]
    );

    let mut cleared = tracker.clear_finished();
    cleared.sort();
    assert_eq!(
        cleared,
        vec![TaskId::from("done"), TaskId::from("running"), TaskId::from("waiting")]
    );

    let after = open(dir.path());
    assert!(after.is_empty());
}
