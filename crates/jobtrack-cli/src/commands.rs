//! Subcommand bodies that do not need their own module

use crate::config::JobtrackConfig;
use anyhow::{Context, Result};
use jobtrack_core::{FileStorage, Task, TaskStore};
use jobtrack_poller::StopReason;
use std::fmt::Write as _;
use std::sync::Arc;

/// Open the file-backed store described by `config`
pub fn open_store(config: &JobtrackConfig) -> Result<Arc<TaskStore>> {
    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("failed to create state dir {}", config.state_dir.display()))?;
    let storage = Arc::new(FileStorage::new(&config.state_dir));
    Ok(Arc::new(TaskStore::open(storage, config.store.clone())))
}

/// Render tasks as a table or as JSON
pub fn render_tasks(tasks: &[Task], json: bool) -> Result<String> {
    if json {
        return serde_json::to_string_pretty(tasks).context("failed to encode tasks");
    }

    if tasks.is_empty() {
        return Ok("no tasks\n".to_string());
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<38} {:<20} {:<11} {:<20} STARTED",
        "ID", "TYPE", "STATUS", "CREATED"
    );
    for task in tasks {
        let started = task
            .started_at
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        let _ = writeln!(
            out,
            "{:<38} {:<20} {:<11} {:<20} {}",
            task.id.as_str(),
            task.task_type.as_str(),
            task.status.as_str(),
            task.created_at.format("%Y-%m-%d %H:%M:%S"),
            started
        );
    }
    Ok(out)
}

/// Map how a watched job ended to the command result
///
/// Anything but completion is an error, so the process exits non-zero.
pub fn finish_watch(id: &str, reason: StopReason) -> Result<()> {
    match reason {
        StopReason::Completed => Ok(()),
        StopReason::Failed => anyhow::bail!("job {id} failed"),
        StopReason::Requested | StopReason::Aborted => {
            anyhow::bail!("job {id} stopped before finishing ({reason:?})")
        }
    }
}

/// Follow one remote job until it ends
#[cfg(feature = "http")]
pub async fn watch(
    tracker: &jobtrack_poller::TaskTracker,
    url: &str,
    id: &str,
    task_type: jobtrack_core::TaskType,
) -> Result<StopReason> {
    use jobtrack_core::NewTask;
    use jobtrack_poller::{ConfigPatch, HttpStatusFetcher};

    tracker.orchestrator().configure(
        ConfigPatch::new()
            .on_status_change(|id, status| println!("{id}  {status}"))
            .on_error(|id, error| println!("{id}  retrying after error: {error}"))
            .on_complete(|id, report| {
                let data = report.data.as_ref().map(ToString::to_string).unwrap_or_default();
                println!("{id}  done {data}");
            })
            .on_failed(|id, report| println!("{id}  failed: {}", report.error_message())),
    )?;

    tracker.track(NewTask::new(id, task_type), HttpStatusFetcher::new(url));

    let reason = tracker
        .orchestrator()
        .wait_until_stopped(id)
        .await
        .with_context(|| format!("job {id} was not polled"))?;
    Ok(reason)
}
