//! In-process fake backend
//!
//! Each simulated job follows a seeded plan of queued and processing polls,
//! sprinkled with transient network errors, ending in completion or failure.

use jobtrack_core::{NewTask, TaskId, TaskStatus, TaskType};
use jobtrack_poller::{CancellationToken, ConfigPatch, FetchError, StatusReport, TaskTracker};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;
use std::collections::VecDeque;
use std::future::{ready, Ready};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Step = Result<StatusReport, FetchError>;

/// Simulation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulateOptions {
    /// Number of jobs to submit
    pub jobs: usize,
    /// RNG seed; equal seeds yield equal plans
    pub seed: u64,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        Self { jobs: 5, seed: 42 }
    }
}

/// Outcome counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationSummary {
    /// Jobs submitted
    pub submitted: usize,
    /// Jobs that completed
    pub completed: usize,
    /// Jobs that failed
    pub failed: usize,
    /// Transient fetch errors reported
    pub transient_errors: usize,
    /// Status changes observed
    pub status_changes: usize,
}

/// Scripted answers for one job
#[derive(Debug, Clone)]
pub struct JobPlan {
    /// Job id
    pub id: TaskId,
    /// Job kind
    pub task_type: TaskType,
    /// Answers in order
    pub steps: Vec<Step>,
}

impl JobPlan {
    /// Final status the plan ends in
    #[must_use]
    pub fn outcome(&self) -> Option<TaskStatus> {
        self.steps
            .iter()
            .rev()
            .find_map(|s| s.as_ref().ok().map(|r| r.status))
    }

    /// Number of transient errors in the plan
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_err()).count()
    }

    fn new_task(&self) -> NewTask {
        let key = match self.task_type {
            TaskType::Analysis => "repositoryId",
            TaskType::DocumentGeneration => "specId",
        };
        NewTask::new(self.id.clone(), self.task_type).with_metadata(key, self.id.as_str())
    }

    /// Fetcher replaying the plan; errors once the plan runs out
    fn into_fetcher(
        self,
    ) -> impl Fn(CancellationToken) -> Ready<Step> + Send + Sync + 'static {
        let steps = Mutex::new(VecDeque::from(self.steps));
        move |_cancel| {
            let next = steps
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Other("simulated job has no more answers".into())));
            ready(next)
        }
    }
}

/// Draw `count` job plans from `seed`
#[must_use]
pub fn generate_plans(count: usize, seed: u64) -> Vec<JobPlan> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|n| generate_plan(&mut rng, n)).collect()
}

fn generate_plan(rng: &mut StdRng, n: usize) -> JobPlan {
    let id = uuid::Builder::from_random_bytes(rng.random()).into_uuid();
    let task_type = if rng.random_bool(0.5) {
        TaskType::Analysis
    } else {
        TaskType::DocumentGeneration
    };

    let mut reports = Vec::new();
    for _ in 0..rng.random_range(0..=2) {
        reports.push(StatusReport::queued());
    }
    for _ in 0..rng.random_range(1..=4) {
        reports.push(StatusReport::processing());
    }
    if rng.random_bool(0.8) {
        reports.push(StatusReport::completed(Some(json!({ "job": n, "result": "ok" }))));
    } else {
        reports.push(StatusReport::failed(format!("simulated failure in job {n}")));
    }

    let mut steps = Vec::with_capacity(reports.len());
    for report in reports {
        if rng.random_bool(0.1) {
            steps.push(Err(FetchError::Network("simulated connection reset".into())));
        }
        steps.push(Ok(report));
    }

    JobPlan {
        id: TaskId::new(id.to_string()),
        task_type,
        steps,
    }
}

/// Submit every plan to `tracker` and wait until all sessions end
///
/// Installs printing hooks on the tracker's orchestrator.
pub async fn run(tracker: &TaskTracker, plans: Vec<JobPlan>) -> SimulationSummary {
    let completed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let changes = Arc::new(AtomicUsize::new(0));

    let hooks = ConfigPatch::new()
        .on_status_change({
            let changes = Arc::clone(&changes);
            move |id, status| {
                changes.fetch_add(1, Ordering::SeqCst);
                println!("{id}  {status}");
            }
        })
        .on_complete({
            let completed = Arc::clone(&completed);
            move |id, report| {
                completed.fetch_add(1, Ordering::SeqCst);
                let data = report.data.as_ref().map(ToString::to_string).unwrap_or_default();
                println!("{id}  done {data}");
            }
        })
        .on_failed({
            let failed = Arc::clone(&failed);
            move |id, report| {
                failed.fetch_add(1, Ordering::SeqCst);
                println!("{id}  failed: {}", report.error_message());
            }
        })
        .on_error({
            let errors = Arc::clone(&errors);
            move |id, error| {
                errors.fetch_add(1, Ordering::SeqCst);
                println!("{id}  retrying after error: {error}");
            }
        });
    // Patches carrying only hooks cannot fail validation.
    if let Err(e) = tracker.orchestrator().configure(hooks) {
        tracing::warn!(error = %e, "failed to install simulation hooks");
    }

    let submitted = plans.len();
    let mut ids = Vec::with_capacity(submitted);
    for plan in plans {
        let task = plan.new_task();
        ids.push(plan.id.clone());
        tracker.track(task, plan.into_fetcher());
    }
    tracing::info!(jobs = submitted, "simulation started");

    let orchestrator = tracker.orchestrator();
    futures::future::join_all(ids.iter().map(|id| orchestrator.wait_until_stopped(id))).await;

    SimulationSummary {
        submitted,
        completed: completed.load(Ordering::SeqCst),
        failed: failed.load(Ordering::SeqCst),
        transient_errors: errors.load(Ordering::SeqCst),
        status_changes: changes.load(Ordering::SeqCst),
    }
}
