//! Store + orchestrator facade
//!
//! What the rest of an application usually wants: "this job was submitted,
//! keep its record current until it finishes".

use crate::config::{ConfigError, PollerConfig};
use crate::fetcher::StatusFetcher;
use crate::orchestrator::PollingOrchestrator;
use jobtrack_core::{NewTask, Task, TaskId, TaskStore};
use std::sync::Arc;

/// Tracks submitted jobs until they reach a terminal status
#[derive(Debug, Clone)]
pub struct TaskTracker {
    store: Arc<TaskStore>,
    orchestrator: PollingOrchestrator,
}

impl TaskTracker {
    /// Create a tracker over `store` with default intervals
    #[must_use]
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self::with_orchestrator(PollingOrchestrator::new(store))
    }

    /// Create a tracker with explicit intervals
    pub fn with_config(store: Arc<TaskStore>, config: PollerConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_orchestrator(PollingOrchestrator::with_config(store, config)?))
    }

    /// Wrap an existing orchestrator
    #[must_use]
    pub fn with_orchestrator(orchestrator: PollingOrchestrator) -> Self {
        Self {
            store: Arc::clone(orchestrator.store()),
            orchestrator,
        }
    }

    /// Record a submitted job and start polling it
    ///
    /// A job added in a terminal status is recorded but not polled.
    pub fn track<F>(&self, task: NewTask, fetcher: F) -> Task
    where
        F: StatusFetcher + 'static,
    {
        self.track_shared(task, Arc::new(fetcher))
    }

    /// [`track`](Self::track) with an already shared fetcher
    pub fn track_shared(&self, task: NewTask, fetcher: Arc<dyn StatusFetcher>) -> Task {
        let task = self.store.add(task);
        if !task.is_terminal() {
            self.orchestrator.start_shared(task.id.clone(), fetcher);
        }
        task
    }

    /// Restart polling for every non-terminal task, e.g. after a reload
    ///
    /// `factory` builds a fetcher for a task, or returns `None` to leave it
    /// alone. Returns the number of sessions started.
    pub fn resume_active<F>(&self, factory: F) -> usize
    where
        F: Fn(&Task) -> Option<Arc<dyn StatusFetcher>>,
    {
        let mut started = 0;
        for task in self.store.active() {
            let Some(fetcher) = factory(&task) else {
                tracing::debug!(task_id = %task.id, "no fetcher for task, not resuming");
                continue;
            };
            if self.orchestrator.start_shared(task.id.clone(), fetcher) {
                started += 1;
            }
        }
        tracing::info!(started, "resumed polling");
        started
    }

    /// Stop polling a job and drop its record
    pub fn forget(&self, id: impl AsRef<str>) -> Option<Task> {
        let id = id.as_ref();
        self.orchestrator.stop(id);
        self.store.remove(id)
    }

    /// Drop every completed or failed record
    pub fn clear_finished(&self) -> Vec<TaskId> {
        self.store.clear_terminal()
    }

    /// Stop every session; records are kept
    pub fn shutdown(&self) -> usize {
        self.orchestrator.stop_all()
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Underlying orchestrator
    #[must_use]
    pub fn orchestrator(&self) -> &PollingOrchestrator {
        &self.orchestrator
    }
}
