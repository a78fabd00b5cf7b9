//! Testing utilities for jobtrack workspace
//!
//! Shared fetchers, storage doubles, and recorders.

#![allow(missing_docs)]

use async_trait::async_trait;
use jobtrack_core::{DurableStorage, NewTask, StorageError, TaskId, TaskStatus, TaskStore, TaskType};
use jobtrack_poller::{
    CancellationToken, ConfigPatch, FetchError, StatusFetcher, StatusReport, StopReason,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub type FetchResult = Result<StatusReport, FetchError>;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn analysis_task(id: &str) -> NewTask {
    NewTask::new(id, TaskType::Analysis).with_metadata("repositoryId", 1)
}

pub fn document_task(id: &str) -> NewTask {
    NewTask::new(id, TaskType::DocumentGeneration).with_metadata("specId", 1)
}

pub fn memory_store() -> Arc<TaskStore> {
    Arc::new(TaskStore::in_memory())
}

// ---------------------------------------------------------------------------
// Fetchers
// ---------------------------------------------------------------------------

/// Answers from a script, then repeats a fallback
#[derive(Debug, Clone)]
pub struct ScriptedFetcher {
    script: Arc<Mutex<VecDeque<FetchResult>>>,
    fallback: FetchResult,
    calls: Arc<Mutex<Vec<Instant>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            script: Arc::default(),
            fallback: Ok(StatusReport::processing()),
            calls: Arc::default(),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
        }
    }

    /// Script the statuses in order
    pub fn statuses(statuses: &[TaskStatus]) -> Self {
        statuses
            .iter()
            .fold(Self::new(), |f, s| f.then(StatusReport::new(*s)))
    }

    pub fn then(self, report: StatusReport) -> Self {
        self.script.lock().push_back(Ok(report));
        self
    }

    pub fn then_err(self, error: FetchError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    pub fn with_fallback(mut self, fallback: FetchResult) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Instants at which each fetch began
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    /// Gaps between consecutive fetches
    pub fn gaps(&self) -> Vec<Duration> {
        self.call_times().windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Highest number of simultaneously running fetches seen
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusFetcher for ScriptedFetcher {
    async fn fetch_status(&self, _cancel: CancellationToken) -> FetchResult {
        self.calls.lock().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        tokio::task::yield_now().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        next
    }
}

/// Answers after a fixed delay, ignoring its cancellation token
#[derive(Debug, Clone)]
pub struct SlowFetcher {
    delay: Duration,
    report: StatusReport,
    completed: Arc<AtomicUsize>,
}

impl SlowFetcher {
    pub fn new(delay: Duration, report: StatusReport) -> Self {
        Self {
            delay,
            report,
            completed: Arc::default(),
        }
    }

    /// Fetches that ran to completion (were not dropped)
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusFetcher for SlowFetcher {
    async fn fetch_status(&self, _cancel: CancellationToken) -> FetchResult {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(self.report.clone())
    }
}

/// Never answers; resolves to `Cancelled` once its token fires
#[derive(Debug, Clone, Default)]
pub struct HangingFetcher {
    started: Arc<AtomicUsize>,
}

impl HangingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusFetcher for HangingFetcher {
    async fn fetch_status(&self, cancel: CancellationToken) -> FetchResult {
        self.started.fetch_add(1, Ordering::SeqCst);
        cancel.cancelled().await;
        Err(FetchError::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Storage whose reads and/or writes always fail
#[derive(Debug, Default)]
pub struct FailingStorage {
    fail_reads: bool,
    fail_writes: bool,
    attempts: AtomicUsize,
}

impl FailingStorage {
    /// Every call fails
    pub fn new() -> Self {
        Self {
            fail_reads: true,
            fail_writes: true,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Reads succeed with nothing; writes fail with a quota error
    pub fn full() -> Self {
        Self {
            fail_reads: false,
            fail_writes: true,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Write attempts seen
    pub fn write_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl DurableStorage for FailingStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Unavailable("storage offline".into()));
        }
        Ok(None)
    }

    fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(StorageError::QuotaExceeded(key.to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recorders
// ---------------------------------------------------------------------------

/// Collects every event passed to its listener
#[derive(Debug)]
pub struct EventRecorder<E> {
    events: Arc<Mutex<Vec<E>>>,
}

impl<E: Clone + Send + 'static> EventRecorder<E> {
    pub fn new() -> Self {
        Self {
            events: Arc::default(),
        }
    }

    /// Listener to pass to `subscribe`
    pub fn listener(&self) -> impl Fn(&E) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |e: &E| events.lock().push(e.clone())
    }

    pub fn events(&self) -> Vec<E> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl<E: Clone + Send + 'static> Default for EventRecorder<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// One orchestrator hook invocation
#[derive(Debug, Clone, PartialEq)]
pub enum HookCall {
    StatusChanged(TaskId, TaskStatus),
    Completed(TaskId, Option<serde_json::Value>),
    Failed(TaskId, String),
    Error(TaskId, FetchError),
    Stopped(TaskId, StopReason),
}

/// Records every orchestrator hook in call order
#[derive(Debug, Clone, Default)]
pub struct HookRecorder {
    calls: Arc<Mutex<Vec<HookCall>>>,
}

impl HookRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch wiring every hook into this recorder
    pub fn patch(&self) -> ConfigPatch {
        let (a, b, c, d, e) = (
            Arc::clone(&self.calls),
            Arc::clone(&self.calls),
            Arc::clone(&self.calls),
            Arc::clone(&self.calls),
            Arc::clone(&self.calls),
        );
        ConfigPatch::new()
            .on_status_change(move |id, s| a.lock().push(HookCall::StatusChanged(id.clone(), s)))
            .on_complete(move |id, r| b.lock().push(HookCall::Completed(id.clone(), r.data.clone())))
            .on_failed(move |id, r| {
                c.lock()
                    .push(HookCall::Failed(id.clone(), r.error_message().to_string()));
            })
            .on_error(move |id, err| d.lock().push(HookCall::Error(id.clone(), err.clone())))
            .on_stopped(move |id, reason| e.lock().push(HookCall::Stopped(id.clone(), reason)))
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().clone()
    }

    /// Calls concerning one id
    pub fn calls_for(&self, id: &str) -> Vec<HookCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.task_id().as_str() == id)
            .collect()
    }

    pub fn status_changes(&self, id: &str) -> Vec<TaskStatus> {
        self.calls_for(id)
            .into_iter()
            .filter_map(|c| match c {
                HookCall::StatusChanged(_, s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&HookCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }
}

impl HookCall {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::StatusChanged(id, _)
            | Self::Completed(id, _)
            | Self::Failed(id, _)
            | Self::Error(id, _)
            | Self::Stopped(id, _) => id,
        }
    }
}
