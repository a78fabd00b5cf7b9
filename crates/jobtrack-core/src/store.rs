//! Persisted, observable task record store
//!
//! The store is the single source of truth for task status. Every mutation
//! that changes state:
//! 1. bumps the store version
//! 2. writes the whole collection to durable storage (best effort)
//! 3. notifies subscribers synchronously, in registration order
//!
//! Storage failures are logged and swallowed; the in-memory collection stays
//! authoritative for the running process.

use crate::error::TransitionError;
use crate::notify::{ListenerSet, Subscription};
use crate::storage::{DurableStorage, MemoryStorage};
use crate::transition::validate_transition;
use crate::types::{NewTask, Task, TaskId, TaskPatch, TaskType};
use chrono::Utc;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Key the collection is persisted under unless configured otherwise
pub const DEFAULT_STORAGE_KEY: &str = "background-tasks";

/// Version tag of the persisted envelope
pub const PERSIST_FORMAT_VERSION: u32 = 1;

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Durable storage key holding the collection
    pub storage_key: String,
}

impl StoreConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With storage key
    #[inline]
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

/// What a mutation changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Task inserted (or overwritten)
    Added(TaskId),
    /// Task fields merged
    Updated(TaskId),
    /// Task deleted
    Removed(TaskId),
    /// Terminal tasks removed in one step
    Cleared(Vec<TaskId>),
}

impl StoreEvent {
    /// Check whether the event touched `id`
    #[must_use]
    pub fn affects(&self, id: &str) -> bool {
        match self {
            Self::Added(t) | Self::Updated(t) | Self::Removed(t) => t.as_str() == id,
            Self::Cleared(ids) => ids.iter().any(|t| t.as_str() == id),
        }
    }
}

/// Result of [`TaskStore::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Fields merged and listeners notified
    Applied,
    /// Merge produced an identical record; nothing happened
    Unchanged,
    /// No task with that id
    Missing,
    /// Status edge outside the transition graph; nothing happened
    Rejected(TransitionError),
}

impl UpdateOutcome {
    /// Check whether the record was changed
    #[inline]
    #[must_use]
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Deserialize)]
struct PersistedTasks {
    version: u32,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct PersistedTasksRef<'a> {
    version: u32,
    tasks: Vec<&'a Task>,
}

struct StoreState {
    tasks: HashMap<TaskId, Task>,
    version: u64,
}

/// Keyed collection of task records
pub struct TaskStore {
    config: StoreConfig,
    storage: Arc<dyn DurableStorage>,
    state: RwLock<StoreState>,
    /// Highest store version written to storage
    persisted: Mutex<u64>,
    listeners: ListenerSet<StoreEvent>,
}

impl TaskStore {
    /// Open a store over `storage`, hydrating from the configured key
    ///
    /// A missing, unreadable or malformed payload yields an empty store.
    #[must_use]
    pub fn open(storage: Arc<dyn DurableStorage>, config: StoreConfig) -> Self {
        let tasks = hydrate(storage.as_ref(), &config.storage_key);
        tracing::debug!(
            key = %config.storage_key,
            count = tasks.len(),
            "hydrated task store"
        );

        Self {
            config,
            storage,
            state: RwLock::new(StoreState { tasks, version: 0 }),
            persisted: Mutex::new(0),
            listeners: ListenerSet::new(),
        }
    }

    /// Open a store over `storage` with default configuration
    #[must_use]
    pub fn with_storage(storage: Arc<dyn DurableStorage>) -> Self {
        Self::open(storage, StoreConfig::default())
    }

    /// Store backed by a fresh in-memory map
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    /// Insert a task, overwriting any record with the same id
    ///
    /// `created_at` is stamped with the current time when absent. Re-adding
    /// a record identical to the stored one persists and notifies nothing.
    pub fn add(&self, task: NewTask) -> Task {
        let task = task.into_task(Utc::now());
        let id = task.id.clone();

        let mut state = self.state.write();
        match state.tasks.insert(id.clone(), task.clone()) {
            Some(previous) if previous == task => {
                tracing::debug!(task_id = %id, "task record already up to date");
                return task;
            }
            Some(_) => tracing::debug!(task_id = %id, "overwriting existing task record"),
            None => tracing::debug!(task_id = %id, task_type = %task.task_type, "added task"),
        }
        self.commit(state, StoreEvent::Added(id));

        task
    }

    /// Merge `patch` into an existing task
    ///
    /// Does nothing (and notifies nobody) when the id is unknown, when the
    /// merge changes nothing, or when the status edge is not allowed.
    pub fn update(&self, id: impl AsRef<str>, patch: &TaskPatch) -> UpdateOutcome {
        let id = id.as_ref();
        let mut state = self.state.write();

        let Some(current) = state.tasks.get(id) else {
            tracing::debug!(task_id = id, "update ignored: no such task");
            return UpdateOutcome::Missing;
        };

        if let Some(next) = patch.status {
            if let Err(e) = validate_transition(current.status, next) {
                tracing::warn!(task_id = id, error = %e, "update rejected");
                return UpdateOutcome::Rejected(e);
            }
        }

        let mut merged = current.clone();
        merged.apply(patch);
        if merged == *current {
            return UpdateOutcome::Unchanged;
        }

        let task_id = merged.id.clone();
        tracing::debug!(task_id = %task_id, status = %merged.status, "updated task");
        state.tasks.insert(task_id.clone(), merged);
        self.commit(state, StoreEvent::Updated(task_id));

        UpdateOutcome::Applied
    }

    /// Delete a task, returning the removed record
    pub fn remove(&self, id: impl AsRef<str>) -> Option<Task> {
        let mut state = self.state.write();
        let removed = state.tasks.remove(id.as_ref())?;

        tracing::debug!(task_id = %removed.id, "removed task");
        self.commit(state, StoreEvent::Removed(removed.id.clone()));

        Some(removed)
    }

    /// Remove every completed or failed task in one step
    ///
    /// Listeners are notified once, and only if something was removed.
    pub fn clear_terminal(&self) -> Vec<TaskId> {
        let mut state = self.state.write();

        let mut removed: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|t| t.is_terminal())
            .map(|t| t.id.clone())
            .collect();

        if removed.is_empty() {
            return removed;
        }

        for id in &removed {
            state.tasks.remove(id);
        }
        removed.sort();

        tracing::debug!(count = removed.len(), "cleared terminal tasks");
        self.commit(state, StoreEvent::Cleared(removed.clone()));

        removed
    }

    /// Snapshot of one task
    #[must_use]
    pub fn get(&self, id: impl AsRef<str>) -> Option<Task> {
        self.state.read().tasks.get(id.as_ref()).cloned()
    }

    /// Check whether a task exists
    #[must_use]
    pub fn contains(&self, id: impl AsRef<str>) -> bool {
        self.state.read().tasks.contains_key(id.as_ref())
    }

    /// Snapshot of all tasks, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<Task> {
        self.collect(|_| true)
    }

    /// Tasks that have not reached a terminal status
    #[must_use]
    pub fn active(&self) -> Vec<Task> {
        self.collect(|t| !t.is_terminal())
    }

    /// Tasks of one kind
    #[must_use]
    pub fn by_type(&self, task_type: TaskType) -> Vec<Task> {
        self.collect(|t| t.task_type == task_type)
    }

    /// Tasks whose metadata maps `key` to `value`
    #[must_use]
    pub fn find_by_metadata(&self, key: &str, value: &serde_json::Value) -> Vec<Task> {
        self.collect(|t| t.metadata.get(key) == Some(value))
    }

    /// Number of tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().tasks.len()
    }

    /// Check whether the store holds no tasks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Monotonic counter bumped by every state-changing mutation
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Storage key the collection is persisted under
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.config.storage_key
    }

    /// Register a listener invoked after every state-changing mutation
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    fn collect(&self, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        let state = self.state.read();
        let mut tasks: Vec<Task> = state.tasks.values().filter(|t| keep(t)).cloned().collect();
        drop(state);

        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// Finish a mutation: bump version, persist, then notify with no lock held.
    fn commit(&self, mut state: RwLockWriteGuard<'_, StoreState>, event: StoreEvent) {
        state.version += 1;
        let version = state.version;
        let payload = encode(&state.tasks);
        drop(state);

        if let Some(payload) = payload {
            self.persist(version, &payload);
        }
        self.listeners.emit(&event);
    }

    fn persist(&self, version: u64, payload: &str) {
        let mut persisted = self.persisted.lock();
        // A newer snapshot already reached storage.
        if version <= *persisted {
            return;
        }

        match self.storage.set(&self.config.storage_key, payload) {
            Ok(()) => *persisted = version,
            Err(e) => tracing::warn!(
                key = %self.config.storage_key,
                error = %e,
                "failed to persist task store"
            ),
        }
    }
}

impl fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("TaskStore")
            .field("storage_key", &self.config.storage_key)
            .field("tasks", &state.tasks.len())
            .field("version", &state.version)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

fn encode(tasks: &HashMap<TaskId, Task>) -> Option<String> {
    let mut sorted: Vec<&Task> = tasks.values().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let envelope = PersistedTasksRef {
        version: PERSIST_FORMAT_VERSION,
        tasks: sorted,
    };
    match serde_json::to_string(&envelope) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode task store");
            None
        }
    }
}

fn hydrate(storage: &dyn DurableStorage, key: &str) -> HashMap<TaskId, Task> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return HashMap::new(),
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read persisted tasks, starting empty");
            return HashMap::new();
        }
    };

    match serde_json::from_str::<PersistedTasks>(&raw) {
        Ok(envelope) if envelope.version == PERSIST_FORMAT_VERSION => envelope
            .tasks
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect(),
        Ok(envelope) => {
            tracing::warn!(
                key,
                version = envelope.version,
                "discarding persisted tasks with unknown format version"
            );
            HashMap::new()
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding malformed persisted tasks");
            HashMap::new()
        }
    }
}
