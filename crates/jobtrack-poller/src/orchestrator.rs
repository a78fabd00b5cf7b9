//! Polling orchestrator
//!
//! Runs at most one polling session per task id. A session is a spawned
//! tokio task that repeatedly:
//! 1. fetches the job status (cancellable)
//! 2. writes a changed status into the [`TaskStore`] and fires hooks
//! 3. ends on a terminal status, otherwise sleeps for an interval chosen by
//!    the status (cancellable)
//!
//! `stop` and the terminal path share one code path, so each session emits
//! exactly one [`SessionEvent::Stopped`].

use crate::config::{ConfigError, ConfigPatch, PollerConfig, PollerHooks};
use crate::fetcher::{FetchError, StatusFetcher, StatusReport};
use crate::session::{Gate, Session, SessionEvent, StopReason};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jobtrack_core::{ListenerSet, Subscription, TaskId, TaskPatch, TaskStatus, TaskStore, UpdateOutcome};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, Default)]
struct Settings {
    config: PollerConfig,
    hooks: PollerHooks,
}

struct Inner {
    store: Arc<TaskStore>,
    sessions: DashMap<TaskId, Session>,
    settings: RwLock<Settings>,
    listeners: ListenerSet<SessionEvent>,
    next_serial: AtomicU64,
}

/// Owner of every live polling session
///
/// Cloning yields another handle to the same sessions. Sessions hold a
/// handle themselves, so call [`stop_all`](Self::stop_all) on shutdown.
#[derive(Clone)]
pub struct PollingOrchestrator {
    inner: Arc<Inner>,
}

impl PollingOrchestrator {
    /// Create an orchestrator writing into `store`, with default intervals
    #[must_use]
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                sessions: DashMap::new(),
                settings: RwLock::new(Settings::default()),
                listeners: ListenerSet::new(),
                next_serial: AtomicU64::new(1),
            }),
        }
    }

    /// Create an orchestrator with explicit intervals
    pub fn with_config(store: Arc<TaskStore>, config: PollerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let orchestrator = Self::new(store);
        orchestrator.inner.settings.write().config = config;
        Ok(orchestrator)
    }

    /// Start polling `id` unless a session already exists
    ///
    /// The first fetch is issued immediately. Returns `false` when a session
    /// was already running or when called outside a tokio runtime.
    pub fn start<F>(&self, id: impl Into<TaskId>, fetcher: F) -> bool
    where
        F: StatusFetcher + 'static,
    {
        self.start_shared(id, Arc::new(fetcher))
    }

    /// [`start`](Self::start) with an already shared fetcher
    pub fn start_shared(&self, id: impl Into<TaskId>, fetcher: Arc<dyn StatusFetcher>) -> bool {
        let id = id.into();

        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(task_id = %id, "cannot start polling outside a tokio runtime");
            return false;
        };

        let (serial, token, gate) = match self.inner.sessions.entry(id.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!(task_id = %id, "already polling");
                return false;
            }
            Entry::Vacant(slot) => {
                let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed);
                let session = Session::new(serial);
                let handles = (serial, session.token.clone(), Arc::clone(&session.gate));
                slot.insert(session);
                handles
            }
        };

        tracing::info!(task_id = %id, "polling session started");
        self.inner.listeners.emit(&SessionEvent::Started(id.clone()));

        let span = tracing::info_span!("poll_session", task_id = %id);
        let inner = Arc::clone(&self.inner);
        handle.spawn(inner.run_session(id, serial, token, gate, fetcher).instrument(span));

        true
    }

    /// Stop polling `id`
    ///
    /// Cancels the in-flight fetch and pending delay. Returns `false` when no
    /// session existed.
    pub fn stop(&self, id: impl AsRef<str>) -> bool {
        self.inner.stop_session(id.as_ref(), None, StopReason::Requested)
    }

    /// Stop every session
    pub fn stop_all(&self) -> usize {
        let ids = self.active_ids();
        ids.iter().filter(|id| self.stop(id)).count()
    }

    /// Check whether a session exists for `id`
    #[must_use]
    pub fn is_polling(&self, id: impl AsRef<str>) -> bool {
        self.inner.sessions.contains_key(id.as_ref())
    }

    /// Ids with a live session, sorted
    #[must_use]
    pub fn active_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.inner.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of live sessions
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Merge intervals and hooks into the current settings
    ///
    /// Running sessions pick up new intervals at their next delay.
    pub fn configure(&self, patch: ConfigPatch) -> Result<(), ConfigError> {
        let mut settings = self.inner.settings.write();
        let Settings { config, hooks } = &mut *settings;
        patch.apply_to(config, hooks)
    }

    /// Current intervals
    #[must_use]
    pub fn config(&self) -> PollerConfig {
        self.inner.settings.read().config
    }

    /// Store the orchestrator writes into
    #[must_use]
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.inner.store
    }

    /// Register a listener for session start/stop
    pub fn subscribe_sessions<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(listener)
    }

    /// Wait for the current session of `id` to end
    ///
    /// Returns `None` immediately when `id` is not being polled.
    pub async fn wait_until_stopped(&self, id: impl AsRef<str>) -> Option<StopReason> {
        let watched = TaskId::from(id.as_ref());
        let (tx, mut rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));

        let _sub = self.subscribe_sessions({
            let watched = watched.clone();
            move |event| {
                if let SessionEvent::Stopped { id, reason } = event {
                    if *id == watched {
                        if let Some(tx) = tx.lock().take() {
                            let _ = tx.send(*reason);
                        }
                    }
                }
            }
        });

        if !self.is_polling(&watched) {
            return rx.try_recv().ok();
        }
        rx.await.ok()
    }
}

impl fmt::Debug for PollingOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingOrchestrator")
            .field("sessions", &self.inner.sessions.len())
            .field("settings", &*self.inner.settings.read())
            .finish_non_exhaustive()
    }
}

/// Ends the session when its task exits without having stopped it
///
/// A panicking hook or fetcher unwinds the session task, and a runtime
/// shutdown drops it. Either way the entry must not outlive the task.
struct SessionGuard {
    inner: Arc<Inner>,
    id: TaskId,
    serial: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.inner.stop_session(self.id.as_str(), Some(self.serial), StopReason::Aborted) {
            tracing::warn!(task_id = %self.id, "polling session ended abnormally");
        }
    }
}

impl Inner {
    fn config(&self) -> PollerConfig {
        self.settings.read().config
    }

    fn hooks(&self) -> PollerHooks {
        self.settings.read().hooks.clone()
    }

    /// Remove the session and notify once
    ///
    /// With `serial` set, only that exact session is removed, so a terminal
    /// report racing an external `stop` (or a restart) cannot stop twice.
    fn stop_session(&self, id: &str, serial: Option<u64>, reason: StopReason) -> bool {
        let removed = match serial {
            Some(serial) => self.sessions.remove_if(id, |_, s| s.serial == serial),
            None => self.sessions.remove(id),
        };
        let Some((id, session)) = removed else {
            return false;
        };

        session.close();
        tracing::info!(task_id = %id, ?reason, "polling session stopped");

        if let Some(hook) = self.hooks().on_stopped {
            hook(&id, reason);
        }
        self.listeners.emit(&SessionEvent::Stopped { id, reason });
        true
    }

    async fn run_session(
        self: Arc<Self>,
        id: TaskId,
        serial: u64,
        token: CancellationToken,
        gate: Gate,
        fetcher: Arc<dyn StatusFetcher>,
    ) {
        let _guard = SessionGuard {
            inner: Arc::clone(&self),
            id: id.clone(),
            serial,
        };
        let mut last_status = self.store.get(&id).map(|t| t.status);

        loop {
            if token.is_cancelled() {
                return;
            }

            tracing::debug!("fetching status");
            let result = tokio::select! {
                biased;
                () = token.cancelled() => return,
                result = fetcher.fetch_status(token.child_token()) => result,
            };

            let delay = match result {
                Ok(report) => match self.apply_report(&id, serial, &gate, &mut last_status, &report) {
                    Some(delay) => delay,
                    None => return,
                },
                Err(e) => match self.handle_error(&id, &gate, &e) {
                    Some(delay) => delay,
                    None => return,
                },
            };

            tracing::debug!(?delay, "next poll scheduled");
            tokio::select! {
                biased;
                () = token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Process one report; `None` ends the loop
    ///
    /// The gate stays held through every hook, so once `stop` has returned
    /// no callback from this session can run.
    fn apply_report(
        &self,
        id: &TaskId,
        serial: u64,
        gate: &Gate,
        last_status: &mut Option<TaskStatus>,
        report: &StatusReport,
    ) -> Option<Duration> {
        let status = report.status;
        let hooks = self.hooks();

        let alive = gate.lock();
        if !alive.get() {
            return None;
        }

        if *last_status != Some(status) && self.record_status(id, status) {
            *last_status = Some(status);
            tracing::info!(%status, "status changed");
            if let Some(hook) = &hooks.on_status_change {
                hook(id, status);
            }
        }

        // a store listener or the hook may have stopped this session
        if !alive.get() {
            return None;
        }

        match status {
            TaskStatus::Completed => {
                if let Some(hook) = &hooks.on_complete {
                    hook(id, report);
                }
                self.stop_session(id.as_str(), Some(serial), StopReason::Completed);
                None
            }
            TaskStatus::Failed => {
                tracing::warn!(error = report.error_message(), "job failed");
                if let Some(hook) = &hooks.on_failed {
                    hook(id, report);
                }
                self.stop_session(id.as_str(), Some(serial), StopReason::Failed);
                None
            }
            TaskStatus::Queued | TaskStatus::Processing => Some(self.config().interval_for(status)),
        }
    }

    /// Write a newly observed status; `false` if the store refused the edge
    fn record_status(&self, id: &TaskId, status: TaskStatus) -> bool {
        match self.store.update(id, &TaskPatch::status(status)) {
            UpdateOutcome::Rejected(e) => {
                tracing::warn!(error = %e, "backend status refused by store");
                false
            }
            UpdateOutcome::Applied | UpdateOutcome::Unchanged | UpdateOutcome::Missing => true,
        }
    }

    /// Classify a failed fetch; `None` ends the loop
    fn handle_error(&self, id: &TaskId, gate: &Gate, error: &FetchError) -> Option<Duration> {
        let alive = gate.lock();
        if !alive.get() {
            return None;
        }

        if error.is_cancellation() {
            tracing::debug!("fetch cancelled without stop, retrying");
        } else {
            tracing::warn!(error = %error, "status fetch failed, retrying");
            if let Some(hook) = self.hooks().on_error {
                hook(id, error);
            }
        }
        Some(self.config().queued_interval())
    }
}
