//! Polling session bookkeeping
//!
//! A session is pure runtime state: it is never persisted and never outlives
//! the orchestrator that created it.

use jobtrack_core::TaskId;
use parking_lot::ReentrantMutex;
use std::cell::Cell;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// `stop` or `stop_all` was called
    Requested,
    /// Backend reported completion
    Completed,
    /// Backend reported failure
    Failed,
    /// Session task ended without a stop (a hook or fetcher panicked, or the
    /// runtime shut down)
    Aborted,
}

/// Session membership changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was created for the task
    Started(TaskId),
    /// The task's session ended
    Stopped {
        /// Task whose session ended
        id: TaskId,
        /// What ended it
        reason: StopReason,
    },
}

impl SessionEvent {
    /// Task the event refers to
    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Started(id) | Self::Stopped { id, .. } => id,
        }
    }
}

/// Liveness flag guarding store writes and hooks.
///
/// The session loop holds it while writing to the store and running hooks;
/// `stop` takes it to flip the flag, so a stop can never interleave with
/// either. Reentrant because store listeners and hooks may call `stop` for
/// the same task from inside.
pub(crate) type Gate = Arc<ReentrantMutex<Cell<bool>>>;

pub(crate) fn new_gate() -> Gate {
    Arc::new(ReentrantMutex::new(Cell::new(true)))
}

/// Live session entry owned by the orchestrator
#[derive(Debug)]
pub(crate) struct Session {
    /// Distinguishes this session from earlier ones for the same task
    pub(crate) serial: u64,
    /// Cancels the in-flight fetch and the pending delay
    pub(crate) token: CancellationToken,
    pub(crate) gate: Gate,
}

impl Session {
    pub(crate) fn new(serial: u64) -> Self {
        Self {
            serial,
            token: CancellationToken::new(),
            gate: new_gate(),
        }
    }

    /// Cancel pending work and close the gate
    pub(crate) fn close(&self) {
        self.token.cancel();
        self.gate.lock().set(false);
    }
}
