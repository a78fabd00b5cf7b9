//! jobtrack Bridge - observable snapshots for presentation code
//!
//! Lets a UI layer follow the task collection and live polling membership
//! without polling anything itself:
//! - Collection views: every task, every polled id
//! - Per-id views: one task, one "is polling" flag; unrelated ids never notify
//! - Snapshots are `Arc`-shared and stable while nothing relevant changed
//! - A detached bridge serves defaults before the store exists
//!
//! # Example
//!
//! ```rust
//! use jobtrack_bridge::{Bridge, Observable};
//! use jobtrack_core::{NewTask, TaskStore, TaskType};
//! use jobtrack_poller::PollingOrchestrator;
//! use std::sync::Arc;
//!
//! let store = Arc::new(TaskStore::in_memory());
//! let bridge = Bridge::new(PollingOrchestrator::new(Arc::clone(&store)));
//!
//! let tasks = bridge.tasks();
//! let _sub = tasks.on_change(|| println!("task list changed"));
//! store.add(NewTask::new("t1", TaskType::Analysis));
//!
//! assert_eq!(tasks.snapshot().len(), 1);
//! assert!(!bridge.is_polling("t1").snapshot());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod observable;
pub mod views;

// Re-exports for convenience
pub use observable::{ChangeCallback, Observable};
pub use views::{PollingFlagView, PollingSetView, TaskListView, TaskView};

use jobtrack_core::{TaskId, TaskStore};
use jobtrack_poller::{PollingOrchestrator, TaskTracker};
use std::sync::Arc;

/// Factory for views over one store and its orchestrator
#[derive(Debug, Clone, Default)]
pub struct Bridge {
    store: Option<Arc<TaskStore>>,
    orchestrator: Option<PollingOrchestrator>,
}

impl Bridge {
    /// Bridge over `orchestrator` and the store it writes into
    #[must_use]
    pub fn new(orchestrator: PollingOrchestrator) -> Self {
        Self {
            store: Some(Arc::clone(orchestrator.store())),
            orchestrator: Some(orchestrator),
        }
    }

    /// Bridge over a tracker's store and orchestrator
    #[must_use]
    pub fn from_tracker(tracker: &TaskTracker) -> Self {
        Self::new(tracker.orchestrator().clone())
    }

    /// Bridge with nothing behind it; every view yields defaults
    #[must_use]
    pub fn detached() -> Self {
        tracing::debug!("creating detached bridge");
        Self::default()
    }

    /// Check whether this bridge has no store
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.store.is_none()
    }

    /// Every task
    #[must_use]
    pub fn tasks(&self) -> TaskListView {
        TaskListView::new(self.store.clone())
    }

    /// One task
    #[must_use]
    pub fn task(&self, id: impl Into<TaskId>) -> TaskView {
        TaskView::new(self.store.clone(), id.into())
    }

    /// Ids being polled
    #[must_use]
    pub fn polling(&self) -> PollingSetView {
        PollingSetView::new(self.orchestrator.clone())
    }

    /// Whether one id is being polled
    #[must_use]
    pub fn is_polling(&self, id: impl Into<TaskId>) -> PollingFlagView {
        PollingFlagView::new(self.orchestrator.clone(), id.into())
    }
}

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for observing tasks
    pub use crate::{Bridge, ChangeCallback, Observable};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
