//! jobtrack Poller - cancellable polling sessions for background jobs
//!
//! Keeps task records current while the backend works:
//! - At most one session per task id; duplicate starts are no-ops
//! - Adaptive cadence: faster while processing, slower while queued or after errors
//! - Transient errors are reported and retried, never fatal
//! - Terminal statuses end the session through the same path as `stop`
//!
//! # Example
//!
//! ```rust,no_run
//! use jobtrack_core::{NewTask, TaskStore, TaskType};
//! use jobtrack_poller::{ConfigPatch, FetchError, StatusReport, TaskTracker};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let tracker = TaskTracker::new(Arc::new(TaskStore::in_memory()));
//! tracker
//!     .orchestrator()
//!     .configure(ConfigPatch::new().on_complete(|id, _| println!("{id} done")))
//!     .unwrap();
//!
//! tracker.track(NewTask::new("t1", TaskType::Analysis), |_cancel: CancellationToken| async {
//!     Ok::<_, FetchError>(StatusReport::completed(None))
//! });
//! tracker.orchestrator().wait_until_stopped("t1").await;
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod config;
pub mod fetcher;
pub mod orchestrator;
pub mod session;
pub mod tracker;

#[cfg(feature = "http")]
pub mod http;

// Re-exports for convenience
pub use config::{
    CompleteHook, ConfigError, ConfigPatch, ErrorHook, FailedHook, PollerConfig, PollerHooks,
    StatusChangeHook, StoppedHook, DEFAULT_PROCESSING_INTERVAL, DEFAULT_QUEUED_INTERVAL,
};
pub use fetcher::{FetchError, StatusFetcher, StatusReport};
pub use orchestrator::PollingOrchestrator;
pub use session::{SessionEvent, StopReason};
pub use tracker::TaskTracker;

#[cfg(feature = "http")]
pub use http::HttpStatusFetcher;

/// Re-exported so fetcher implementations need not depend on tokio-util directly
pub use tokio_util::sync::CancellationToken;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving polling sessions
    pub use crate::{
        CancellationToken, ConfigPatch, FetchError, PollerConfig, PollingOrchestrator,
        SessionEvent, StatusFetcher, StatusReport, StopReason, TaskTracker,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
