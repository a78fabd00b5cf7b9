//! jobtrack Core - task records and the persisted task store
//!
//! The store is the client-resident record of long-running backend jobs
//! (repository analysis, document generation):
//! - Keyed collection with exactly one record per task id
//! - Status transitions constrained to queued → processing → completed | failed
//! - Best-effort persistence to a durable key-value capability
//! - Synchronous change notification
//!
//! # Example
//!
//! ```rust
//! use jobtrack_core::{NewTask, TaskPatch, TaskStatus, TaskStore, TaskType};
//!
//! let store = TaskStore::in_memory();
//! let _sub = store.subscribe(|event| println!("changed: {event:?}"));
//!
//! store.add(NewTask::new("t1", TaskType::Analysis).with_metadata("repositoryId", 7));
//! store.update("t1", &TaskPatch::status(TaskStatus::Processing));
//!
//! assert_eq!(store.get("t1").unwrap().status, TaskStatus::Processing);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod error;
pub mod notify;
pub mod storage;
pub mod store;
pub mod transition;
pub mod types;

// Re-exports for convenience
pub use error::{StorageError, TransitionError};
pub use notify::{Listener, ListenerSet, Subscription};
pub use storage::{DurableStorage, FileStorage, MemoryStorage, NullStorage};
pub use store::{StoreConfig, StoreEvent, TaskStore, UpdateOutcome, DEFAULT_STORAGE_KEY};
pub use transition::{allowed_transitions, validate_transition};
pub use types::{Metadata, NewTask, Task, TaskId, TaskPatch, TaskStatus, TaskType};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the task store
    pub use crate::{
        DurableStorage, NewTask, StoreEvent, Subscription, Task, TaskId, TaskPatch, TaskStatus,
        TaskStore, TaskType, UpdateOutcome,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
