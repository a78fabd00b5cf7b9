//! Core types for jobtrack
//!
//! Defines the task record tracked by the store:
//! - Task identity and kind
//! - Task status and terminal detection
//! - Insert and partial-update payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;

/// Opaque bag of subject identifiers carried for the consumer.
///
/// The store and the poller never inspect it.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Unique task identifier, stable across reloads
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap an identifier issued by the backend
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of backend job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Test-suite analysis of a repository
    Analysis,
    /// Specification document generation
    DocumentGeneration,
}

impl TaskType {
    /// Wire name of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::DocumentGeneration => "document-generation",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analysis" => Ok(Self::Analysis),
            "document-generation" => Ok(Self::DocumentGeneration),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Lifecycle status of a backend job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted by the backend, not yet started
    Queued,
    /// Executing on the backend
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl TaskStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Queued,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    /// Completed and failed end a job permanently
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked backend job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// Job kind
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Last known status
    pub status: TaskStatus,
    /// Subject identifiers (owning entity ids)
    #[serde(default)]
    pub metadata: Metadata,
    /// Insertion time
    pub created_at: DateTime<Utc>,
    /// Set by the consumer when processing begins
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Check whether the task reached completed or failed
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(task_type) = patch.task_type {
            self.task_type = task_type;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(metadata) = &patch.metadata {
            self.metadata.clone_from(metadata);
        }
        if let Some(started_at) = patch.started_at {
            self.started_at = started_at;
        }
    }
}

/// Payload for inserting a task into the store
///
/// `created_at` is stamped at insertion when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    /// Task identifier
    pub id: TaskId,
    /// Job kind
    pub task_type: TaskType,
    /// Initial status
    pub status: TaskStatus,
    /// Subject identifiers
    pub metadata: Metadata,
    /// Insertion time, if already known
    pub created_at: Option<DateTime<Utc>>,
    /// Processing start time, if already known
    pub started_at: Option<DateTime<Utc>>,
}

impl NewTask {
    /// Create a queued task with empty metadata
    #[must_use]
    pub fn new(id: impl Into<TaskId>, task_type: TaskType) -> Self {
        Self {
            id: id.into(),
            task_type,
            status: TaskStatus::Queued,
            metadata: Metadata::new(),
            created_at: None,
            started_at: None,
        }
    }

    /// With initial status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// With one metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// With explicit creation time
    #[inline]
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// With processing start time
    #[inline]
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Build the stored record, stamping `created_at` with `now` if unset
    #[must_use]
    pub fn into_task(self, now: DateTime<Utc>) -> Task {
        Task {
            id: self.id,
            task_type: self.task_type,
            status: self.status,
            metadata: self.metadata,
            created_at: self.created_at.unwrap_or(now),
            started_at: self.started_at,
        }
    }
}

impl From<Task> for NewTask {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type,
            status: task.status,
            metadata: task.metadata,
            created_at: Some(task.created_at),
            started_at: task.started_at,
        }
    }
}

/// Partial update merged into an existing task
///
/// Unset fields are left untouched. `metadata` replaces the whole bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    /// New job kind
    pub task_type: Option<TaskType>,
    /// New status
    pub status: Option<TaskStatus>,
    /// Replacement metadata
    pub metadata: Option<Metadata>,
    /// New processing start time (`Some(None)` clears it)
    pub started_at: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch that only changes the status
    #[inline]
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self::new().with_status(status)
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// With job kind
    #[inline]
    #[must_use]
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    /// With replacement metadata
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// With processing start time
    #[inline]
    #[must_use]
    pub fn with_started_at(mut self, started_at: Option<DateTime<Utc>>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Check whether the patch sets nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.task_type.is_none()
            && self.status.is_none()
            && self.metadata.is_none()
            && self.started_at.is_none()
    }
}
