//! Poller configuration and lifecycle hooks
//!
//! Configuration is merged, never reset: [`ConfigPatch`] carries only the
//! fields a caller wants to change.

use crate::fetcher::{FetchError, StatusReport};
use crate::session::StopReason;
use jobtrack_core::{TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default delay between polls while a job is processing
pub const DEFAULT_PROCESSING_INTERVAL: Duration = Duration::from_secs(2);

/// Default delay between polls while a job is queued or after a failed fetch
pub const DEFAULT_QUEUED_INTERVAL: Duration = Duration::from_secs(5);

/// Called when a session observes a status different from the previous one
pub type StatusChangeHook = Arc<dyn Fn(&TaskId, TaskStatus) + Send + Sync>;
/// Called once when the backend reports completion
pub type CompleteHook = Arc<dyn Fn(&TaskId, &StatusReport) + Send + Sync>;
/// Called once when the backend reports failure
pub type FailedHook = Arc<dyn Fn(&TaskId, &StatusReport) + Send + Sync>;
/// Called for every non-cancellation fetch error
pub type ErrorHook = Arc<dyn Fn(&TaskId, &FetchError) + Send + Sync>;
/// Called once when a session ends, for any reason
pub type StoppedHook = Arc<dyn Fn(&TaskId, StopReason) + Send + Sync>;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A polling interval of zero would spin
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Polling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Delay while processing, in milliseconds
    pub processing_interval_ms: u64,
    /// Delay while queued or recovering from an error, in milliseconds
    pub queued_interval_ms: u64,
}

impl PollerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With processing interval
    #[inline]
    #[must_use]
    pub fn with_processing_interval(mut self, interval: Duration) -> Self {
        self.processing_interval_ms = duration_ms(interval);
        self
    }

    /// With queued interval
    #[inline]
    #[must_use]
    pub fn with_queued_interval(mut self, interval: Duration) -> Self {
        self.queued_interval_ms = duration_ms(interval);
        self
    }

    /// Delay while processing
    #[inline]
    #[must_use]
    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }

    /// Delay while queued or after a failed fetch
    #[inline]
    #[must_use]
    pub fn queued_interval(&self) -> Duration {
        Duration::from_millis(self.queued_interval_ms)
    }

    /// Delay before the next poll given the last observed status
    #[must_use]
    pub fn interval_for(&self, status: TaskStatus) -> Duration {
        match status {
            TaskStatus::Processing => self.processing_interval(),
            TaskStatus::Queued | TaskStatus::Completed | TaskStatus::Failed => {
                self.queued_interval()
            }
        }
    }

    /// Reject intervals that would make a session spin
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("processing interval"));
        }
        if self.queued_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("queued interval"));
        }
        Ok(())
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            processing_interval_ms: duration_ms(DEFAULT_PROCESSING_INTERVAL),
            queued_interval_ms: duration_ms(DEFAULT_QUEUED_INTERVAL),
        }
    }
}

/// Global lifecycle callbacks
#[derive(Clone, Default)]
pub struct PollerHooks {
    /// Status changed
    pub on_status_change: Option<StatusChangeHook>,
    /// Job completed
    pub on_complete: Option<CompleteHook>,
    /// Job failed
    pub on_failed: Option<FailedHook>,
    /// Transient fetch error
    pub on_error: Option<ErrorHook>,
    /// Session ended
    pub on_stopped: Option<StoppedHook>,
}

impl PollerHooks {
    /// Overlay every hook set in `other`
    pub fn merge(&mut self, other: PollerHooks) {
        if other.on_status_change.is_some() {
            self.on_status_change = other.on_status_change;
        }
        if other.on_complete.is_some() {
            self.on_complete = other.on_complete;
        }
        if other.on_failed.is_some() {
            self.on_failed = other.on_failed;
        }
        if other.on_error.is_some() {
            self.on_error = other.on_error;
        }
        if other.on_stopped.is_some() {
            self.on_stopped = other.on_stopped;
        }
    }
}

impl fmt::Debug for PollerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollerHooks")
            .field("on_status_change", &self.on_status_change.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_stopped", &self.on_stopped.is_some())
            .finish()
    }
}

/// Partial configuration applied by `configure`
#[derive(Debug, Clone, Default)]
pub struct ConfigPatch {
    processing_interval: Option<Duration>,
    queued_interval: Option<Duration>,
    hooks: PollerHooks,
}

impl ConfigPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the processing interval
    #[must_use]
    pub fn processing_interval(mut self, interval: Duration) -> Self {
        self.processing_interval = Some(interval);
        self
    }

    /// Set the queued interval
    #[must_use]
    pub fn queued_interval(mut self, interval: Duration) -> Self {
        self.queued_interval = Some(interval);
        self
    }

    /// Set the status-changed hook
    #[must_use]
    pub fn on_status_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskId, TaskStatus) + Send + Sync + 'static,
    {
        self.hooks.on_status_change = Some(Arc::new(hook));
        self
    }

    /// Set the completion hook
    #[must_use]
    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskId, &StatusReport) + Send + Sync + 'static,
    {
        self.hooks.on_complete = Some(Arc::new(hook));
        self
    }

    /// Set the failure hook
    #[must_use]
    pub fn on_failed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskId, &StatusReport) + Send + Sync + 'static,
    {
        self.hooks.on_failed = Some(Arc::new(hook));
        self
    }

    /// Set the fetch-error hook
    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskId, &FetchError) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(hook));
        self
    }

    /// Set the session-stopped hook
    #[must_use]
    pub fn on_stopped<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskId, StopReason) + Send + Sync + 'static,
    {
        self.hooks.on_stopped = Some(Arc::new(hook));
        self
    }

    /// Merge into existing settings, validating the result first
    pub(crate) fn apply_to(
        self,
        config: &mut PollerConfig,
        hooks: &mut PollerHooks,
    ) -> Result<(), ConfigError> {
        let mut next = *config;
        if let Some(interval) = self.processing_interval {
            next = next.with_processing_interval(interval);
        }
        if let Some(interval) = self.queued_interval {
            next = next.with_queued_interval(interval);
        }
        next.validate()?;

        *config = next;
        hooks.merge(self.hooks);
        Ok(())
    }
}

impl From<PollerConfig> for ConfigPatch {
    fn from(config: PollerConfig) -> Self {
        Self::new()
            .processing_interval(config.processing_interval())
            .queued_interval(config.queued_interval())
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
