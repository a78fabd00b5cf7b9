//! Status-fetch capability
//!
//! The poller never talks to the backend itself. Each session is handed a
//! [`StatusFetcher`] that performs one status request and observes the
//! session's cancellation token.

use async_trait::async_trait;
use jobtrack_core::TaskStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// One answer from the status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Current backend status
    pub status: TaskStatus,
    /// Result payload, usually present on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description, usually present on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReport {
    /// Report with just a status
    #[inline]
    #[must_use]
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            data: None,
            error: None,
        }
    }

    /// Job is waiting to run
    #[inline]
    #[must_use]
    pub fn queued() -> Self {
        Self::new(TaskStatus::Queued)
    }

    /// Job is running
    #[inline]
    #[must_use]
    pub fn processing() -> Self {
        Self::new(TaskStatus::Processing)
    }

    /// Job finished with an optional payload
    #[inline]
    #[must_use]
    pub fn completed(data: Option<Value>) -> Self {
        Self {
            data,
            ..Self::new(TaskStatus::Completed)
        }
    }

    /// Job failed with an error message
    #[inline]
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(TaskStatus::Failed)
        }
    }

    /// Error message for a failed job, with a fallback when the backend sent none
    #[must_use]
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("job failed")
    }
}

/// Why a status request did not produce a report
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Request was abandoned through its cancellation token
    #[error("request cancelled")]
    Cancelled,

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the fetcher's own deadline
    #[error("request timed out")]
    Timeout,

    /// Endpoint answered with a non-success status code
    #[error("status endpoint returned {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response body could not be decoded
    #[error("malformed status response: {0}")]
    Decode(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Cancellation is not an error and is discarded silently
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Every non-cancellation failure is retried at the slow cadence
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !self.is_cancellation()
    }
}

/// Fetch the current status of one job.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Perform one status request.
    ///
    /// Implementations should abandon the request and return
    /// [`FetchError::Cancelled`] once `cancel` fires. The poller also drops
    /// the returned future on cancellation, so cooperation is not required
    /// for correctness.
    async fn fetch_status(&self, cancel: CancellationToken) -> Result<StatusReport, FetchError>;
}

#[async_trait]
impl<F, Fut> StatusFetcher for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StatusReport, FetchError>> + Send + 'static,
{
    async fn fetch_status(&self, cancel: CancellationToken) -> Result<StatusReport, FetchError> {
        (self)(cancel).await
    }
}
