//! Error types for jobtrack core
//!
//! The store never surfaces these through its mutation API; they describe
//! what went wrong inside the durable storage capability and the status
//! transition rules.

use crate::types::TaskStatus;

/// Durable storage failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying file I/O failed
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Storage capability is not available in this environment
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Write rejected because the backend is full
    #[error("storage quota exceeded for key {0}")]
    QuotaExceeded(String),

    /// Stored bytes are not valid UTF-8
    #[error("stored value for key {0} is not valid UTF-8")]
    InvalidEncoding(String),
}

/// Status edge outside the transition graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition: {from} -> {to}")]
pub struct TransitionError {
    /// Current status
    pub from: TaskStatus,
    /// Requested status
    pub to: TaskStatus,
}
