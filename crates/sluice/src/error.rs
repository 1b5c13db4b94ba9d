//! Error types for the bridge.
//!
//! This module defines the central `Error` enum, which captures every
//! recoverable and reportable failure inside the bridge. None of them are
//! fatal: rejected requests leave state untouched, and task failures are
//! isolated to the row that produced them.
//!
//! ## Error Cases
//! - `InvalidRequest`: A load request was malformed or exceeded bounds.
//! - `AlreadyLoading`: A load or clear arrived while a session is active.
//! - `WorkerTaskFailure`: A single generation task failed or panicked.
//! - `QueueFull`: The bounded hand-off queue rejected a row.
//! - `ChannelError`: An internal communication failure between contexts.
//! - `ServiceShutdown`: A request arrived while the bridge was shutting down.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the bridge.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// A load session is already in flight.
    #[error("A load is already running")]
    AlreadyLoading,

    /// A single worker task failed; the row it was producing is skipped.
    #[error("Worker task failed: {reason}")]
    WorkerTaskFailure { reason: String },

    /// The bounded hand-off queue is at capacity and the row was dropped.
    #[error("Hand-off queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The bridge is in the process of shutting down.
    #[error("Bridge is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Returns `true` for errors that reject a request without changing any
    /// state.
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. } | Self::AlreadyLoading | Self::ServiceShutdown
        )
    }
}
