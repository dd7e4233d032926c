//! Core error types.
//!
//! All broker subsystems surface errors through [`CoreError`], which is the
//! single error type returned by every public API in this crate.

/// Unified error type for the renderd scheduling core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// `pop`/`peek` was called on an empty [`crate::queue::PriorityTaskQueue`].
    #[error("queue is empty")]
    QueueEmpty,

    /// `remove` was called with an `id` that has no running task group.
    #[error("no running task group for id: {id}")]
    GroupNotFound { id: String },

    /// A task was submitted with a priority below the lowest admission
    /// threshold in the process priority vector.
    #[error("task priority {priority} is below the admission floor {floor}")]
    PriorityBelowFloor { priority: i64, floor: i64 },

    /// The process priority vector passed to [`crate::render_queue::RenderQueue::new`]
    /// was empty; there is no sensible admission policy without at least one slot.
    #[error("process priority vector must not be empty")]
    EmptyPriorityVector,

    /// [`crate::pool::WorkerPool::get`] was called while no worker was idle.
    #[error("no idle worker available")]
    NoAvailableWorker,

    /// A channel behind the broker or worker pool closed unexpectedly.
    #[error("internal channel closed: {0}")]
    ChannelClosed(&'static str),

    /// The broker has already been shut down and will not accept new work.
    #[error("broker is shut down")]
    BrokerShutdown,

    /// Catch-all for invariant violations that should never happen in
    /// correct operation; surfaced rather than panicking where caller
    /// input can't trigger it.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
