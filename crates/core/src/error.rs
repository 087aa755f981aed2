// Central Error Type for the Queue

use thiserror::Error;

/// Queue-level error type
#[derive(Error, Debug)]
pub enum QueueError {
    /// `submit` was called after `stop`; a stopped queue cannot be reused.
    #[error("Queue '{queue}' has been stopped and cannot accept new work")]
    Stopped { queue: String },

    /// The shared lock was poisoned while a dispatch thread waited on it.
    #[error("Worker interrupted while waiting for work in queue '{0}'")]
    WorkerInterrupted(String),

    /// A thread panicked while holding the queue lock; the queue no longer
    /// accepts work.
    #[error("Queue '{queue}' is unusable: its state lock was poisoned")]
    Poisoned { queue: String },

    #[error("Executor error: {0}")]
    Executor(#[from] crate::port::ExecutionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution failed: {0}")]
    ItemFailed(#[from] crate::domain::ItemFailure),

    #[error("Execution was abandoned before it completed")]
    Abandoned,

    #[error("Timed out after {0}ms waiting for completion")]
    Timeout(u128),
}

/// Result type alias using QueueError
pub type Result<T> = std::result::Result<T, QueueError>;
