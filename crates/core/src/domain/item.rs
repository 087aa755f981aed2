// Execution Item - a unit of work plus its completion hook

use thiserror::Error;

/// Failure raised by the action of an execution item
///
/// Carries the panic message recovered by the dispatch loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ItemFailure {
    message: String,
}

impl ItemFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A unit of work queued for dispatch
///
/// The queue owns the item from `submit` until a dispatch thread has run it.
/// The dispatch loop guarantees the call order:
///
/// 1. `execute` exactly once
/// 2. `register_failure` if and only if `execute` panicked
/// 3. `complete` exactly once (it consumes the item)
///
/// Items still queued when the queue stops are never executed and never
/// completed; they are dropped with the queue.
pub trait ExecutionItem: Send + 'static {
    /// Run the action
    fn execute(&mut self);

    /// Record a failure of `execute`
    fn register_failure(&mut self, _failure: ItemFailure) {}

    /// Signal completion to whoever waits on this item
    fn complete(self: Box<Self>);
}
