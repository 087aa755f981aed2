// Domain Layer - Execution items, queue lifecycle and configuration

pub mod execution;
pub mod item;
pub mod queue;
pub mod state;

// Re-exports
pub use execution::{ConditionalExecution, ExecutionHandle};
pub use item::{ExecutionItem, ItemFailure};
pub use queue::QueueConfig;
pub use state::{QueueState, QueueStats};
