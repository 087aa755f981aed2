// condq Core - Conditional Execution Queue
// NO infrastructure dependencies: thread supply and leases come in through ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::ConditionalExecutionQueue;
pub use domain::{
    ConditionalExecution, ExecutionHandle, ExecutionItem, ItemFailure, QueueConfig, QueueState,
    QueueStats,
};
pub use error::{QueueError, Result};
pub use port::{TaskExecutor, WorkerLeaseCoordinator};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
