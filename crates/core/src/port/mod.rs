// Port Layer - Interfaces for external collaborators

pub mod task_executor;
pub mod worker_lease;

// Re-exports
pub use task_executor::{ExecutionError, Task, TaskExecutor};
pub use worker_lease::{NoLeaseCoordinator, WorkerLeaseCoordinator};
