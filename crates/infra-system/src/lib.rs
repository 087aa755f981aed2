// condq Infrastructure - System Adapters
// Implements: TaskExecutor, WorkerLeaseCoordinator

pub mod elastic_executor;
pub mod worker_lease;

pub use elastic_executor::ElasticThreadExecutor;
pub use worker_lease::SemaphoreLeaseCoordinator;
