// Application Layer - Queue facade and dispatch loop

pub mod queue;
pub mod worker;

// Re-exports
pub use queue::ConditionalExecutionQueue;
pub use worker::{execute_guarded, PanicGuardResult};
