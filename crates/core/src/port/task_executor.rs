// Task Executor Port
// Abstraction for the elastic thread supply backing a queue

use std::time::Duration;
use thiserror::Error;

/// A thread body handed to the executor
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Executor has been shut down")]
    Shutdown,

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
}

/// Task Executor trait
///
/// Implementations:
/// - ElasticThreadExecutor: cached thread pool with idle keep-alive
pub trait TaskExecutor: Send + Sync {
    /// Run `task` on some thread of the pool
    ///
    /// Must not run the task inline on the calling thread.
    ///
    /// # Errors
    /// - ExecutionError::Shutdown after `shutdown`
    /// - ExecutionError::SpawnFailed if no thread could be started
    fn execute(&self, task: Task) -> Result<(), ExecutionError>;

    /// Set how long an idle thread waits for a task before retiring
    fn set_keep_alive(&self, keep_alive: Duration);

    /// Stop accepting tasks. Must be idempotent and must not block on
    /// running tasks (it may be called from one of them).
    fn shutdown(&self);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread::{self, JoinHandle};

    /// Spawns one OS thread per task and records what the queue asked for
    #[derive(Default)]
    pub struct ThreadPerTaskExecutor {
        inner: Arc<Mutex<Recorded>>,
    }

    #[derive(Default)]
    struct Recorded {
        spawned: usize,
        keep_alive: Option<Duration>,
        shutdown_calls: usize,
        handles: Vec<JoinHandle<()>>,
    }

    impl ThreadPerTaskExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn spawned(&self) -> usize {
            self.inner.lock().unwrap().spawned
        }

        pub fn keep_alive(&self) -> Option<Duration> {
            self.inner.lock().unwrap().keep_alive
        }

        pub fn shutdown_calls(&self) -> usize {
            self.inner.lock().unwrap().shutdown_calls
        }

        /// Join every thread spawned so far
        pub fn join_all(&self) {
            let handles: Vec<_> = self.inner.lock().unwrap().handles.drain(..).collect();
            for handle in handles {
                let _ = handle.join();
            }
        }
    }

    impl TaskExecutor for ThreadPerTaskExecutor {
        fn execute(&self, task: Task) -> Result<(), ExecutionError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.shutdown_calls > 0 {
                return Err(ExecutionError::Shutdown);
            }
            inner.spawned += 1;
            inner.handles.push(thread::spawn(task));
            Ok(())
        }

        fn set_keep_alive(&self, keep_alive: Duration) {
            self.inner.lock().unwrap().keep_alive = Some(keep_alive);
        }

        fn shutdown(&self) {
            self.inner.lock().unwrap().shutdown_calls += 1;
        }
    }

    /// Refuses every task
    pub struct RejectingExecutor;

    impl TaskExecutor for RejectingExecutor {
        fn execute(&self, _task: Task) -> Result<(), ExecutionError> {
            Err(ExecutionError::SpawnFailed("mock rejection".to_string()))
        }

        fn set_keep_alive(&self, _keep_alive: Duration) {}

        fn shutdown(&self) {}
    }
}
