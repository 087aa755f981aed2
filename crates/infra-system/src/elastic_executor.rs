// Elastic Thread Executor
// Implements: TaskExecutor (cached OS thread pool)

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use condq_core::application::worker::constants::{DEFAULT_KEEP_ALIVE, DEFAULT_THREAD_NAME_PREFIX};
use condq_core::application::{execute_guarded, PanicGuardResult};
use condq_core::port::task_executor::{ExecutionError, Task, TaskExecutor};

/// Cached thread pool
///
/// A task is handed to a parked idle thread when one exists, otherwise a new
/// named thread is spawned for it. Threads that find no task within the
/// keep-alive window retire, so the pool shrinks back after a surge.
pub struct ElasticThreadExecutor {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    name_prefix: String,
    state: Mutex<PoolState>,
    /// Signalled when a task is handed off or on shutdown
    handoff: Condvar,
    /// Signalled when the last thread retires
    terminated: Condvar,
    next_thread_id: AtomicUsize,
}

struct PoolState {
    keep_alive: Duration,
    /// Tasks handed to idle threads but not yet picked up
    pending: VecDeque<Task>,
    idle: usize,
    live: usize,
    shutdown: bool,
}

impl ElasticThreadExecutor {
    /// Create an executor whose threads are named `{name_prefix}-{n}`
    ///
    /// # Example
    /// ```ignore
    /// let executor = ElasticThreadExecutor::new("builds")
    ///     .with_keep_alive(Duration::from_secs(5));
    /// ```
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name_prefix: name_prefix.into(),
                state: Mutex::new(PoolState {
                    keep_alive: DEFAULT_KEEP_ALIVE,
                    pending: VecDeque::new(),
                    idle: 0,
                    live: 0,
                    shutdown: false,
                }),
                handoff: Condvar::new(),
                terminated: Condvar::new(),
                next_thread_id: AtomicUsize::new(1),
            }),
        }
    }

    pub fn with_keep_alive(self, keep_alive: Duration) -> Self {
        self.set_keep_alive(keep_alive);
        self
    }

    /// Threads currently alive (busy or idle)
    pub fn live_threads(&self) -> usize {
        self.inner.lock().live
    }

    /// Threads parked waiting for a task
    pub fn idle_threads(&self) -> usize {
        self.inner.lock().idle
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }

    /// Wait until every thread has retired
    ///
    /// Returns false if threads are still alive after `timeout`.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let state = self.inner.lock();
        let (state, _) = self
            .inner
            .terminated
            .wait_timeout_while(state, timeout, |s| s.live > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.live == 0
    }
}

impl Default for ElasticThreadExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_THREAD_NAME_PREFIX)
    }
}

impl TaskExecutor for ElasticThreadExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutionError> {
        let mut state = self.inner.lock();
        if state.shutdown {
            return Err(ExecutionError::Shutdown);
        }

        if state.pending.len() < state.idle {
            state.pending.push_back(task);
            self.inner.handoff.notify_one();
            return Ok(());
        }

        let id = self.inner.next_thread_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.inner.name_prefix, id);
        let inner = Arc::clone(&self.inner);

        state.live += 1;
        match thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(inner, task))
        {
            Ok(_) => {
                debug!(thread = %name, live = state.live, "Executor thread spawned");
                Ok(())
            }
            Err(e) => {
                state.live -= 1;
                warn!(thread = %name, error = %e, "Failed to spawn executor thread");
                Err(ExecutionError::SpawnFailed(e.to_string()))
            }
        }
    }

    fn set_keep_alive(&self, keep_alive: Duration) {
        self.inner.lock().keep_alive = keep_alive;
    }

    fn shutdown(&self) {
        let mut state = self.inner.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        info!(
            executor = %self.inner.name_prefix,
            live = state.live,
            idle = state.idle,
            "Executor shutting down"
        );
        self.inner.handoff.notify_all();
    }
}

impl Drop for ElasticThreadExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Plain counters and a task list; a panicked holder leaves them usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park until a task is handed off, or retire the calling thread
    fn next_task(&self) -> Option<Task> {
        let mut state = self.lock();
        let keep_alive = state.keep_alive;

        state.idle += 1;
        let (mut state, _) = self
            .handoff
            .wait_timeout_while(state, keep_alive, |s| s.pending.is_empty() && !s.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
        state.idle -= 1;

        if let Some(task) = state.pending.pop_front() {
            return Some(task);
        }

        state.live -= 1;
        debug!(
            executor = %self.name_prefix,
            live = state.live,
            reason = if state.shutdown { "shutdown" } else { "idle" },
            "Executor thread retired"
        );
        if state.live == 0 {
            self.terminated.notify_all();
        }
        None
    }
}

fn worker_loop(inner: Arc<PoolInner>, first: Task) {
    let mut task = Some(first);
    while let Some(current) = task.take() {
        if let PanicGuardResult::Panicked(msg) = execute_guarded(AssertUnwindSafe(current)) {
            warn!(executor = %inner.name_prefix, panic_msg = %msg, "Executor task panicked");
        }
        task = inner.next_task();
    }
}
