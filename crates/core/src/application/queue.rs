// Conditional Execution Queue - public facade and elastic pool growth

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::worker::run_dispatch_loop;
use crate::domain::{
    ConditionalExecution, ExecutionHandle, ExecutionItem, QueueConfig, QueueState, QueueStats,
};
use crate::error::{QueueError, Result};
use crate::port::{TaskExecutor, WorkerLeaseCoordinator};

/// Fields guarded by the queue lock
pub(crate) struct QueueInner {
    pub(crate) queue: VecDeque<Box<dyn ExecutionItem>>,
    /// Live dispatch threads
    pub(crate) workers: usize,
    pub(crate) state: QueueState,
}

/// State shared between the facade and every dispatch thread
///
/// One mutex guards the item queue, the worker count and the lifecycle state;
/// `work_available` signals both "new work" and "stopped".
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) max_workers: usize,
    pub(crate) keep_alive: Duration,
    pub(crate) state: Mutex<QueueInner>,
    pub(crate) work_available: Condvar,
    pub(crate) executor: Arc<dyn TaskExecutor>,
    pub(crate) lease: Arc<dyn WorkerLeaseCoordinator>,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, QueueInner>> {
        self.state.lock().map_err(|_| QueueError::Poisoned {
            queue: self.name.clone(),
        })
    }

    fn interrupted(&self) -> QueueError {
        QueueError::WorkerInterrupted(self.name.clone())
    }

    /// Lock for state transitions that stay valid on a poisoned lock
    fn lock_unpoisoned(&self) -> MutexGuard<'_, QueueInner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start another dispatch thread
    ///
    /// Without `force` the pool only grows while items are waiting.
    /// Forced growth may push the pool past `max_workers`.
    fn grow_pool(self: &Arc<Self>, inner: &mut QueueInner, force: bool) -> Result<()> {
        if !force && inner.queue.is_empty() {
            return Ok(());
        }

        let grace = inner.queue.is_empty();
        inner.workers += 1;

        let shared = Arc::clone(self);
        if let Err(e) = self
            .executor
            .execute(Box::new(move || run_dispatch_loop(shared, grace)))
        {
            inner.workers -= 1;
            warn!(queue = %self.name, error = %e, "Failed to start dispatch thread");
            return Err(e.into());
        }

        debug!(
            queue = %self.name,
            workers = inner.workers,
            max_workers = self.max_workers,
            forced = force,
            "Worker pool grown"
        );
        Ok(())
    }

    /// Block until the calling dispatch thread has a reason to look at the queue
    ///
    /// Parks while the queue is Working, empty and not over-provisioned.
    pub(crate) fn wait_for_work(&self, grace: bool) -> Result<MutexGuard<'_, QueueInner>> {
        let mut inner = self.state.lock().map_err(|_| self.interrupted())?;

        if grace {
            let (guard, _) = self
                .work_available
                .wait_timeout_while(inner, self.keep_alive, |inner| {
                    inner.state.is_working() && inner.queue.is_empty()
                })
                .map_err(|_| self.interrupted())?;
            inner = guard;
        }

        self.work_available
            .wait_while(inner, |inner| {
                inner.state.is_working()
                    && inner.queue.is_empty()
                    && inner.workers <= self.max_workers
            })
            .map_err(|_| self.interrupted())
    }

    /// Non-blocking pop used between items of a batch
    pub(crate) fn next_ready(&self) -> Option<Box<dyn ExecutionItem>> {
        let mut inner = self.lock().ok()?;
        if inner.state.is_working() {
            inner.queue.pop_front()
        } else {
            None
        }
    }
}

/// Bounded, elastic worker pool dispatching execution items in FIFO order
///
/// Dropping the queue stops it.
///
/// # Example
/// ```ignore
/// let queue = ConditionalExecutionQueue::new(
///     QueueConfig::new("builds", 4),
///     Arc::new(ElasticThreadExecutor::new("builds")),
///     Arc::new(NoLeaseCoordinator),
/// )?;
/// let handle = queue.submit_fn(|| 40 + 2)?;
/// assert_eq!(handle.await_result()?, 42);
/// ```
pub struct ConditionalExecutionQueue {
    shared: Arc<Shared>,
}

impl ConditionalExecutionQueue {
    /// Create a queue backed by `executor`, running items under `lease`
    ///
    /// # Errors
    /// - QueueError::Config if the configuration is invalid
    pub fn new(
        config: QueueConfig,
        executor: Arc<dyn TaskExecutor>,
        lease: Arc<dyn WorkerLeaseCoordinator>,
    ) -> Result<Self> {
        config.validate()?;
        executor.set_keep_alive(config.keep_alive);

        info!(
            queue = %config.name,
            max_workers = config.max_workers,
            keep_alive_ms = config.keep_alive.as_millis() as u64,
            "Conditional execution queue created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                name: config.name,
                max_workers: config.max_workers,
                keep_alive: config.keep_alive,
                state: Mutex::new(QueueInner {
                    queue: VecDeque::new(),
                    workers: 0,
                    state: QueueState::Working,
                }),
                work_available: Condvar::new(),
                executor,
                lease,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    /// Enqueue an item at the tail of the queue
    ///
    /// # Errors
    /// - QueueError::Stopped if `stop` was called
    /// - QueueError::Executor if a needed dispatch thread could not be started;
    ///   the item is not kept in that case
    /// - QueueError::Poisoned if a thread panicked while holding the queue lock
    pub fn submit<I: ExecutionItem>(&self, item: I) -> Result<()> {
        self.submit_boxed(Box::new(item))
    }

    /// [`submit`](Self::submit) for an already boxed item
    pub fn submit_boxed(&self, item: Box<dyn ExecutionItem>) -> Result<()> {
        let mut inner = self.shared.lock()?;
        if !inner.state.is_working() {
            return Err(QueueError::Stopped {
                queue: self.shared.name.clone(),
            });
        }

        inner.queue.push_back(item);

        if inner.workers < self.shared.max_workers {
            if let Err(e) = self.shared.grow_pool(&mut inner, false) {
                inner.queue.pop_back();
                return Err(e);
            }
        }

        self.shared.work_available.notify_all();
        Ok(())
    }

    /// Submit a closure and get a handle to its result
    pub fn submit_fn<T, F>(&self, action: F) -> Result<ExecutionHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (execution, handle) = ConditionalExecution::new(action);
        self.submit(execution)?;
        Ok(handle)
    }

    /// Start one more dispatch thread regardless of queue occupancy
    ///
    /// Call this from a running item before it submits child work and waits
    /// on it, so a thread is free to pick the child up even when every
    /// existing thread is busy. The surplus thread retires once it runs out
    /// of work.
    ///
    /// # Errors
    /// - QueueError::Stopped if `stop` was called
    /// - QueueError::Executor if the thread could not be started
    /// - QueueError::Poisoned if a thread panicked while holding the queue lock
    pub fn expand(&self) -> Result<()> {
        let mut inner = self.shared.lock()?;
        if !inner.state.is_working() {
            return Err(QueueError::Stopped {
                queue: self.shared.name.clone(),
            });
        }
        self.shared.grow_pool(&mut inner, true)
    }

    /// Stop the queue and shut down the backing executor
    ///
    /// Terminal and idempotent. Items still queued are abandoned: they are
    /// never executed and their completion hook never fires.
    ///
    /// Abandoned items are dropped together with the queue. An item that
    /// captures an `Arc` of this queue (as nested work usually does) keeps the
    /// queue alive from inside its own backlog, so it is never dropped and its
    /// [`ExecutionHandle`] stays pending rather than resolving to
    /// `QueueError::Abandoned`. Do not wait on such handles after `stop`
    /// without a timeout.
    pub fn stop(&self) {
        {
            let mut inner = self.shared.lock_unpoisoned();
            if !inner.state.is_working() {
                return;
            }
            inner.state = QueueState::Stopped;

            if inner.queue.is_empty() {
                info!(queue = %self.shared.name, workers = inner.workers, "Stopping queue");
            } else {
                warn!(
                    queue = %self.shared.name,
                    workers = inner.workers,
                    abandoned = inner.queue.len(),
                    "Stopping queue with undispatched items"
                );
            }
            self.shared.work_available.notify_all();
        }

        self.shared.executor.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        !self.shared.lock_unpoisoned().state.is_working()
    }

    /// Snapshot of state, queue length and worker count
    pub fn stats(&self) -> QueueStats {
        let inner = self.shared.lock_unpoisoned();
        QueueStats {
            name: self.shared.name.clone(),
            state: inner.state,
            pending: inner.queue.len(),
            workers: inner.workers,
            max_workers: self.shared.max_workers,
        }
    }
}

impl Drop for ConditionalExecutionQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemFailure;
    use crate::port::task_executor::mocks::{RejectingExecutor, ThreadPerTaskExecutor};
    use crate::port::worker_lease::mocks::CountingLeaseCoordinator;
    use crate::port::NoLeaseCoordinator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn queue_with(
        max_workers: usize,
        executor: Arc<ThreadPerTaskExecutor>,
        lease: Arc<dyn WorkerLeaseCoordinator>,
    ) -> Arc<ConditionalExecutionQueue> {
        let config = QueueConfig::new("test", max_workers).with_keep_alive(Duration::from_secs(1));
        Arc::new(ConditionalExecutionQueue::new(config, executor, lease).unwrap())
    }

    /// Counts executions and completions; optionally panics
    struct Counted {
        fail: bool,
        executed: Arc<AtomicUsize>,
        failed: Arc<AtomicUsize>,
        completed: Arc<AtomicUsize>,
    }

    #[derive(Default, Clone)]
    struct Counters {
        executed: Arc<AtomicUsize>,
        failed: Arc<AtomicUsize>,
        completed: Arc<AtomicUsize>,
    }

    impl Counters {
        fn item(&self, fail: bool) -> Counted {
            Counted {
                fail,
                executed: Arc::clone(&self.executed),
                failed: Arc::clone(&self.failed),
                completed: Arc::clone(&self.completed),
            }
        }

        fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }
    }

    impl ExecutionItem for Counted {
        fn execute(&mut self) {
            self.executed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                panic!("counted failure");
            }
        }

        fn register_failure(&mut self, _failure: ItemFailure) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }

        fn complete(self: Box<Self>) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_new_applies_keep_alive() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let _queue = queue_with(2, executor.clone(), Arc::new(NoLeaseCoordinator));
        assert_eq!(executor.keep_alive(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = ConditionalExecutionQueue::new(
            QueueConfig::new("bad", 0),
            Arc::new(ThreadPerTaskExecutor::new()),
            Arc::new(NoLeaseCoordinator),
        );
        assert!(matches!(result, Err(QueueError::Config(_))));
    }

    #[test]
    fn test_single_worker_runs_all_items() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let queue = queue_with(1, executor.clone(), Arc::new(NoLeaseCoordinator));
        let counters = Counters::default();

        for _ in 0..3 {
            queue.submit(counters.item(false)).unwrap();
        }

        assert!(wait_until(|| counters.completed() == 3));
        assert_eq!(counters.executed.load(Ordering::SeqCst), 3);
        assert_eq!(executor.spawned(), 1, "max_workers=1 must never start a second thread");

        queue.stop();
        executor.join_all();
        assert_eq!(queue.stats().workers, 0);
    }

    #[test]
    fn test_items_dispatched_in_fifo_order() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let queue = queue_with(1, executor.clone(), Arc::new(NoLeaseCoordinator));
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let order = Arc::clone(&order);
                queue.submit_fn(move || order.lock().unwrap().push(i)).unwrap()
            })
            .collect();
        for handle in handles {
            handle.await_result().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
        queue.stop();
        executor.join_all();
    }

    #[test]
    fn test_submit_after_stop_fails() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let queue = queue_with(1, executor.clone(), Arc::new(NoLeaseCoordinator));
        let counters = Counters::default();

        queue.stop();
        let err = queue.submit(counters.item(false)).unwrap_err();

        assert!(matches!(err, QueueError::Stopped { ref queue } if queue == "test"));
        assert_eq!(queue.stats().pending, 0);
        assert_eq!(executor.spawned(), 0);
        assert!(matches!(queue.expand(), Err(QueueError::Stopped { .. })));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let queue = queue_with(1, executor.clone(), Arc::new(NoLeaseCoordinator));

        queue.stop();
        queue.stop();
        queue.stop();

        assert!(queue.is_stopped());
        assert_eq!(queue.stats().state, QueueState::Stopped);
        assert_eq!(executor.shutdown_calls(), 1);
    }

    #[test]
    fn test_panicking_item_completes_and_thread_survives() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let queue = queue_with(1, executor.clone(), Arc::new(NoLeaseCoordinator));
        let counters = Counters::default();

        queue.submit(counters.item(true)).unwrap();
        queue.submit(counters.item(false)).unwrap();

        assert!(wait_until(|| counters.completed() == 2));
        assert_eq!(counters.failed.load(Ordering::SeqCst), 1);
        assert_eq!(executor.spawned(), 1);
        assert_eq!(queue.stats().workers, 1);

        queue.stop();
        executor.join_all();
    }

    #[test]
    fn test_submit_fn_reports_panic_to_handle() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let queue = queue_with(1, executor.clone(), Arc::new(NoLeaseCoordinator));

        let handle = queue.submit_fn(|| -> u32 { panic!("bad input") }).unwrap();
        match handle.await_result() {
            Err(QueueError::ItemFailed(failure)) => assert_eq!(failure.message(), "bad input"),
            other => panic!("Expected ItemFailed, got {:?}", other),
        }

        queue.stop();
        executor.join_all();
    }

    #[test]
    fn test_batch_runs_under_one_lease() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let lease = Arc::new(CountingLeaseCoordinator::new());
        let queue = queue_with(1, executor.clone(), lease.clone());
        let counters = Counters::default();

        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        queue
            .submit_fn(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();

        started_rx.recv_timeout(WAIT).unwrap();
        queue.submit(counters.item(false)).unwrap();
        queue.submit(counters.item(false)).unwrap();
        release_tx.send(()).unwrap();

        assert!(wait_until(|| counters.completed() == 2));
        assert_eq!(lease.lease_calls(), 1);

        queue.stop();
        executor.join_all();
    }

    #[test]
    fn test_expand_admits_nested_work() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let queue = queue_with(1, executor.clone(), Arc::new(NoLeaseCoordinator));

        let inner_queue = Arc::clone(&queue);
        let parent = queue
            .submit_fn(move || {
                inner_queue.expand().unwrap();
                let child = inner_queue.submit_fn(|| 2).unwrap();
                child.await_result().unwrap() + 1
            })
            .unwrap();

        assert_eq!(parent.await_result_timeout(WAIT).unwrap(), 3);
        assert_eq!(executor.spawned(), 2);

        // Surplus thread retires once the child is done
        assert!(wait_until(|| queue.stats().workers <= 1));

        queue.stop();
        executor.join_all();
    }

    #[test]
    fn test_stop_abandons_queued_items() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let queue = queue_with(1, executor.clone(), Arc::new(NoLeaseCoordinator));
        let counters = Counters::default();

        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let blocker = queue
            .submit_fn(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();

        started_rx.recv_timeout(WAIT).unwrap();
        queue.submit(counters.item(false)).unwrap();
        queue.stop();
        release_tx.send(()).unwrap();

        blocker.await_result().unwrap();
        executor.join_all();

        // Abandoned: never executed, completion hook never fired
        assert_eq!(counters.executed.load(Ordering::SeqCst), 0);
        assert_eq!(counters.completed(), 0);
        assert_eq!(queue.stats().pending, 1);
        assert_eq!(queue.stats().workers, 0);
    }

    #[test]
    fn test_executor_rejection_is_reported() {
        let queue = ConditionalExecutionQueue::new(
            QueueConfig::new("rejecting", 1),
            Arc::new(RejectingExecutor),
            Arc::new(NoLeaseCoordinator),
        )
        .unwrap();
        let counters = Counters::default();

        let err = queue.submit(counters.item(false)).unwrap_err();
        assert!(matches!(err, QueueError::Executor(_)));

        let stats = queue.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.workers, 0);
        assert!(queue.expand().is_err());
    }

    #[test]
    fn test_drop_stops_queue() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let queue = ConditionalExecutionQueue::new(
            QueueConfig::new("dropped", 1),
            executor.clone(),
            Arc::new(NoLeaseCoordinator),
        )
        .unwrap();
        queue.submit_fn(|| ()).unwrap().await_result().unwrap();

        drop(queue);
        assert_eq!(executor.shutdown_calls(), 1);
        executor.join_all();
    }

    #[test]
    fn test_poisoned_lock_terminates_worker_and_rejects_submit() {
        let executor = Arc::new(ThreadPerTaskExecutor::new());
        let queue = queue_with(1, executor.clone(), Arc::new(NoLeaseCoordinator));
        let counters = Counters::default();

        queue.submit(counters.item(false)).unwrap();
        assert!(wait_until(|| counters.completed() == 1));
        assert_eq!(queue.stats().workers, 1);

        let shared = Arc::clone(&queue.shared);
        let poisoner = std::thread::spawn(move || {
            let _guard = shared.state.lock().unwrap();
            panic!("panic while holding the queue lock");
        });
        assert!(poisoner.join().is_err());
        assert!(queue.shared.state.is_poisoned());

        queue.shared.work_available.notify_all();
        executor.join_all();

        // The dispatch thread gave up and its slot was still released
        assert_eq!(queue.stats().workers, 0);
        assert!(matches!(
            queue.submit(counters.item(false)),
            Err(QueueError::Poisoned { ref queue }) if queue == "test"
        ));
        assert!(matches!(queue.expand(), Err(QueueError::Poisoned { .. })));

        queue.stop();
        assert!(queue.is_stopped());
    }
}
