// Conditional Execution - closure-backed execution item with an awaitable result

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::item::{ExecutionItem, ItemFailure};
use crate::error::{QueueError, Result};
use crate::port::WorkerLeaseCoordinator;

type Action<T> = Box<dyn FnOnce() -> T + Send + 'static>;

enum Slot<T> {
    Pending,
    Done(std::result::Result<T, ItemFailure>),
    Abandoned,
    Taken,
}

struct Completion<T> {
    slot: Mutex<Slot<T>>,
    done: Condvar,
}

impl<T> Completion<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        // The slot holds no invariant a panicking holder could break
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the final state once; later publications are ignored.
    fn publish(&self, slot: Slot<T>) {
        let mut guard = self.lock();
        if matches!(*guard, Slot::Pending) {
            *guard = slot;
        }
        drop(guard);
        self.done.notify_all();
    }
}

/// An execution item wrapping a closure whose result is delivered to an
/// [`ExecutionHandle`] when the item completes.
///
/// A panic inside the closure is caught by the dispatch loop and surfaced to
/// the handle as [`QueueError::ItemFailed`].
pub struct ConditionalExecution<T> {
    action: Option<Action<T>>,
    outcome: Option<std::result::Result<T, ItemFailure>>,
    completion: Arc<Completion<T>>,
    completed: bool,
}

impl<T: Send + 'static> ConditionalExecution<T> {
    /// Create an execution and the handle used to await its result
    pub fn new<F>(action: F) -> (Self, ExecutionHandle<T>)
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let completion = Arc::new(Completion {
            slot: Mutex::new(Slot::Pending),
            done: Condvar::new(),
        });

        let execution = Self {
            action: Some(Box::new(action)),
            outcome: None,
            completion: Arc::clone(&completion),
            completed: false,
        };

        (execution, ExecutionHandle { completion })
    }
}

impl<T: Send + 'static> ExecutionItem for ConditionalExecution<T> {
    fn execute(&mut self) {
        if let Some(action) = self.action.take() {
            self.outcome = Some(Ok(action()));
        }
    }

    fn register_failure(&mut self, failure: ItemFailure) {
        self.outcome = Some(Err(failure));
    }

    fn complete(mut self: Box<Self>) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| Err(ItemFailure::new("execution completed without running")));
        self.completed = true;
        self.completion.publish(Slot::Done(outcome));
    }
}

impl<T> Drop for ConditionalExecution<T> {
    fn drop(&mut self) {
        // Dropped without completing: still queued when the queue went away
        if !self.completed {
            self.completion.publish(Slot::Abandoned);
        }
    }
}

/// Handle to the result of a [`ConditionalExecution`]
pub struct ExecutionHandle<T> {
    completion: Arc<Completion<T>>,
}

impl<T> ExecutionHandle<T> {
    /// Check whether the execution has completed (or was abandoned)
    pub fn is_complete(&self) -> bool {
        !matches!(*self.completion.lock(), Slot::Pending)
    }

    /// Block until the execution completes and return its result
    ///
    /// # Errors
    /// - `QueueError::ItemFailed` if the action panicked
    /// - `QueueError::Abandoned` if the execution was dropped without running
    pub fn await_result(self) -> Result<T> {
        let guard = self.completion.lock();
        let mut guard = self
            .completion
            .done
            .wait_while(guard, |slot| matches!(slot, Slot::Pending))
            .unwrap_or_else(PoisonError::into_inner);
        take_outcome(&mut guard)
    }

    /// Like [`await_result`](Self::await_result), but gives up after `timeout`
    ///
    /// On `QueueError::Timeout` the handle remains usable.
    pub fn await_result_timeout(&self, timeout: Duration) -> Result<T> {
        let guard = self.completion.lock();
        let (mut guard, _) = self
            .completion
            .done
            .wait_timeout_while(guard, timeout, |slot| matches!(slot, Slot::Pending))
            .unwrap_or_else(PoisonError::into_inner);

        if matches!(*guard, Slot::Pending) {
            return Err(QueueError::Timeout(timeout.as_millis()));
        }
        take_outcome(&mut guard)
    }

    /// Await the result with the current thread's worker lease released
    ///
    /// Use this from inside a running item that waits on a child item, so the
    /// child can obtain a lease when leases are bounded.
    pub fn await_blocking(self, lease: &dyn WorkerLeaseCoordinator) -> Result<T> {
        let mut handle = Some(self);
        let mut result = None;
        lease.blocking(&mut || {
            if let Some(handle) = handle.take() {
                result = Some(handle.await_result());
            }
        });
        result.unwrap_or(Err(QueueError::Abandoned))
    }
}

fn take_outcome<T>(slot: &mut Slot<T>) -> Result<T> {
    match std::mem::replace(slot, Slot::Taken) {
        Slot::Done(Ok(value)) => Ok(value),
        Slot::Done(Err(failure)) => Err(QueueError::ItemFailed(failure)),
        Slot::Pending | Slot::Abandoned | Slot::Taken => Err(QueueError::Abandoned),
    }
}
