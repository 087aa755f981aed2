// Worker - per-thread dispatch loop
//
// WaitingForWork -> Draining -> (WaitingForWork | Exiting)

pub mod constants;
mod panic_guard;

pub use panic_guard::{execute_guarded, PanicGuardResult};

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError};
use tracing::{debug, error, warn};

use crate::application::queue::{QueueInner, Shared};
use crate::domain::{ExecutionItem, ItemFailure};
use crate::error::Result;

/// Accounts for one live dispatch thread in the shared worker count
///
/// The count is normally released under the lock at the moment the thread
/// decides to exit; the drop path covers lock poisoning and unwinding.
struct WorkerSlot<'a> {
    shared: &'a Shared,
    released: bool,
}

impl<'a> WorkerSlot<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared,
            released: false,
        }
    }

    fn release(&mut self, inner: &mut QueueInner) {
        if !self.released {
            inner.workers = inner.workers.saturating_sub(1);
            self.released = true;
        }
    }
}

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        if !self.released {
            let mut inner = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            inner.workers = inner.workers.saturating_sub(1);
            self.released = true;
        }
    }
}

/// Body of a dispatch thread, handed to the backing executor on pool growth
///
/// `grace` is set for threads started by forced growth while the queue was
/// empty: such a thread waits up to the keep-alive window for its first item
/// before the over-provisioning rule may retire it.
pub(crate) fn run_dispatch_loop(shared: Arc<Shared>, grace: bool) {
    let mut slot = WorkerSlot::new(&shared);
    debug!(queue = %shared.name, grace, "Dispatch thread started");

    match dispatch(&shared, &mut slot, grace) {
        Ok(()) => debug!(queue = %shared.name, "Dispatch thread exiting"),
        Err(e) => error!(queue = %shared.name, error = %e, "Dispatch thread terminated"),
    }
}

fn dispatch(shared: &Shared, slot: &mut WorkerSlot<'_>, mut grace: bool) -> Result<()> {
    loop {
        let item = {
            let mut inner = shared.wait_for_work(grace)?;
            grace = false;

            let next = if inner.state.is_working() {
                inner.queue.pop_front()
            } else {
                None
            };

            match next {
                Some(item) => item,
                None => {
                    // Stopped, or surplus capacity with nothing left to do
                    slot.release(&mut inner);
                    return Ok(());
                }
            }
        };

        drain(shared, item);
    }
}

/// Run `first` and then every further ready item under a single lease
fn drain(shared: &Shared, first: Box<dyn ExecutionItem>) {
    let mut next = Some(first);
    let mut executed = 0usize;

    shared.lease.run_as_worker_thread(&mut || {
        while let Some(item) = next.take() {
            run_item(&shared.name, item);
            executed += 1;
            next = shared.next_ready();
        }
    });

    if let Some(mut item) = next {
        error!(queue = %shared.name, "Worker lease coordinator did not run the batch");
        item.register_failure(ItemFailure::new(
            "worker lease coordinator did not run the item",
        ));
        complete_item(&shared.name, item);
    }

    debug!(queue = %shared.name, executed, "Batch drained");
}

/// Execute one item; `complete` runs whether or not the action panicked
fn run_item(queue: &str, mut item: Box<dyn ExecutionItem>) {
    let outcome = execute_guarded(AssertUnwindSafe(|| item.execute()));
    if let PanicGuardResult::Panicked(msg) = outcome {
        error!(queue = %queue, panic_msg = %msg, "Execution item failed");
        item.register_failure(ItemFailure::new(msg));
    }
    complete_item(queue, item);
}

fn complete_item(queue: &str, item: Box<dyn ExecutionItem>) {
    let completion = AssertUnwindSafe(move || item.complete());
    if let PanicGuardResult::Panicked(msg) = execute_guarded(completion) {
        warn!(queue = %queue, panic_msg = %msg, "Completion hook panicked");
    }
}
