// Semaphore-backed worker lease coordinator
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use condq_core::port::WorkerLeaseCoordinator;

static NEXT_COORDINATOR_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Coordinators whose lease the current thread holds
    static HELD_LEASES: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Grants at most `max_leases` concurrent worker leases
///
/// Leases are re-entrant per thread: a thread that already holds a lease of
/// this coordinator runs nested actions without acquiring another one.
pub struct SemaphoreLeaseCoordinator {
    id: u64,
    max_leases: usize,
    granted: Mutex<usize>,
    available: Condvar,
}

impl SemaphoreLeaseCoordinator {
    /// Create a coordinator; `max_leases` is clamped to at least 1
    pub fn new(max_leases: usize) -> Self {
        Self {
            id: NEXT_COORDINATOR_ID.fetch_add(1, Ordering::Relaxed),
            max_leases: max_leases.max(1),
            granted: Mutex::new(0),
            available: Condvar::new(),
        }
    }

    pub fn max_leases(&self) -> usize {
        self.max_leases
    }

    /// Leases currently held across all threads
    pub fn granted(&self) -> usize {
        *self.lock()
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        HELD_LEASES.with(|held| held.borrow().contains(&self.id))
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.granted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) {
        let mut granted = self.lock();
        if *granted >= self.max_leases {
            debug!(
                granted = *granted,
                max_leases = self.max_leases,
                "Waiting for worker lease"
            );
        }
        granted = self
            .available
            .wait_while(granted, |granted| *granted >= self.max_leases)
            .unwrap_or_else(PoisonError::into_inner);
        *granted += 1;
        trace!(granted = *granted, "Worker lease acquired");
        drop(granted);

        HELD_LEASES.with(|held| held.borrow_mut().push(self.id));
    }

    fn release(&self) {
        HELD_LEASES.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|id| *id == self.id) {
                held.remove(pos);
            }
        });

        let mut granted = self.lock();
        *granted = granted.saturating_sub(1);
        trace!(granted = *granted, "Worker lease released");
        drop(granted);
        self.available.notify_one();
    }
}

/// Releases the lease when the leased action returns or unwinds
struct LeaseGuard<'a>(&'a SemaphoreLeaseCoordinator);

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Takes the lease back after a blocking section
struct ReacquireGuard<'a>(&'a SemaphoreLeaseCoordinator);

impl Drop for ReacquireGuard<'_> {
    fn drop(&mut self) {
        self.0.acquire();
    }
}

impl WorkerLeaseCoordinator for SemaphoreLeaseCoordinator {
    fn run_as_worker_thread(&self, action: &mut dyn FnMut()) {
        if self.is_held_by_current_thread() {
            action();
            return;
        }

        self.acquire();
        let _lease = LeaseGuard(self);
        action();
    }

    fn blocking(&self, action: &mut dyn FnMut()) {
        if !self.is_held_by_current_thread() {
            action();
            return;
        }

        self.release();
        let _reacquire = ReacquireGuard(self);
        action();
    }
}
