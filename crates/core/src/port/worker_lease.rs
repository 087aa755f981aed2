// Worker Lease Port
// The queue runs every batch of items under a lease so that its threads are
// visible to permit accounting shared with other subsystems.

/// Worker Lease Coordinator trait
///
/// Implementations:
/// - NoLeaseCoordinator: no accounting, runs actions directly
/// - SemaphoreLeaseCoordinator: bounded number of concurrent leases
pub trait WorkerLeaseCoordinator: Send + Sync {
    /// Run `action` on the current thread while holding a worker lease
    ///
    /// Must invoke `action` exactly once, blocking first if no lease is
    /// available.
    fn run_as_worker_thread(&self, action: &mut dyn FnMut());

    /// Run `action` with the current thread's lease temporarily released
    ///
    /// Intended for waits on other work (e.g. a parent item awaiting its
    /// child). The default simply runs the action.
    fn blocking(&self, action: &mut dyn FnMut()) {
        action();
    }
}

/// Coordinator without any lease accounting
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLeaseCoordinator;

impl WorkerLeaseCoordinator for NoLeaseCoordinator {
    fn run_as_worker_thread(&self, action: &mut dyn FnMut()) {
        action();
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runs actions directly and counts the calls
    #[derive(Default)]
    pub struct CountingLeaseCoordinator {
        leases: AtomicUsize,
        blocking: AtomicUsize,
    }

    impl CountingLeaseCoordinator {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of `run_as_worker_thread` calls (one per drained batch)
        pub fn lease_calls(&self) -> usize {
            self.leases.load(Ordering::SeqCst)
        }

        pub fn blocking_calls(&self) -> usize {
            self.blocking.load(Ordering::SeqCst)
        }
    }

    impl WorkerLeaseCoordinator for CountingLeaseCoordinator {
        fn run_as_worker_thread(&self, action: &mut dyn FnMut()) {
            self.leases.fetch_add(1, Ordering::SeqCst);
            action();
        }

        fn blocking(&self, action: &mut dyn FnMut()) {
            self.blocking.fetch_add(1, Ordering::SeqCst);
            action();
        }
    }
}
