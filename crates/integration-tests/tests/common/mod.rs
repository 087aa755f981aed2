//! Shared fixtures for queue integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use condq_core::{ConditionalExecutionQueue, ExecutionItem, ItemFailure, QueueConfig};
use condq_infra_system::{ElasticThreadExecutor, SemaphoreLeaseCoordinator};

pub const WAIT: Duration = Duration::from_secs(10);
pub const KEEP_ALIVE: Duration = Duration::from_millis(100);

pub struct Fixture {
    pub queue: Arc<ConditionalExecutionQueue>,
    pub executor: Arc<ElasticThreadExecutor>,
    pub lease: Arc<SemaphoreLeaseCoordinator>,
}

/// Queue over the real adapters with a short keep-alive
pub fn fixture(name: &str, max_workers: usize, max_leases: usize) -> Fixture {
    let executor = Arc::new(ElasticThreadExecutor::new(name));
    let lease = Arc::new(SemaphoreLeaseCoordinator::new(max_leases));
    let config = QueueConfig::new(name, max_workers).with_keep_alive(KEEP_ALIVE);
    let queue = ConditionalExecutionQueue::new(config, executor.clone(), lease.clone())
        .expect("valid queue config");

    Fixture {
        queue: Arc::new(queue),
        executor,
        lease,
    }
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Shared tallies for [`Counted`] items
#[derive(Default, Clone)]
pub struct Counters {
    pub executed: Arc<AtomicUsize>,
    pub failed: Arc<AtomicUsize>,
    pub completed: Arc<AtomicUsize>,
}

impl Counters {
    pub fn item(&self) -> Counted {
        self.item_with(false, Duration::ZERO)
    }

    pub fn failing_item(&self) -> Counted {
        self.item_with(true, Duration::ZERO)
    }

    pub fn item_with(&self, fail: bool, work: Duration) -> Counted {
        Counted {
            fail,
            work,
            counters: self.clone(),
        }
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Item that tallies execute / register_failure / complete calls
pub struct Counted {
    fail: bool,
    work: Duration,
    counters: Counters,
}

impl ExecutionItem for Counted {
    fn execute(&mut self) {
        self.counters.executed.fetch_add(1, Ordering::SeqCst);
        if !self.work.is_zero() {
            thread::sleep(self.work);
        }
        if self.fail {
            panic!("counted item failure");
        }
    }

    fn register_failure(&mut self, _failure: ItemFailure) {
        self.counters.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn complete(self: Box<Self>) {
        self.counters.completed.fetch_add(1, Ordering::SeqCst);
    }
}
