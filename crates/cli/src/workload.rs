//! Synthetic workload driven through a conditional execution queue

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use condq_core::port::NoLeaseCoordinator;
use condq_core::{ConditionalExecutionQueue, QueueError, QueueStats, WorkerLeaseCoordinator};
use condq_infra_system::{ElasticThreadExecutor, SemaphoreLeaseCoordinator};

use crate::settings::{Settings, WorkloadSettings};

/// Outcome of a workload run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub nested: usize,
    /// Highest worker count observed by a running item
    pub peak_workers: usize,
    pub elapsed_ms: u64,
    /// Backing threads all retired within the keep-alive window after stop
    pub executor_terminated: bool,
    pub final_stats: QueueStats,
}

/// What a single item of the workload does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ItemPlan {
    work: Duration,
    nested: bool,
    fail: bool,
}

fn plan_items(workload: &WorkloadSettings, rng: &mut impl Rng) -> Vec<ItemPlan> {
    (1..=workload.items)
        .map(|n| {
            let jitter = if workload.jitter_ms > 0 {
                rng.gen_range(0..=workload.jitter_ms)
            } else {
                0
            };
            ItemPlan {
                work: Duration::from_millis(workload.work_ms + jitter),
                nested: workload.nested_every > 0 && n % workload.nested_every == 0,
                fail: workload.fail_every > 0 && n % workload.fail_every == 0,
            }
        })
        .collect()
}

/// Build the queue from `settings`, run the workload, and stop the queue
pub fn run(settings: &Settings) -> Result<RunReport> {
    let config = settings.queue.to_config();
    let keep_alive = config.keep_alive;

    let executor = Arc::new(ElasticThreadExecutor::new(config.name.clone()));
    let lease: Arc<dyn WorkerLeaseCoordinator> = match settings.lease.max_leases {
        Some(max_leases) => Arc::new(SemaphoreLeaseCoordinator::new(max_leases)),
        None => Arc::new(NoLeaseCoordinator),
    };
    let queue = Arc::new(
        ConditionalExecutionQueue::new(config, executor.clone(), Arc::clone(&lease))
            .context("Failed to create queue")?,
    );

    let plans = plan_items(&settings.workload, &mut rand::thread_rng());
    let peak_workers = Arc::new(AtomicUsize::new(0));

    info!(
        queue = %queue.name(),
        items = plans.len(),
        max_workers = queue.max_workers(),
        max_leases = ?settings.lease.max_leases,
        "Starting workload"
    );

    let started = Instant::now();
    let mut handles = Vec::with_capacity(plans.len());
    for plan in &plans {
        let item_queue = Arc::clone(&queue);
        let item_lease = Arc::clone(&lease);
        let peak = Arc::clone(&peak_workers);
        let plan = *plan;

        let handle = queue
            .submit_fn(move || run_item(&item_queue, item_lease.as_ref(), &peak, plan))
            .context("Failed to submit workload item")?;
        handles.push(handle);
    }

    let mut succeeded = 0;
    let mut failed = 0;
    for handle in handles {
        match handle.await_result() {
            Ok(Ok(())) => succeeded += 1,
            Ok(Err(e)) | Err(e) => {
                debug!(error = %e, "Workload item failed");
                failed += 1;
            }
        }
    }
    let elapsed = started.elapsed();

    queue.stop();
    let executor_terminated = executor.await_termination(keep_alive * 2);
    if !executor_terminated {
        warn!(live = executor.live_threads(), "Executor threads still alive after stop");
    }

    let report = RunReport {
        submitted: plans.len(),
        succeeded,
        failed,
        nested: plans.iter().filter(|p| p.nested).count(),
        peak_workers: peak_workers.load(Ordering::SeqCst),
        elapsed_ms: elapsed.as_millis() as u64,
        executor_terminated,
        final_stats: queue.stats(),
    };

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        elapsed_ms = report.elapsed_ms,
        "Workload finished"
    );
    Ok(report)
}

fn run_item(
    queue: &ConditionalExecutionQueue,
    lease: &dyn WorkerLeaseCoordinator,
    peak: &AtomicUsize,
    plan: ItemPlan,
) -> std::result::Result<(), QueueError> {
    peak.fetch_max(queue.stats().workers, Ordering::SeqCst);

    if plan.nested {
        // Make room for the child before blocking on it
        queue.expand()?;
        let child = queue.submit_fn(move || thread::sleep(plan.work))?;
        child.await_blocking(lease)?;
        peak.fetch_max(queue.stats().workers, Ordering::SeqCst);
    }

    thread::sleep(plan.work);

    if plan.fail {
        panic!("synthetic failure");
    }
    Ok(())
}
