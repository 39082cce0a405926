//! Bounded worker pools, one per pipeline phase

use crate::error::Result;
use std::thread;
use tracing::debug;

const BASE_WORKERS: usize = 4;
const MAX_WORKERS: usize = 16;
const ITEMS_PER_EXTRA_WORKER: usize = 5;

/// Worker count for a phase processing `workload` items:
/// `min(4, cores) + workload / 5`, capped at 16
pub fn worker_budget(workload: usize) -> usize {
    let cores = thread::available_parallelism().map_or(1, |n| n.get());
    budget_for(cores, workload)
}

fn budget_for(cores: usize, workload: usize) -> usize {
    (BASE_WORKERS.min(cores) + workload / ITEMS_PER_EXTRA_WORKER).clamp(1, MAX_WORKERS)
}

/// Run `op` inside a dedicated pool sized for `workload`. The call returns
/// only after every task spawned by `op` has finished.
pub fn with_pool<T, F>(workload: usize, op: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    let workers = worker_budget(workload);
    debug!(workers, workload, "starting worker pool");
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("xlc-worker-{i}"))
        .build()?;
    Ok(pool.install(op))
}
