//! The `run` command
//!
//! Builds a pool over simulated connections, lets a set of worker threads
//! hammer it with acquire / query / release loops, then drains and shuts it
//! down and reports what happened.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Args;
use cpool_core::{ConnectionPool, PoolStats};
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;

use crate::config::HarnessConfig;
use crate::simulated::SimulatedFactory;

/// Arguments for the run command
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Number of worker threads
    #[clap(long)]
    pub threads: Option<usize>,

    /// Queries issued by each worker
    #[clap(long)]
    pub iterations: Option<usize>,

    /// Number of pooled connections
    #[clap(long)]
    pub capacity: Option<usize>,

    /// Give up on an acquire after this many milliseconds
    #[clap(long)]
    pub acquire_timeout_ms: Option<u64>,

    /// Simulated query latency in milliseconds
    #[clap(long)]
    pub query_delay_ms: Option<u64>,

    /// Make the simulated server refuse the connection for this slot
    #[clap(long)]
    pub fail_at_slot: Option<usize>,

    /// Print the summary as JSON
    #[clap(long)]
    pub json: bool,
}

impl RunArgs {
    /// Overlay the command-line flags onto a loaded configuration.
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(threads) = self.threads {
            config.workload.threads = threads;
        }
        if let Some(iterations) = self.iterations {
            config.workload.iterations = iterations;
        }
        if let Some(capacity) = self.capacity {
            config.pool.capacity = capacity;
        }
        if let Some(timeout) = self.acquire_timeout_ms {
            config.pool.acquire_timeout_ms = Some(timeout);
        }
        if let Some(delay) = self.query_delay_ms {
            config.workload.query_delay_ms = delay;
        }
        if self.fail_at_slot.is_some() {
            config.workload.fail_at_slot = self.fail_at_slot;
        }
    }
}

/// What a single worker thread observed
#[derive(Debug, Default, Clone, Serialize)]
pub struct WorkerReport {
    /// Worker number, starting at 1
    pub worker: usize,

    /// Queries that ran
    pub queries: usize,

    /// Queries that found their row
    pub rows_found: usize,

    /// Acquires that failed
    pub failed_acquires: usize,
}

/// Outcome of a harness run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Identity of the pool that served the run
    pub pool_id: String,

    /// Pooled connections
    pub capacity: usize,

    /// Worker threads
    pub threads: usize,

    /// Queries attempted per worker
    pub iterations: usize,

    /// Queries that ran, across all workers
    pub queries: usize,

    /// Queries that found their row
    pub rows_found: usize,

    /// Acquires that failed, across all workers
    pub failed_acquires: usize,

    /// Connections opened by the factory
    pub connections_opened: usize,

    /// Connections closed by the factory
    pub connections_closed: usize,

    /// Wall-clock time of the run (milliseconds)
    pub elapsed_ms: u64,

    /// Pool counters at shutdown
    pub stats: PoolStats,

    /// Per-worker breakdown
    pub workers: Vec<WorkerReport>,
}

impl RunSummary {
    /// Human-readable rendering.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Pool {}\n", self.pool_id));
        out.push_str(&format!(
            "  workers: {} x {} iterations over {} connections\n",
            self.threads, self.iterations, self.capacity
        ));
        out.push_str(&format!(
            "  queries: {} ({} rows found)\n",
            self.queries, self.rows_found
        ));
        out.push_str(&format!("  failed acquires: {}\n", self.failed_acquires));
        out.push_str(&format!(
            "  waits: {} (longest {}us), timeouts: {}\n",
            self.stats.waits, self.stats.max_wait_us, self.stats.timeouts
        ));
        out.push_str(&format!(
            "  connections opened: {}, closed: {}\n",
            self.connections_opened, self.connections_closed
        ));
        out.push_str(&format!("  elapsed: {}ms\n", self.elapsed_ms));
        out
    }
}

/// Execute the run command
pub fn execute(args: &RunArgs, mut config: HarnessConfig) -> Result<RunSummary> {
    args.apply(&mut config);
    config.validate()?;

    let workload = config.workload.clone();
    let factory = SimulatedFactory::new(config.connection.clone(), workload.table_rows)
        .with_delay(Duration::from_millis(workload.query_delay_ms))
        .failing_at(workload.fail_at_slot);
    let counters = factory.counters();

    let pool = ConnectionPool::new(config.pool.clone(), factory)
        .context("Failed to initialize connection pool")?;
    info!(
        "Running {} workers x {} iterations against {} connections",
        workload.threads,
        workload.iterations,
        pool.capacity()
    );

    let started = Instant::now();
    let handles = (1..=workload.threads)
        .map(|worker| {
            let pool = pool.clone();
            let iterations = workload.iterations;
            let rows = workload.table_rows;
            thread::Builder::new()
                .name(format!("worker-{}", worker))
                .spawn(move || run_worker(&pool, worker, iterations, rows))
                .with_context(|| format!("Failed to spawn worker {}", worker))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut workers = Vec::with_capacity(handles.len());
    for handle in handles {
        let report = handle
            .join()
            .map_err(|_| anyhow!("a worker thread panicked"))?;
        workers.push(report);
    }

    pool.shutdown(true).context("Failed to shut down connection pool")?;
    let elapsed = started.elapsed();

    Ok(RunSummary {
        pool_id: pool.id().to_string(),
        capacity: pool.capacity(),
        threads: workload.threads,
        iterations: workload.iterations,
        queries: workers.iter().map(|w| w.queries).sum(),
        rows_found: workers.iter().map(|w| w.rows_found).sum(),
        failed_acquires: workers.iter().map(|w| w.failed_acquires).sum(),
        connections_opened: counters.opened(),
        connections_closed: counters.closed(),
        elapsed_ms: elapsed.as_millis() as u64,
        stats: pool.stats(),
        workers,
    })
}

fn run_worker(
    pool: &ConnectionPool<SimulatedFactory>,
    worker: usize,
    iterations: usize,
    rows: u64,
) -> WorkerReport {
    let mut report = WorkerReport {
        worker,
        ..WorkerReport::default()
    };
    let mut rng = rand::thread_rng();

    for iteration in 0..iterations {
        debug!("worker {}: loop {}", worker, iteration + 1);
        let id = query_id(&mut rng, rows);

        // A failed acquire skips this iteration; the loop carries on
        let conn = match pool.acquire() {
            Ok(conn) => conn,
            Err(e) => {
                warn!("worker {}: get connection failed: {}", worker, e);
                report.failed_acquires += 1;
                continue;
            }
        };

        match conn.with(|c| c.select_id(id)) {
            Ok(found) => {
                report.queries += 1;
                if found.is_some() {
                    report.rows_found += 1;
                } else {
                    debug!("worker {}: no row with id {}", worker, id);
                }
            }
            Err(e) => warn!("worker {}: query failed: {}", worker, e),
        }

        if let Err(e) = pool.release(conn) {
            warn!("worker {}: release failed: {}", worker, e);
        }
    }

    report
}

/// Pick a random row id in `1..=rows`.
fn query_id<R: Rng>(rng: &mut R, rows: u64) -> u64 {
    rng.gen_range(1..=rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.pool.capacity = 2;
        config.workload.threads = 4;
        config.workload.iterations = 25;
        config
    }

    #[test]
    fn test_run_completes_and_closes_everything() {
        let summary = execute(&RunArgs::default(), small_config()).unwrap();

        assert_eq!(summary.queries, 100);
        assert_eq!(summary.rows_found, 100);
        assert_eq!(summary.failed_acquires, 0);
        assert_eq!(summary.connections_opened, 2);
        assert_eq!(summary.connections_closed, 2);
        assert_eq!(summary.stats.checkouts, 100);
        assert_eq!(summary.stats.returns, 100);
        assert_eq!(summary.workers.len(), 4);
    }

    #[test]
    fn test_flags_override_config() {
        let args = RunArgs {
            threads: Some(1),
            iterations: Some(3),
            capacity: Some(1),
            ..RunArgs::default()
        };
        let summary = execute(&args, small_config()).unwrap();

        assert_eq!(summary.capacity, 1);
        assert_eq!(summary.queries, 3);
    }

    #[test]
    fn test_construction_failure_is_reported() {
        let args = RunArgs {
            fail_at_slot: Some(1),
            ..RunArgs::default()
        };
        let err = execute(&args, small_config()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to initialize connection pool"));
    }

    #[test]
    fn test_query_ids_stay_in_table() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let id = query_id(&mut rng, 2000);
            assert!((1..=2000).contains(&id));
        }
        assert_eq!(query_id(&mut rng, 1), 1);
    }

    #[test]
    fn test_seeded_query_ids_are_reproducible() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut first = StdRng::seed_from_u64(7);
        let mut second = StdRng::seed_from_u64(7);
        let a: Vec<u64> = (0..20).map(|_| query_id(&mut first, 2000)).collect();
        let b: Vec<u64> = (0..20).map(|_| query_id(&mut second, 2000)).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|id| (1..=2000).contains(id)));
    }

    #[test]
    fn test_text_summary_mentions_counts() {
        let summary = execute(&RunArgs::default(), small_config()).unwrap();
        let text = summary.to_text();
        assert!(text.contains("queries: 100"));
        assert!(text.contains("connections opened: 2, closed: 2"));
    }
}
