//! Execution pools.
//!
//! Two strategies sit behind [`ExecutionPool`]: [`IoPool`] for work that
//! mostly waits and [`CpuPool`] for work that mostly computes. The
//! dispatcher only ever talks to the trait.

pub mod cpu_pool;
pub mod io_pool;
pub mod panic_handler;
pub mod task;
pub mod worker;

pub use cpu_pool::CpuPool;
pub use io_pool::IoPool;
pub use panic_handler::{isolate, PanicInfo};
pub use task::{Task, TaskId};

use crate::config::{Config, ExecutionMode};
use crate::error::Result;
use std::sync::Arc;

/// Submit-and-forget capability shared by both strategies.
///
/// Results travel back through whatever channel the task closes over.
pub trait ExecutionPool: Send + Sync + std::fmt::Debug {
    fn submit(&self, task: Task) -> Result<()>;

    fn num_threads(&self) -> usize;

    fn mode(&self) -> ExecutionMode;

    /// Stop accepting work without waiting. Queued tasks still run and the
    /// threads exit once the queue is empty; a thread stuck in a task is
    /// left detached.
    fn close(&self);

    /// Close, then block until every thread has exited.
    fn join(&self);
}

/// Build the pool for `mode`.
pub fn build_pool(mode: ExecutionMode, config: &Config) -> Result<Arc<dyn ExecutionPool>> {
    Ok(match mode {
        ExecutionMode::IoBound => Arc::new(IoPool::new(config)?),
        ExecutionMode::CpuBound => Arc::new(CpuPool::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_build_pool_matches_mode() {
        let config = Config::builder()
            .max_parallel(3)
            .cpu_threads(2)
            .build()
            .unwrap();

        let io = build_pool(ExecutionMode::IoBound, &config).unwrap();
        assert_eq!(io.mode(), ExecutionMode::IoBound);
        assert_eq!(io.num_threads(), 3);

        let cpu = build_pool(ExecutionMode::CpuBound, &config).unwrap();
        assert_eq!(cpu.mode(), ExecutionMode::CpuBound);
        assert_eq!(cpu.num_threads(), 2);
    }

    #[test]
    fn test_close_does_not_wait_for_running_tasks() {
        let config = Config::builder()
            .io_threads(1)
            .cpu_threads(1)
            .build()
            .unwrap();

        for mode in [ExecutionMode::IoBound, ExecutionMode::CpuBound] {
            let pool = build_pool(mode, &config).unwrap();
            let (started_tx, started_rx) = crossbeam_channel::bounded(1);
            pool.submit(Task::new(move || {
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(800));
            }))
            .unwrap();
            started_rx.recv().unwrap();

            let start = Instant::now();
            drop(pool);
            assert!(
                start.elapsed() < Duration::from_millis(300),
                "{} pool blocked on drop for {:?}",
                mode,
                start.elapsed()
            );
        }
    }
}
