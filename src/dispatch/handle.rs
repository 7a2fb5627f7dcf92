//! One submitted invocation and the channel its result comes back on.

use crate::error::{ItemResult, Result, TaskError};
use crate::executor::{isolate, ExecutionPool, Task};
use crate::limiter::Throttled;
use crate::telemetry::Metrics;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handle to an invocation that may still be running.
///
/// Consumed by [`wait`](PendingHandle::wait); once harvested nothing of it
/// remains.
#[derive(Debug)]
pub(crate) struct PendingHandle<R, E> {
    rx: Receiver<ItemResult<R, E>>,
    cancelled: Arc<AtomicBool>,
}

impl<R, E> PendingHandle<R, E> {
    /// Block for the result, at most `timeout` if one is given.
    ///
    /// On timeout the invocation is flagged so that it is skipped if it has
    /// not started yet. One that is already running finishes on its own and
    /// its result is discarded.
    pub fn wait(self, timeout: Option<Duration>) -> ItemResult<R, E> {
        match timeout {
            None => self.rx.recv().unwrap_or(Err(TaskError::Dropped)),
            Some(limit) => match self.rx.recv_timeout(limit) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => {
                    self.cancelled.store(true, Ordering::Release);
                    Err(TaskError::TimedOut(limit))
                }
                Err(RecvTimeoutError::Disconnected) => Err(TaskError::Dropped),
            },
        }
    }
}

/// Queue one gated invocation of the worker on `pool`.
pub(crate) fn submit<A, R, E, F>(
    pool: &dyn ExecutionPool,
    gate: &Arc<Throttled<F>>,
    metrics: &Arc<Metrics>,
    index: usize,
    arg: A,
) -> Result<PendingHandle<R, E>>
where
    A: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(A) -> std::result::Result<R, E> + Send + Sync + 'static,
{
    let (tx, rx) = bounded(1);
    let cancelled = Arc::new(AtomicBool::new(false));

    let gate = gate.clone();
    let job_metrics = metrics.clone();
    let flag = cancelled.clone();

    pool.submit(Task::new(move || {
        let started = Instant::now();
        let outcome = isolate(|| gate.call_unless(arg, || flag.load(Ordering::Acquire)));
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(None) => {
                tracing::debug!(index, "skipping invocation abandoned by its waiter");
                job_metrics.record_skipped();
                return;
            }
            Ok(Some(Ok(value))) => {
                job_metrics.record_success(elapsed);
                Ok(value)
            }
            Ok(Some(Err(e))) => {
                job_metrics.record_failure(elapsed);
                Err(TaskError::Failed(e))
            }
            Err(panic) => {
                tracing::warn!(index, %panic, "worker panicked");
                job_metrics.record_panic(elapsed);
                Err(TaskError::Panicked(panic.message))
            }
        };

        // the waiter may have timed out and gone away
        let _ = tx.send(result);
    }))?;

    metrics.record_submitted();
    Ok(PendingHandle { rx, cancelled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::executor::IoPool;
    use crate::limiter::ConcurrencyLimiter;
    use std::convert::Infallible;
    use std::thread;

    fn fixtures(threads: usize, permits: usize) -> (IoPool, Arc<ConcurrencyLimiter>, Arc<Metrics>) {
        let config = Config::builder().io_threads(threads).build().unwrap();
        (
            IoPool::new(&config).unwrap(),
            Arc::new(ConcurrencyLimiter::new(permits).unwrap()),
            Arc::new(Metrics::new()),
        )
    }

    #[test]
    fn test_submit_and_wait() {
        let (pool, limiter, metrics) = fixtures(2, 2);
        let gate = Arc::new(Throttled::new(limiter, |x: i32| Ok::<_, Infallible>(x + 1)));

        let handle = submit(&pool, &gate, &metrics, 0, 41).unwrap();
        assert_eq!(handle.wait(None), Ok(42));
    }

    #[test]
    fn test_worker_error_is_captured() {
        let (pool, limiter, metrics) = fixtures(1, 1);
        let gate = Arc::new(Throttled::new(limiter, |x: i32| {
            if x == 0 {
                Err("zero")
            } else {
                Ok(10 / x)
            }
        }));

        let bad = submit(&pool, &gate, &metrics, 0, 0).unwrap();
        let good = submit(&pool, &gate, &metrics, 1, 5).unwrap();
        assert_eq!(bad.wait(None), Err(TaskError::Failed("zero")));
        assert_eq!(good.wait(None), Ok(2));
    }

    #[test]
    fn test_timeout_then_skip_queued() {
        // one thread, one permit: the second job queues behind the first
        let (pool, limiter, metrics) = fixtures(1, 1);
        let gate = Arc::new(Throttled::new(limiter, |ms: u64| {
            thread::sleep(Duration::from_millis(ms));
            Ok::<_, Infallible>(ms)
        }));

        let slow = submit(&pool, &gate, &metrics, 0, 100).unwrap();
        let queued = submit(&pool, &gate, &metrics, 1, 1).unwrap();

        let timed_out = queued.wait(Some(Duration::from_millis(10)));
        assert_eq!(timed_out, Err(TaskError::TimedOut(Duration::from_millis(10))));
        assert_eq!(slow.wait(None), Ok(100));

        pool.join();
        #[cfg(feature = "telemetry")]
        assert_eq!(metrics.snapshot().skipped, 1);
    }
}
