//! The dispatcher: gated, batched submission of work items.
//!
//! Items are pulled from the input one at a time and submitted as they
//! are read. After `chunk_size` submissions the dispatcher stops reading
//! and collects every result of that batch, in submission order, before it
//! touches the next item. Batches are a hard barrier, not a sliding window.
//!
//! ```no_run
//! use warpcore::prelude::*;
//!
//! let dispatcher = Dispatcher::with_max_parallel(4).unwrap();
//! let results = dispatcher
//!     .run_over_sequence(0..100, |x: i32| x + 10, &RunOptions::default())
//!     .unwrap();
//! assert_eq!(results[0], Ok(10));
//! ```

mod handle;

use crate::config::{validate_parallelism, Config, ExecutionMode};
use crate::error::{ItemResult, Result};
use crate::executor::{build_pool, ExecutionPool};
use crate::limiter::{ConcurrencyLimiter, Throttled};
use crate::telemetry::{Metrics, MetricsSnapshot};
use handle::PendingHandle;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

/// Per-call settings for a dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// How long to wait for each item's result. `None` waits forever.
    pub timeout: Option<Duration>,
    pub mode: ExecutionMode,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn io_bound() -> Self {
        Self::default().mode(ExecutionMode::IoBound)
    }

    pub fn cpu_bound() -> Self {
        Self::default().mode(ExecutionMode::CpuBound)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Runs a worker over every item of a collection with at most
/// `max_parallel` invocations in flight.
///
/// Pools are started lazily, one per [`ExecutionMode`], and reused by
/// later runs on the same dispatcher. Dropping the dispatcher closes them
/// without waiting, so a worker abandoned by a timeout never blocks it;
/// call [`shutdown`](Dispatcher::shutdown) to wait for every thread.
#[derive(Debug)]
pub struct Dispatcher {
    config: Config,
    limiter: Arc<ConcurrencyLimiter>,
    io_pool: Mutex<Option<Arc<dyn ExecutionPool>>>,
    cpu_pool: Mutex<Option<Arc<dyn ExecutionPool>>>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let limiter = Arc::new(ConcurrencyLimiter::new(config.max_parallel())?);
        warn_if_io_pool_undersized(&config);

        Ok(Self {
            config,
            limiter,
            io_pool: Mutex::new(None),
            cpu_pool: Mutex::new(None),
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn with_max_parallel(max_parallel: usize) -> Result<Self> {
        Self::new(Config::builder().max_parallel(max_parallel).build()?)
    }

    /// A dispatcher capped at the logical CPU count.
    pub fn with_defaults() -> Result<Self> {
        Self::new(Config::default())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn max_parallel(&self) -> usize {
        self.limiter.capacity()
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size()
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    /// Swap in a fresh limiter of capacity `max_parallel`.
    ///
    /// The old limiter is replaced, not resized. Cached pools are closed,
    /// not joined, so they come back sized for the new cap; invocations
    /// still running on them finish detached.
    pub fn set_max_parallel(&mut self, max_parallel: usize) -> Result<()> {
        validate_parallelism("max_parallel", max_parallel)?;

        self.config.max_parallel = Some(max_parallel);
        self.limiter = Arc::new(ConcurrencyLimiter::new(max_parallel)?);
        self.release_pools();
        warn_if_io_pool_undersized(&self.config);

        tracing::debug!(max_parallel, chunk_size = self.chunk_size(), "limiter replaced");
        Ok(())
    }

    /// Wrap `f` so every call holds one of this dispatcher's permits.
    pub fn throttle<F>(&self, f: F) -> Throttled<F> {
        Throttled::new(self.limiter.clone(), f)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Start the pool for `mode` now rather than on the first run.
    pub fn warm_up(&self, mode: ExecutionMode) -> Result<()> {
        self.pool(mode).map(|_| ())
    }

    /// Stop the cached pools and wait for all their threads, including any
    /// still running a timed-out invocation. The next run starts new ones.
    pub fn shutdown(&mut self) {
        for pool in self.take_pools() {
            pool.join();
        }
    }

    fn release_pools(&mut self) {
        for pool in self.take_pools() {
            pool.close();
        }
    }

    fn take_pools(&mut self) -> impl Iterator<Item = Arc<dyn ExecutionPool>> {
        let io = self.io_pool.get_mut().take();
        let cpu = self.cpu_pool.get_mut().take();
        io.into_iter().chain(cpu)
    }

    /// Run `worker` over every item; one result slot per item, in input
    /// order.
    pub fn run_over_sequence<I, T, R, F>(
        &self,
        items: I,
        worker: F,
        options: &RunOptions,
    ) -> Result<Vec<ItemResult<R>>>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        self.dispatch(
            items.into_iter(),
            move |item: T| Ok::<R, Infallible>(worker(item)),
            options,
        )
    }

    /// Like [`run_over_sequence`](Self::run_over_sequence) for workers that
    /// report failure through `Err`.
    pub fn try_run_over_sequence<I, T, R, E, F>(
        &self,
        items: I,
        worker: F,
        options: &RunOptions,
    ) -> Result<Vec<ItemResult<R, E>>>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        self.dispatch(items.into_iter(), worker, options)
    }

    /// Run `worker(key, value)` over every pair of `map`, in its iteration
    /// order.
    pub fn run_over_mapping<M, K, V, R, F>(
        &self,
        map: M,
        worker: F,
        options: &RunOptions,
    ) -> Result<Vec<ItemResult<R>>>
    where
        M: IntoIterator<Item = (K, V)>,
        K: Send + 'static,
        V: Send + 'static,
        R: Send + 'static,
        F: Fn(K, V) -> R + Send + Sync + 'static,
    {
        self.dispatch(
            map.into_iter(),
            move |(key, value): (K, V)| Ok::<R, Infallible>(worker(key, value)),
            options,
        )
    }

    pub fn try_run_over_mapping<M, K, V, R, E, F>(
        &self,
        map: M,
        worker: F,
        options: &RunOptions,
    ) -> Result<Vec<ItemResult<R, E>>>
    where
        M: IntoIterator<Item = (K, V)>,
        K: Send + 'static,
        V: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(K, V) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        self.dispatch(
            map.into_iter(),
            move |(key, value): (K, V)| worker(key, value),
            options,
        )
    }

    fn pool(&self, mode: ExecutionMode) -> Result<Arc<dyn ExecutionPool>> {
        let slot = match mode {
            ExecutionMode::IoBound => &self.io_pool,
            ExecutionMode::CpuBound => &self.cpu_pool,
        };

        let mut slot = slot.lock();
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        let pool = build_pool(mode, &self.config)?;
        *slot = Some(pool.clone());
        Ok(pool)
    }

    fn dispatch<A, R, E, F>(
        &self,
        mut inputs: impl Iterator<Item = A>,
        worker: F,
        options: &RunOptions,
    ) -> Result<Vec<ItemResult<R, E>>>
    where
        A: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(A) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        let span = tracing::debug_span!("dispatch", mode = %options.mode);
        let _enter = span.enter();

        let pool = self.pool(options.mode)?;
        let gate = Arc::new(self.throttle(worker));
        let chunk_size = self.chunk_size();

        let (lower, _) = inputs.size_hint();
        let mut results = Vec::with_capacity(lower);
        let mut pending: Vec<PendingHandle<R, E>> = Vec::with_capacity(chunk_size.min(lower.max(1)));
        let mut batch = 0usize;

        loop {
            for item in inputs.by_ref().take(chunk_size) {
                let index = results.len() + pending.len();
                pending.push(handle::submit(&*pool, &gate, &self.metrics, index, item)?);
            }

            if pending.is_empty() {
                break;
            }

            let submitted = pending.len();
            tracing::debug!(batch, items = submitted, "batch submitted");

            for handle in pending.drain(..) {
                let result = handle.wait(options.timeout);
                if let Err(e) = &result {
                    if e.is_timeout() {
                        tracing::warn!(index = results.len(), timeout = ?options.timeout, "item timed out");
                        self.metrics.record_timeout();
                    }
                }
                results.push(result);
            }

            tracing::debug!(batch, collected = results.len(), "batch drained");
            batch += 1;

            if submitted < chunk_size {
                break;
            }
        }

        Ok(results)
    }
}

fn warn_if_io_pool_undersized(config: &Config) {
    let (threads, cap) = (config.io_threads(), config.max_parallel());
    if threads < cap {
        tracing::warn!(
            io_threads = threads,
            max_parallel = cap,
            "io pool has fewer threads than the concurrency cap; io_bound runs will not reach it"
        );
    }
}
