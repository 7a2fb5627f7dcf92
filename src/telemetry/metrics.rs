//! Metrics collection for dispatch runs.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-dispatcher counters plus a histogram of worker execution time.
#[derive(Debug)]
pub struct Metrics {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    timed_out: AtomicU64,
    skipped: AtomicU64,

    // None if the histogram could not be allocated; counters still work
    latency_histogram: Mutex<Option<Histogram<u64>>>,

    start_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        // 3 significant figures, max value of 1 hour in nanoseconds
        let histogram = Histogram::new_with_max(3_600_000_000_000, 3).ok();

        Self {
            submitted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            latency_histogram: Mutex::new(histogram),
            start_time: Mutex::new(Instant::now()),
        }
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    pub fn record_failure(&self, elapsed: Duration) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    pub fn record_panic(&self, elapsed: Duration) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// An invocation was cancelled before it started.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        if let Some(hist) = self.latency_histogram.lock().as_mut() {
            let _ = hist.record(nanos);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self.latency_histogram.lock();
        let (avg, p50, p99, max) = match histogram.as_ref() {
            Some(h) if h.len() > 0 => (
                h.mean() as u64,
                h.value_at_quantile(0.50),
                h.value_at_quantile(0.99),
                h.max(),
            ),
            _ => (0, 0, 0, 0),
        };

        MetricsSnapshot {
            uptime: self.start_time.lock().elapsed(),
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            avg_latency_ns: avg,
            p50_latency_ns: p50,
            p99_latency_ns: p99,
            max_latency_ns: max,
        }
    }

    pub fn reset(&self) {
        self.submitted.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.panicked.store(0, Ordering::Relaxed);
        self.timed_out.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);

        if let Some(hist) = self.latency_histogram.lock().as_mut() {
            hist.reset();
        }
        *self.start_time.lock() = Instant::now();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
    pub timed_out: u64,
    pub skipped: u64,
    pub avg_latency_ns: u64,
    pub p50_latency_ns: u64,
    pub p99_latency_ns: u64,
    pub max_latency_ns: u64,
}

impl MetricsSnapshot {
    /// Share of finished invocations that did not succeed (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        let bad = self.failed + self.panicked + self.timed_out;
        let total = self.succeeded + bad;
        if total == 0 {
            return 0.0;
        }
        bad as f64 / total as f64
    }
}
