//! Dispatch counters and worker latency.
//!
//! Real collection needs the `telemetry` feature; without it the same API
//! is available but records nothing.

#[cfg(feature = "telemetry")]
pub mod metrics;

#[cfg(feature = "telemetry")]
pub use metrics::{Metrics, MetricsSnapshot};

#[cfg(not(feature = "telemetry"))]
pub mod metrics {
    use std::time::Duration;

    #[derive(Debug, Default)]
    pub struct Metrics;

    impl Metrics {
        pub fn new() -> Self {
            Self
        }
        pub fn record_submitted(&self) {}
        pub fn record_success(&self, _: Duration) {}
        pub fn record_failure(&self, _: Duration) {}
        pub fn record_panic(&self, _: Duration) {}
        pub fn record_timeout(&self) {}
        pub fn record_skipped(&self) {}
        pub fn snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot::default()
        }
        pub fn reset(&self) {}
    }

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
        pub fn failure_rate(&self) -> f64 {
            0.0
        }
    }
}

#[cfg(not(feature = "telemetry"))]
pub use metrics::{Metrics, MetricsSnapshot};
