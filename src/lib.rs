//! warpcore - bounded-concurrency task dispatch
//!
//! Runs a worker function over every item of a sequence, or every pair of a
//! key/value map, on a pool of threads while never letting more than
//! `max_parallel` invocations run at the same time. Results come back in
//! input order, one slot per item, each either a value or a typed failure.
//!
//! # Quick Start
//!
//! ```no_run
//! use warpcore::prelude::*;
//!
//! let dispatcher = Dispatcher::with_max_parallel(4).unwrap();
//!
//! let results = dispatcher
//!     .run_over_sequence(0..100, |x: u64| x + 10, &RunOptions::default())
//!     .unwrap();
//! assert_eq!(results.len(), 100);
//!
//! // compute-heavy work goes to the work-stealing pool
//! let squares = dispatcher
//!     .run_over_sequence(0..100, |x: u64| x * x, &RunOptions::cpu_bound())
//!     .unwrap();
//! assert_eq!(squares[9], Ok(81));
//! ```
//!
//! # Features
//!
//! - **Concurrency cap**: a counting gate wraps the worker, independent of pool size
//! - **Batching**: input is consumed lazily in fixed-size batches that act as barriers
//! - **Two strategies**: shared-queue threads for I/O-bound work, work stealing for CPU-bound work
//! - **Failure isolation**: errors, panics and timeouts stay in their own slot
//! - **Profiling**: sweep concurrency levels to find the fastest setting
//! - **Telemetry**: counters and latency histogram (optional)

#![warn(missing_debug_implementations)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod limiter;
pub mod prelude;
pub mod profile;
pub mod sync;
pub mod telemetry;

pub use config::{Config, ConfigBuilder, ExecutionMode};
pub use dispatch::{Dispatcher, RunOptions};
pub use error::{Error, ItemResult, Result, TaskError};
pub use limiter::{ConcurrencyLimiter, Permit, Throttled};
pub use profile::{profile_mapping, profile_sequence, ProfileOptions, ProfileReport, Trial};
pub use sync::{new_lock, new_mutex, Lock, SharedMutex};
