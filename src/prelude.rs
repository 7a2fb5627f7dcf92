pub use crate::config::{Config, ConfigBuilder, ExecutionMode};
pub use crate::dispatch::{Dispatcher, RunOptions};
pub use crate::error::{Error, ItemResult, Result, TaskError};
pub use crate::limiter::ConcurrencyLimiter;
pub use crate::profile::{ProfileOptions, ProfileReport};
pub use crate::sync::{new_lock, new_mutex, Lock, SharedMutex};

#[cfg(feature = "telemetry")]
pub use crate::telemetry::{Metrics, MetricsSnapshot};
