use crate::error::{Error, Result};

/// Upper bound accepted for any concurrency setting.
pub const MAX_PARALLEL_LIMIT: usize = 4096;

/// Default number of items per batch, per unit of concurrency.
pub const DEFAULT_CHUNK_FACTOR: usize = 32;

/// Which execution strategy runs the worker invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Shared-address-space threads for work dominated by waiting.
    #[default]
    IoBound,
    /// Work-stealing compute threads for work dominated by computation.
    CpuBound,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::IoBound => "io_bound",
            ExecutionMode::CpuBound => "cpu_bound",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Concurrency cap; defaults to the logical CPU count.
    pub max_parallel: Option<usize>,
    pub chunk_factor: usize,
    /// Threads in the I/O-bound pool; defaults to `max_parallel`.
    pub io_threads: Option<usize>,
    /// Threads in the CPU-bound pool; defaults to the logical CPU count.
    pub cpu_threads: Option<usize>,
    pub pin_workers: bool,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_parallel: None,
            chunk_factor: DEFAULT_CHUNK_FACTOR,
            io_threads: None,
            cpu_threads: None,
            pin_workers: false,
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "warpcore".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.max_parallel {
            validate_parallelism("max_parallel", n)?;
        }
        if let Some(n) = self.io_threads {
            validate_parallelism("io_threads", n)?;
        }
        if let Some(n) = self.cpu_threads {
            validate_parallelism("cpu_threads", n)?;
        }

        if self.chunk_factor == 0 {
            return Err(Error::config("chunk_factor must be > 0"));
        }

        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("thread_name_prefix must not be empty"));
        }

        Ok(())
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel.unwrap_or_else(num_cpus::get)
    }

    /// Number of items submitted before the dispatcher drains results.
    pub fn chunk_size(&self) -> usize {
        self.max_parallel().saturating_mul(self.chunk_factor)
    }

    pub fn io_threads(&self) -> usize {
        self.io_threads.unwrap_or_else(|| self.max_parallel())
    }

    pub fn cpu_threads(&self) -> usize {
        self.cpu_threads.unwrap_or_else(num_cpus::get)
    }
}

pub(crate) fn validate_parallelism(name: &str, n: usize) -> Result<()> {
    if n == 0 {
        return Err(Error::config(format!("{} must be > 0", name)));
    }
    if n > MAX_PARALLEL_LIMIT {
        return Err(Error::config(format!(
            "{} too large (max {})",
            name, MAX_PARALLEL_LIMIT
        )));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.config.max_parallel = Some(n);
        self
    }

    pub fn chunk_factor(mut self, factor: usize) -> Self {
        self.config.chunk_factor = factor;
        self
    }

    pub fn io_threads(mut self, n: usize) -> Self {
        self.config.io_threads = Some(n);
        self
    }

    pub fn cpu_threads(mut self, n: usize) -> Self {
        self.config.cpu_threads = Some(n);
        self
    }

    pub fn pin_workers(mut self, pin: bool) -> Self {
        self.config.pin_workers = pin;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_parallel(), num_cpus::get());
        assert_eq!(config.chunk_size(), num_cpus::get() * 32);
        assert_eq!(config.io_threads(), config.max_parallel());
        assert_eq!(config.cpu_threads(), num_cpus::get());
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::builder()
            .max_parallel(4)
            .chunk_factor(2)
            .cpu_threads(3)
            .thread_name_prefix("dispatch")
            .build()
            .unwrap();

        assert_eq!(config.max_parallel(), 4);
        assert_eq!(config.chunk_size(), 8);
        assert_eq!(config.io_threads(), 4);
        assert_eq!(config.cpu_threads(), 3);
        assert_eq!(config.thread_name_prefix, "dispatch");
    }

    #[test]
    fn test_rejects_zero_parallelism() {
        let err = Config::builder().max_parallel(0).build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(Config::builder().io_threads(0).build().is_err());
        assert!(Config::builder().cpu_threads(0).build().is_err());
        assert!(Config::builder().chunk_factor(0).build().is_err());
    }

    #[test]
    fn test_rejects_oversized_parallelism() {
        assert!(Config::builder()
            .max_parallel(MAX_PARALLEL_LIMIT + 1)
            .build()
            .is_err());
        assert!(Config::builder()
            .max_parallel(MAX_PARALLEL_LIMIT)
            .build()
            .is_ok());
    }

    #[test]
    fn test_rejects_empty_prefix() {
        assert!(Config::builder().thread_name_prefix("").build().is_err());
    }

    #[test]
    fn test_mode_default_and_display() {
        assert_eq!(ExecutionMode::default(), ExecutionMode::IoBound);
        assert_eq!(ExecutionMode::CpuBound.to_string(), "cpu_bound");
    }
}
