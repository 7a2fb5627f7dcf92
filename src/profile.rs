//! Brute-force search for the concurrency cap that runs a workload fastest.
//!
//! For every requested [`ExecutionMode`] the workload is run once per cap
//! from 1 up to `max_level`. The cap-1 run is that mode's serial baseline;
//! every other run is scored by its wall-clock gain over it. This is a
//! diagnostic: it runs the workload many times, so feed it a small sample.

use crate::config::{Config, ExecutionMode, MAX_PARALLEL_LIMIT};
use crate::dispatch::{Dispatcher, RunOptions};
use crate::error::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileOptions {
    /// Highest cap tried; defaults to four times the configured cap.
    pub max_level: Option<usize>,
    /// Modes to sweep, in order.
    pub modes: Vec<ExecutionMode>,
    pub timeout: Option<Duration>,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            max_level: None,
            modes: vec![ExecutionMode::CpuBound, ExecutionMode::IoBound],
            timeout: None,
        }
    }
}

impl ProfileOptions {
    pub fn max_level(mut self, level: usize) -> Self {
        self.max_level = Some(level);
        self
    }

    pub fn modes<I: IntoIterator<Item = ExecutionMode>>(mut self, modes: I) -> Self {
        self.modes = modes.into_iter().collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn resolve_max_level(&self, config: &Config) -> Result<usize> {
        let level = self
            .max_level
            .unwrap_or_else(|| config.max_parallel().saturating_mul(4))
            .min(MAX_PARALLEL_LIMIT);
        if level == 0 {
            return Err(Error::config("max_level must be > 0"));
        }
        Ok(level)
    }
}

/// One timed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trial {
    pub mode: ExecutionMode,
    pub max_parallel: usize,
    pub elapsed: Duration,
    /// Speed-up over the same mode's cap-1 run, in percent, one decimal.
    pub gain_percent: f64,
    /// Items whose slot held a failure.
    pub failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileReport {
    pub trials: Vec<Trial>,
    /// Fastest non-serial trial that did not lose to its baseline.
    pub best: Option<Trial>,
}

impl ProfileReport {
    pub fn baseline(&self, mode: ExecutionMode) -> Option<Duration> {
        self.trials
            .iter()
            .find(|t| t.mode == mode && t.max_parallel == 1)
            .map(|t| t.elapsed)
    }

    pub fn trials_for(&self, mode: ExecutionMode) -> impl Iterator<Item = &Trial> + '_ {
        self.trials.iter().filter(move |t| t.mode == mode)
    }

    pub fn summary(&self) -> String {
        match &self.best {
            Some(best) => format!(
                "best performance ({}% gain) using {} with max_parallel: {}",
                best.gain_percent, best.mode, best.max_parallel
            ),
            None => "no concurrency level beat the serial baseline".to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&SerializableReport::from(self))
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {}", e)))
    }

    pub fn write_json(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SerializableTrial {
    mode: ExecutionMode,
    max_parallel: usize,
    elapsed_ms: f64,
    gain_percent: f64,
    failures: usize,
}

#[derive(Debug, Serialize)]
struct SerializableReport {
    trials: Vec<SerializableTrial>,
    best: Option<SerializableTrial>,
    summary: String,
}

impl From<&Trial> for SerializableTrial {
    fn from(trial: &Trial) -> Self {
        Self {
            mode: trial.mode,
            max_parallel: trial.max_parallel,
            elapsed_ms: trial.elapsed.as_secs_f64() * 1_000.0,
            gain_percent: trial.gain_percent,
            failures: trial.failures,
        }
    }
}

impl From<&ProfileReport> for SerializableReport {
    fn from(report: &ProfileReport) -> Self {
        Self {
            trials: report.trials.iter().map(SerializableTrial::from).collect(),
            best: report.best.as_ref().map(SerializableTrial::from),
            summary: report.summary(),
        }
    }
}

pub(crate) fn gain_percent(baseline: Duration, elapsed: Duration) -> f64 {
    let base = baseline.as_secs_f64();
    if base == 0.0 {
        return 0.0;
    }
    let gain = (base - elapsed.as_secs_f64()) / base * 100.0;
    (gain * 10.0).round() / 10.0
}

/// Profile a unary worker. `items` is cloned for every trial.
pub fn profile_sequence<I, T, R, F>(
    config: &Config,
    items: I,
    worker: F,
    options: &ProfileOptions,
) -> Result<ProfileReport>
where
    I: IntoIterator<Item = T> + Clone,
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let worker = Arc::new(worker);
    sweep(config, options, |dispatcher, run| {
        let inputs = items.clone();
        let w = worker.clone();
        let started = Instant::now();
        let results = dispatcher.run_over_sequence(inputs, move |item: T| w(item), run)?;
        Ok((started.elapsed(), results.iter().filter(|r| r.is_err()).count()))
    })
}

/// Profile a key/value worker. `map` is cloned for every trial.
pub fn profile_mapping<M, K, V, R, F>(
    config: &Config,
    map: M,
    worker: F,
    options: &ProfileOptions,
) -> Result<ProfileReport>
where
    M: IntoIterator<Item = (K, V)> + Clone,
    K: Send + 'static,
    V: Send + 'static,
    R: Send + 'static,
    F: Fn(K, V) -> R + Send + Sync + 'static,
{
    let worker = Arc::new(worker);
    sweep(config, options, |dispatcher, run| {
        let inputs = map.clone();
        let w = worker.clone();
        let started = Instant::now();
        let results = dispatcher.run_over_mapping(inputs, move |k: K, v: V| w(k, v), run)?;
        Ok((started.elapsed(), results.iter().filter(|r| r.is_err()).count()))
    })
}

fn sweep<G>(config: &Config, options: &ProfileOptions, mut trial: G) -> Result<ProfileReport>
where
    G: FnMut(&Dispatcher, &RunOptions) -> Result<(Duration, usize)>,
{
    if options.modes.is_empty() {
        return Err(Error::profile("no execution modes to profile"));
    }
    let max_level = options.resolve_max_level(config)?;

    // scratch dispatcher so the caller's limiter and pools stay untouched
    let mut scratch_config = config.clone();
    if let Some(threads) = scratch_config.io_threads {
        // a smaller io pool would flatten every level above it
        scratch_config.io_threads = Some(threads.max(max_level).max(config.max_parallel()));
    }
    let mut scratch = Dispatcher::new(scratch_config)?;
    let mut report = ProfileReport::default();

    for &mode in &options.modes {
        let run = RunOptions {
            timeout: options.timeout,
            mode,
        };
        let mut baseline = None;

        for level in 1..=max_level {
            scratch.set_max_parallel(level)?;
            scratch.warm_up(mode)?;

            let (elapsed, failures) = trial(&scratch, &run)?;
            let base = *baseline.get_or_insert(elapsed);
            let gain = gain_percent(base, elapsed);

            if failures > 0 {
                tracing::warn!(%mode, level, failures, "profiling run had failed items");
            }

            let result = Trial {
                mode,
                max_parallel: level,
                elapsed,
                gain_percent: gain,
                failures,
            };

            if level == 1 {
                tracing::info!(%mode, elapsed_ms = elapsed.as_millis() as u64, "baseline");
            } else {
                tracing::info!(%mode, "{}% performance gain with max_parallel: {}", gain, level);

                let beats_record = match &report.best {
                    Some(best) => gain >= best.gain_percent,
                    None => gain >= 0.0,
                };
                if beats_record {
                    report.best = Some(result);
                }
            }

            report.trials.push(result);
        }
    }

    tracing::info!("{}", report.summary());
    Ok(report)
}

impl Dispatcher {
    /// Profile `worker` over `items` using this dispatcher's configuration.
    ///
    /// Runs on a separate dispatcher; this one is left as it was.
    pub fn profile_sequence<I, T, R, F>(
        &self,
        items: I,
        worker: F,
        options: &ProfileOptions,
    ) -> Result<ProfileReport>
    where
        I: IntoIterator<Item = T> + Clone,
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        profile_sequence(self.config(), items, worker, options)
    }

    pub fn profile_mapping<M, K, V, R, F>(
        &self,
        map: M,
        worker: F,
        options: &ProfileOptions,
    ) -> Result<ProfileReport>
    where
        M: IntoIterator<Item = (K, V)> + Clone,
        K: Send + 'static,
        V: Send + 'static,
        R: Send + 'static,
        F: Fn(K, V) -> R + Send + Sync + 'static,
    {
        profile_mapping(self.config(), map, worker, options)
    }
}
