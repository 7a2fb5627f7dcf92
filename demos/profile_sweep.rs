use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing_subscriber::EnvFilter;
use warpcore::prelude::*;

fn digest(number: u32) -> u64 {
    let mut value = number as u64;
    for _ in 0..50_000 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        value = hasher.finish();
    }
    value
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Profile Sweep Example ===\n");

    // keep the sample small: every level runs the whole workload
    let sample: Vec<u32> = (0..48).collect();

    let dispatcher = Dispatcher::with_max_parallel(2)?;
    let report = dispatcher.profile_sequence(sample, digest, &ProfileOptions::default())?;

    for trial in &report.trials {
        println!(
            "{:<10} max_parallel {:>2}  {:>8.2?}  {:>6.1}%",
            trial.mode.as_str(),
            trial.max_parallel,
            trial.elapsed,
            trial.gain_percent
        );
    }

    println!("\n{}", report.summary());
    println!("{}", report.to_json()?);

    println!("\n=== Example Complete ===");
    Ok(())
}
