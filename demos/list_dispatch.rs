use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use warpcore::prelude::*;

fn digest(number: u64) -> u64 {
    let mut value = number;
    for _ in 0..200_000 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        value = hasher.finish();
    }
    value
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== List Dispatch Example ===\n");
    let tasks: Vec<u64> = (0..100).collect();

    let start = Instant::now();
    let serial: Vec<u64> = tasks.iter().copied().map(digest).collect();
    let slow = start.elapsed();

    let dispatcher = Dispatcher::with_defaults()?;
    let start = Instant::now();
    let results = dispatcher.run_over_sequence(tasks, digest, &RunOptions::cpu_bound())?;
    let fast = start.elapsed();

    let parallel: Vec<u64> = results.into_iter().filter_map(|r| r.ok()).collect();
    assert_eq!(serial, parallel);

    for (number, value) in parallel.iter().enumerate().take(5) {
        println!("Task {:>3}  {:016x}", number, value);
    }

    let gain = (slow.as_secs_f64() - fast.as_secs_f64()) / slow.as_secs_f64() * 100.0;
    println!("\nserial: {:?}  dispatched: {:?}", slow, fast);
    println!(
        "{:.1}% faster with max_parallel: {}",
        gain,
        dispatcher.max_parallel()
    );

    println!("\n=== Example Complete ===");
    Ok(())
}
