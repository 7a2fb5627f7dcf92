use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use warpcore::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Shared Lock Example ===\n");

    // any number of independent locks can be created
    let section = new_lock();
    let found = new_mutex(Vec::new());

    let dispatcher = Dispatcher::with_max_parallel(8)?;
    let (lock, sink) = (section.clone(), found.clone());

    let start = Instant::now();
    let results = dispatcher.run_over_sequence(
        0..100u64,
        move |number| {
            let mut value = number;
            for _ in 0..100_000 {
                let mut hasher = DefaultHasher::new();
                value.hash(&mut hasher);
                value = hasher.finish();
            }

            let _guard = lock.lock();
            sink.lock().push((number, value));
        },
        &RunOptions::io_bound(),
    )?;

    let failed = results.iter().filter(|r| r.is_err()).count();
    println!("{} results found in {:?}", found.lock().len(), start.elapsed());
    println!("{} invocations failed", failed);

    let mut sorted = found.lock().clone();
    sorted.sort_unstable();
    println!("first: {:?}", sorted.first());

    println!("\n=== Example Complete ===");
    Ok(())
}
