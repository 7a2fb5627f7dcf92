use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use warpcore::prelude::*;

#[test]
#[ignore]
fn stress_large_sequence() {
    let d = Dispatcher::with_max_parallel(16).unwrap();
    let n = 200_000u64;

    for options in [RunOptions::io_bound(), RunOptions::cpu_bound()] {
        let results = d.run_over_sequence(0..n, |x| x ^ 0x5a5a, &options).unwrap();
        assert_eq!(results.len(), n as usize);
        assert!(results
            .iter()
            .enumerate()
            .all(|(i, r)| *r == Ok(i as u64 ^ 0x5a5a)));
    }
}

#[test]
#[ignore]
fn stress_many_dispatchers_in_parallel() {
    let handles: Vec<_> = (1..=8usize)
        .map(|cap| {
            thread::spawn(move || {
                let d = Dispatcher::with_max_parallel(cap).unwrap();
                let running = Arc::new(AtomicUsize::new(0));
                let peak = Arc::new(AtomicUsize::new(0));
                let (r, p) = (running.clone(), peak.clone());

                let results = d
                    .run_over_sequence(
                        0..2_000u32,
                        move |x| {
                            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                            p.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_micros(50));
                            r.fetch_sub(1, Ordering::SeqCst);
                            x
                        },
                        &RunOptions::default(),
                    )
                    .unwrap();

                assert_eq!(results.len(), 2_000);
                assert!(peak.load(Ordering::SeqCst) <= cap);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
#[ignore]
fn stress_repeated_cap_changes() {
    let mut d = Dispatcher::with_max_parallel(1).unwrap();
    for cap in (1..=64).chain((1..=64).rev()) {
        d.set_max_parallel(cap).unwrap();
        let mode = if cap % 2 == 0 {
            ExecutionMode::CpuBound
        } else {
            ExecutionMode::IoBound
        };
        let results = d
            .run_over_sequence(0..(cap * 10), |x| x + 1, &RunOptions::default().mode(mode))
            .unwrap();
        assert_eq!(results.len(), cap * 10);
        assert_eq!(d.limiter().available(), cap);
    }
}
