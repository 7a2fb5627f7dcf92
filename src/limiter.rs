//! Counting gate that caps how many worker invocations run at once.

use crate::config::validate_parallelism;
use crate::error::Result;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct State {
    available: usize,
    peak_in_use: usize,
}

/// A counting semaphore with a fixed number of permits.
///
/// Permits are handed out as [`Permit`] guards and returned when the guard
/// drops, so a permit is released exactly once on every exit path,
/// unwinding included.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    capacity: usize,
    state: Mutex<State>,
    freed: Condvar,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Result<Self> {
        validate_parallelism("limiter capacity", capacity)?;
        Ok(Self {
            capacity,
            state: Mutex::new(State {
                available: capacity,
                peak_in_use: 0,
            }),
            freed: Condvar::new(),
        })
    }

    /// A limiter sized to the host's logical CPU count.
    pub fn with_cpu_count() -> Result<Self> {
        Self::new(num_cpus::get())
    }

    /// Block until a permit is free and take it.
    pub fn acquire(&self) -> Permit<'_> {
        let mut state = self.state.lock();
        while state.available == 0 {
            self.freed.wait(&mut state);
        }
        self.take(&mut state);
        Permit { limiter: self }
    }

    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.state.lock();
        if state.available == 0 {
            return None;
        }
        self.take(&mut state);
        Some(Permit { limiter: self })
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Permit<'_>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.available == 0 {
            if self.freed.wait_until(&mut state, deadline).timed_out() && state.available == 0 {
                return None;
            }
        }
        self.take(&mut state);
        Some(Permit { limiter: self })
    }

    fn take(&self, state: &mut State) {
        state.available -= 1;
        let in_use = self.capacity - state.available;
        if in_use > state.peak_in_use {
            state.peak_in_use = in_use;
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.available < self.capacity, "permit released twice");
        state.available += 1;
        drop(state);
        self.freed.notify_one();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Highest number of permits ever held at the same time.
    pub fn peak_in_use(&self) -> usize {
        self.state.lock().peak_in_use
    }
}

/// A held permit; released on drop.
#[derive(Debug)]
#[must_use = "the permit is released as soon as it is dropped"]
pub struct Permit<'a> {
    limiter: &'a ConcurrencyLimiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

/// A callable wrapped with a limiter: every call holds one permit for the
/// duration of the inner call.
pub struct Throttled<F> {
    limiter: Arc<ConcurrencyLimiter>,
    inner: F,
}

impl<F> Throttled<F> {
    pub fn new(limiter: Arc<ConcurrencyLimiter>, inner: F) -> Self {
        Self { limiter, inner }
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    pub fn into_inner(self) -> F {
        self.inner
    }

    pub fn call<A, R>(&self, arg: A) -> R
    where
        F: Fn(A) -> R,
    {
        let _permit = self.limiter.acquire();
        (self.inner)(arg)
    }

    /// Runs the inner call unless `cancelled` reports true either before
    /// or right after the permit is obtained.
    pub(crate) fn call_unless<A, R>(&self, arg: A, cancelled: impl Fn() -> bool) -> Option<R>
    where
        F: Fn(A) -> R,
    {
        if cancelled() {
            return None;
        }
        let _permit = self.limiter.acquire();
        if cancelled() {
            return None;
        }
        Some((self.inner)(arg))
    }
}

impl<F> std::fmt::Debug for Throttled<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttled")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_acquire_release() {
        let limiter = ConcurrencyLimiter::new(2).unwrap();

        let a = limiter.acquire();
        let b = limiter.acquire();
        assert_eq!(limiter.available(), 0);
        assert!(limiter.try_acquire().is_none());

        drop(a);
        assert_eq!(limiter.available(), 1);
        let c = limiter.try_acquire();
        assert!(c.is_some());

        drop(b);
        drop(c);
        assert_eq!(limiter.available(), 2);
        assert_eq!(limiter.peak_in_use(), 2);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(ConcurrencyLimiter::new(0).is_err());
    }

    #[test]
    fn test_acquire_timeout() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        let _held = limiter.acquire();

        let start = Instant::now();
        assert!(limiter.acquire_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_released_on_panic() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1).unwrap());
        let gated = Throttled::new(limiter.clone(), |x: i32| {
            if x < 0 {
                panic!("negative");
            }
            x
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| gated.call(-1)));
        assert!(result.is_err());
        assert_eq!(limiter.available(), 1);
        assert_eq!(gated.call(5), 5);
    }

    #[test]
    fn test_caps_concurrent_holders() {
        let limiter = Arc::new(ConcurrencyLimiter::new(3).unwrap());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let limiter = limiter.clone();
                let running = running.clone();
                let peak = peak.clone();
                thread::spawn(move || {
                    let _permit = limiter.acquire();
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(limiter.peak_in_use() <= 3);
        assert_eq!(limiter.available(), 3);
    }

    #[test]
    fn test_call_unless_skips_cancelled() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1).unwrap());
        let gated = Throttled::new(limiter.clone(), |x: u32| x * 2);

        assert_eq!(gated.call_unless(4, || false), Some(8));
        assert_eq!(gated.call_unless(4, || true), None);
        assert_eq!(limiter.available(), 1);
    }
}
