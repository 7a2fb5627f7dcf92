//! Locks for state that worker code shares between invocations.
//!
//! The dispatcher never locks anything on the worker's behalf. When workers
//! write to a common accumulator they guard it with one of these.

use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};
use std::sync::Arc;

/// Cloneable handle to a value behind a mutex.
///
/// Every clone refers to the same value. The guard returned by
/// [`lock`](SharedMutex::lock) releases on drop, also while unwinding.
#[derive(Debug, Default)]
pub struct SharedMutex<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> SharedMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Run `f` with the lock held.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Take the value out if this is the last handle.
    pub fn try_unwrap(self) -> Result<T, Self> {
        Arc::try_unwrap(self.inner)
            .map(|mutex| mutex.into_inner())
            .map_err(|inner| Self { inner })
    }
}

impl<T> Clone for SharedMutex<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// A value-less lock for guarding a critical section.
///
/// Re-entrant: a thread already holding it may lock it again without
/// deadlocking itself.
#[derive(Debug, Clone, Default)]
pub struct Lock {
    inner: Arc<ReentrantMutex<()>>,
}

impl Lock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> LockGuard<'_> {
        LockGuard {
            _guard: self.inner.lock(),
        }
    }

    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        self.inner.try_lock().map(|guard| LockGuard { _guard: guard })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

/// Held section of a [`Lock`]; released on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
}

/// Wrap `value` in a new [`SharedMutex`].
pub fn new_mutex<T>(value: T) -> SharedMutex<T> {
    SharedMutex::new(value)
}

/// Create an independent [`Lock`]. There is no limit on how many exist.
pub fn new_lock() -> Lock {
    Lock::new()
}
