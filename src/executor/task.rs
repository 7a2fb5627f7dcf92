//! Unit of work handed to an execution pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A boxed closure plus bookkeeping. Pools run it exactly once.
pub struct Task {
    pub(crate) id: TaskId,
    func: Box<dyn FnOnce() + Send + 'static>,
    submitted_at: Instant,
}

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            id: TaskId::next(),
            func: Box::new(f),
            submitted_at: Instant::now(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Time spent queued so far.
    pub fn queued_for(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    pub fn execute(self) {
        (self.func)();
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("submitted_at", &self.submitted_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_unique() {
        let a = Task::new(|| {});
        let b = Task::new(|| {});
        assert_ne!(a.id(), b.id());
        assert!(b.id().as_u64() > a.id().as_u64());
    }

    #[test]
    fn test_execute_runs_closure() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        Task::new(move || flag.store(true, Ordering::SeqCst)).execute();
        assert!(ran.load(Ordering::SeqCst));
    }
}
