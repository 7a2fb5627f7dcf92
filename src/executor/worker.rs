// compute worker loop
use super::panic_handler::isolate;
use super::task::Task;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as WorkerQueue};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub type WorkerId = usize;

const MAX_SPINS: u32 = 10;
const MAX_YIELDS: u32 = 20;
const MIN_PARK: Duration = Duration::from_micros(100);
const MAX_PARK: Duration = Duration::from_millis(10);

/// Park interval after `idle_rounds` empty polls: doubles from `MIN_PARK`
/// up to `MAX_PARK`. Submission and close unpark explicitly, so the
/// timeout only bounds how long a missed wake-up can go unnoticed.
fn park_duration(idle_rounds: u32) -> Duration {
    let doublings = idle_rounds.saturating_sub(MAX_YIELDS + 1).min(7);
    (MIN_PARK * (1u32 << doublings)).min(MAX_PARK)
}

// per-worker counters
#[derive(Debug, Default)]
pub struct WorkerState {
    pub tasks_executed: AtomicU64,
    pub tasks_stolen: AtomicU64,
}

pub(crate) struct Worker {
    pub id: WorkerId,
    pub local_queue: WorkerQueue<Task>,
    pub state: Arc<WorkerState>,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            local_queue: WorkerQueue::new_fifo(),
            state: Arc::new(WorkerState::default()),
        }
    }

    pub fn run(&self, stealers: Vec<Stealer<Task>>, injector: Arc<Injector<Task>>, shutdown: Arc<AtomicBool>) {
        let mut idle_rounds = 0;

        loop {
            // drain whatever is queued before honouring shutdown
            if let Some(task) = self.find_task(&stealers, &injector) {
                idle_rounds = 0;
                self.execute_task(task);
                continue;
            }

            if shutdown.load(Ordering::Acquire) {
                break;
            }

            self.backoff(&mut idle_rounds);
        }
    }

    fn find_task(&self, stealers: &[Stealer<Task>], injector: &Injector<Task>) -> Option<Task> {
        // local -> global -> steal
        if let Some(task) = self.local_queue.pop() {
            return Some(task);
        }

        loop {
            match injector.steal_batch_and_pop(&self.local_queue) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        self.try_steal_from_workers(stealers)
    }

    fn try_steal_from_workers(&self, stealers: &[Stealer<Task>]) -> Option<Task> {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        if stealers.len() < 2 {
            return None;
        }

        let mut indices: Vec<usize> = (0..stealers.len()).collect();
        indices.shuffle(&mut thread_rng());

        for &idx in &indices {
            if idx == self.id {
                continue;
            }

            loop {
                match stealers[idx].steal_batch_and_pop(&self.local_queue) {
                    Steal::Success(task) => {
                        self.state.tasks_stolen.fetch_add(1, Ordering::Relaxed);
                        return Some(task);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn execute_task(&self, task: Task) {
        let tid = task.id;
        if let Err(panic) = isolate(|| task.execute()) {
            // dispatcher jobs catch their own panics; this only trips on raw tasks
            tracing::warn!(task = tid.as_u64(), worker = self.id, %panic, "task panicked");
        }
        self.state.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    fn backoff(&self, count: &mut u32) {
        *count = count.saturating_add(1);

        if *count <= MAX_SPINS {
            let spins = (*count).min(6);
            for _ in 0..(1 << spins) {
                std::hint::spin_loop();
            }
        } else if *count <= MAX_YIELDS {
            thread::yield_now();
        } else {
            thread::park_timeout(park_duration(*count));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_park_interval_grows_and_caps() {
        assert_eq!(park_duration(MAX_YIELDS + 1), MIN_PARK);
        assert_eq!(park_duration(MAX_YIELDS + 2), MIN_PARK * 2);
        assert!(park_duration(MAX_YIELDS + 5) > park_duration(MAX_YIELDS + 4));
        assert_eq!(park_duration(MAX_YIELDS + 50), MAX_PARK);
        assert_eq!(park_duration(u32::MAX), MAX_PARK);
    }

    #[test]
    fn test_worker_drains_injector_then_stops() {
        let worker = Worker::new(0);
        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(true));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = counter.clone();
            injector.push(Task::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // shutdown is already set, so run returns once the queue is empty
        worker.run(vec![worker.local_queue.stealer()], injector, shutdown);

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(worker.state.tasks_executed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_worker_survives_panicking_task() {
        let worker = Worker::new(0);
        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(true));

        injector.push(Task::new(|| panic!("bad task")));
        injector.push(Task::new(|| {}));

        worker.run(Vec::new(), injector, shutdown);
        assert_eq!(worker.state.tasks_executed.load(Ordering::SeqCst), 2);
    }
}
