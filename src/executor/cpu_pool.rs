use super::task::Task;
use super::worker::{Worker, WorkerId, WorkerState};
use super::ExecutionPool;
use crate::config::{Config, ExecutionMode};
use crate::error::{Error, Result};
use crossbeam_deque::Injector;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[cfg(target_os = "linux")]
fn pin_thread_to_core(core_id: usize) {
    let cores = num_cpus::get();
    // SAFETY: cpu_set_t is plain data and sched_setaffinity only reads it.
    let result = unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id % cores, &mut cpuset);
        libc::sched_setaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpuset,
        )
    };
    if result != 0 {
        tracing::debug!(
            thread = thread::current().name().unwrap_or("unknown"),
            core_id,
            "failed to pin thread to core"
        );
    }
}

/// Work-stealing pool for compute-heavy invocations.
///
/// Submissions land on a global injector; each worker pulls batches into
/// its own deque and steals from siblings when both are empty.
///
/// Dropping the pool closes it without joining; see [`join`](CpuPool::join).
pub struct CpuPool {
    workers: Vec<WorkerHandle>,
    injector: Arc<Injector<Task>>,
    shutdown: Arc<AtomicBool>,
    num_threads: usize,
    next_wake: AtomicUsize,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Mutex<Option<JoinHandle<()>>>,
    unparker: thread::Thread,
    state: Arc<WorkerState>,
}

impl CpuPool {
    pub fn new(config: &Config) -> Result<Self> {
        let num_threads = config.cpu_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers: Vec<Worker> = (0..num_threads).map(Worker::new).collect();
        let stealers: Vec<_> = workers.iter().map(|w| w.local_queue.stealer()).collect();

        let mut handles = Vec::with_capacity(num_threads);

        for worker in workers {
            let id = worker.id;
            let state = worker.state.clone();
            let stealers_clone = stealers.clone();
            let injector_clone = injector.clone();
            let shutdown_clone = shutdown.clone();
            let name = format!("{}-cpu-{}", config.thread_name_prefix, id);

            let mut builder = thread::Builder::new().name(name);

            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let pin_workers = config.pin_workers;
            let spawned = builder.spawn(move || {
                #[cfg(target_os = "linux")]
                if pin_workers {
                    pin_thread_to_core(id);
                }
                #[cfg(not(target_os = "linux"))]
                let _ = pin_workers;

                worker.run(stealers_clone, injector_clone, shutdown_clone);
            });

            let thread = match spawned {
                Ok(thread) => thread,
                Err(e) => {
                    // stop the workers that did start before bailing out
                    shutdown.store(true, Ordering::Release);
                    for handle in &handles {
                        stop_worker(handle);
                    }
                    return Err(Error::executor(format!("spawn failed: {}", e)));
                }
            };

            let unparker = thread.thread().clone();

            handles.push(WorkerHandle {
                id,
                thread: Mutex::new(Some(thread)),
                unparker,
                state,
            });
        }

        tracing::debug!(threads = num_threads, "cpu pool started");

        Ok(Self {
            workers: handles,
            injector,
            shutdown,
            num_threads,
            next_wake: AtomicUsize::new(0),
        })
    }

    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::new(f))
    }

    /// Total tasks run and stolen across all workers.
    pub fn task_counts(&self) -> (u64, u64) {
        self.workers.iter().fold((0, 0), |(run, stolen), w| {
            (
                run + w.state.tasks_executed.load(Ordering::Relaxed),
                stolen + w.state.tasks_stolen.load(Ordering::Relaxed),
            )
        })
    }

    /// Stop accepting work. Workers drain the queues, then exit.
    pub fn close(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        // parked workers must see the flag
        for worker in &self.workers {
            worker.unparker.unpark();
        }

        tracing::debug!(threads = self.num_threads, "cpu pool closed");
    }

    /// Close and wait for every worker, including ones still inside a task.
    pub fn join(&self) {
        self.close();

        for worker in &self.workers {
            stop_worker(worker);
        }

        tracing::debug!(threads = self.num_threads, "cpu pool stopped");
    }
}

fn stop_worker(worker: &WorkerHandle) {
    worker.unparker.unpark();
    let thread = worker.thread.lock().take();
    if let Some(thread) = thread {
        if thread.join().is_err() {
            tracing::warn!(worker = worker.id, "cpu worker exited by panic");
        }
    }
}

impl ExecutionPool for CpuPool {
    fn submit(&self, task: Task) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::PoolShutdown);
        }

        self.injector.push(task);

        // round-robin wake so parked workers pick the batch up quickly
        let idx = self.next_wake.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[idx].unparker.unpark();

        Ok(())
    }

    fn num_threads(&self) -> usize {
        self.num_threads
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::CpuBound
    }

    fn close(&self) {
        CpuPool::close(self);
    }

    fn join(&self) {
        CpuPool::join(self);
    }
}

impl std::fmt::Debug for CpuPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuPool")
            .field("num_threads", &self.num_threads)
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for CpuPool {
    fn drop(&mut self) {
        // unjoined handles detach
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn config(threads: usize) -> Config {
        Config::builder().cpu_threads(threads).build().unwrap()
    }

    #[test]
    fn test_runs_every_task() {
        let pool = CpuPool::new(&config(3)).unwrap();
        let (tx, rx) = unbounded();

        for i in 0..100u64 {
            let tx = tx.clone();
            pool.execute(move || {
                tx.send(i * i).unwrap();
            })
            .unwrap();
        }
        drop(tx);

        let mut results: Vec<u64> = rx.iter().take(100).collect();
        results.sort_unstable();
        let expected: Vec<u64> = (0..100u64).map(|i| i * i).collect();
        assert_eq!(results, expected);
        assert_eq!(pool.num_threads(), 3);
        assert_eq!(pool.mode(), ExecutionMode::CpuBound);
    }

    #[test]
    fn test_join_drains_and_rejects() {
        let pool = CpuPool::new(&config(2)).unwrap();
        let (tx, rx) = unbounded();

        for _ in 0..10 {
            let tx = tx.clone();
            pool.execute(move || tx.send(()).unwrap()).unwrap();
        }

        pool.join();
        assert_eq!(rx.try_iter().count(), 10);
        assert_eq!(pool.task_counts().0, 10);
        assert!(matches!(pool.execute(|| {}), Err(Error::PoolShutdown)));
    }

    #[test]
    fn test_close_returns_while_worker_busy() {
        let pool = CpuPool::new(&config(1)).unwrap();
        let (started_tx, started_rx) = unbounded();
        let (done_tx, done_rx) = unbounded();

        pool.execute(move || {
            started_tx.send(()).unwrap();
            thread::sleep(std::time::Duration::from_millis(100));
            done_tx.send(()).unwrap();
        })
        .unwrap();
        started_rx.recv().unwrap();

        pool.close();
        assert!(done_rx.try_recv().is_err());
        assert!(matches!(pool.execute(|| {}), Err(Error::PoolShutdown)));

        pool.join();
        assert!(done_rx.try_recv().is_ok());
    }
}
