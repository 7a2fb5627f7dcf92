use super::panic_handler::isolate;
use super::task::Task;
use super::ExecutionPool;
use crate::config::{Config, ExecutionMode};
use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Fixed set of threads pulling tasks from one shared queue.
///
/// Suited to invocations that mostly wait: threads are cheap to park on
/// the channel, and the dispatcher's limiter does the throttling.
pub struct IoPool {
    sender: Mutex<Option<Sender<Task>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
    completed: Arc<AtomicU64>,
}

impl IoPool {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_threads(config, config.io_threads())
    }

    fn with_threads(config: &Config, num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let (tx, rx) = unbounded::<Task>();
        let completed = Arc::new(AtomicU64::new(0));
        let mut threads = Vec::with_capacity(num_threads);

        for id in 0..num_threads {
            let rx = rx.clone();
            let completed = completed.clone();
            let mut builder =
                thread::Builder::new().name(format!("{}-io-{}", config.thread_name_prefix, id));
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            match builder.spawn(move || io_worker_loop(id, rx, completed)) {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    // closing the channel lets already-started threads exit
                    drop(tx);
                    for handle in threads {
                        let _ = handle.join();
                    }
                    return Err(Error::executor(format!("spawn failed: {}", e)));
                }
            }
        }

        tracing::debug!(threads = num_threads, "io pool started");

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            threads: Mutex::new(threads),
            num_threads,
            completed,
        })
    }

    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::new(f))
    }

    pub fn completed_tasks(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Stop accepting work. Threads leave once the queue runs dry.
    pub fn close(&self) {
        if self.sender.lock().take().is_some() {
            tracing::debug!(threads = self.num_threads, "io pool closed");
        }
    }

    /// Close and wait for every thread, including ones still inside a task.
    pub fn join(&self) {
        self.close();

        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        if threads.is_empty() {
            return;
        }
        for handle in threads {
            if handle.join().is_err() {
                tracing::warn!("io worker exited by panic");
            }
        }

        tracing::debug!(threads = self.num_threads, "io pool stopped");
    }
}

fn io_worker_loop(id: usize, rx: Receiver<Task>, completed: Arc<AtomicU64>) {
    // recv fails once every sender is gone and the queue is empty
    while let Ok(task) = rx.recv() {
        let tid = task.id;
        if let Err(panic) = isolate(|| task.execute()) {
            tracing::warn!(task = tid.as_u64(), worker = id, %panic, "task panicked");
        }
        completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl ExecutionPool for IoPool {
    fn submit(&self, task: Task) -> Result<()> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(task).map_err(|_| Error::PoolShutdown),
            None => Err(Error::PoolShutdown),
        }
    }

    fn num_threads(&self) -> usize {
        self.num_threads
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::IoBound
    }

    fn close(&self) {
        IoPool::close(self);
    }

    fn join(&self) {
        IoPool::join(self);
    }
}

impl std::fmt::Debug for IoPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoPool")
            .field("num_threads", &self.num_threads)
            .field("completed", &self.completed_tasks())
            .finish()
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        // handles left in `threads` detach
        self.close();
    }
}
