//! Fixed-size worker pool draining a shared [`TaskQueue`].
//!
//! Workers block on the queue until work arrives or a stop is requested.
//! Stopping never abandons queued work: workers exit only once the stop
//! flag is set *and* the queue is empty.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::Task;
use super::queue::TaskQueue;
use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Lifecycle state of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Constructed, workers not yet spawned.
    Created,
    /// Accepting and executing work.
    Running,
    /// Stop requested; draining the queue and joining workers.
    Stopping,
    /// All workers joined. Terminal.
    Stopped,
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PoolState::Created => "created",
            PoolState::Running => "running",
            PoolState::Stopping => "stopping",
            PoolState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// State shared between the pool handle and its workers.
struct Shared {
    queue: TaskQueue<Box<dyn Task>>,
    stop: AtomicBool,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl Shared {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Run one task, containing any panic it raises.
    fn execute(&self, task: Box<dyn Task>) {
        let name = task.name().to_string();
        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(move || task.run()));
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let outcome = match result {
            Ok(()) => "ok",
            Err(payload) => {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                error!(
                    task = %name,
                    panic = %panic_message(payload.as_ref()),
                    "task panicked"
                );
                "panicked"
            }
        };
        self.completed.fetch_add(1, Ordering::Relaxed);

        let attrs = [KeyValue::new("outcome", outcome)];
        metrics::tasks_executed().add(1, &attrs);
        metrics::task_duration_ms().record(elapsed_ms, &attrs);
    }
}

/// The worker pool. Owns its threads and the task queue.
pub struct WorkerPool {
    size: usize,
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    /// Create a pool with `threads` workers.
    ///
    /// `None` sizes the pool from the hardware's available parallelism.
    /// `Some(0)` makes the pool synchronous: every submitted task runs on
    /// the submitting thread and no worker threads are ever spawned.
    pub fn new(threads: Option<usize>) -> Self {
        let size = threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        Self {
            size,
            shared: Arc::new(Shared {
                queue: TaskQueue::new(),
                stop: AtomicBool::new(false),
                completed: AtomicU64::new(0),
                panicked: AtomicU64::new(0),
            }),
            threads: Vec::with_capacity(size),
            state: Mutex::new(PoolState::Created),
        }
    }

    /// Spawn the workers. Calling `start` on a running pool is a no-op.
    pub fn start(&mut self) -> Result<()> {
        {
            let state = self.state.lock();
            match *state {
                PoolState::Created => {}
                PoolState::Running => return Ok(()),
                PoolState::Stopping | PoolState::Stopped => return Err(Error::PoolStopped),
            }
        }

        for worker_idx in 0..self.size {
            let shared = Arc::clone(&self.shared);
            let spawned = std::thread::Builder::new()
                .name(format!("collector-worker-{worker_idx}"))
                .spawn(move || worker_loop(&shared, worker_idx));

            match spawned {
                Ok(handle) => self.threads.push(handle),
                Err(e) => {
                    error!(worker_idx, "failed to spawn worker: {e}");
                    self.stop();
                    return Err(Error::Io(e));
                }
            }
        }

        *self.state.lock() = PoolState::Running;
        info!(workers = self.size, state = %PoolState::Running, "worker pool started");
        Ok(())
    }

    /// Hand a task to the pool.
    ///
    /// In synchronous mode the task runs before this returns. Otherwise it
    /// is queued and this returns immediately.
    pub fn submit<T: Task>(&self, task: T) -> Result<()> {
        self.submit_boxed(Box::new(task))
    }

    pub fn submit_boxed(&self, task: Box<dyn Task>) -> Result<()> {
        if matches!(*self.state.lock(), PoolState::Stopping | PoolState::Stopped) {
            warn!(task = task.name(), "submit after stop, task rejected");
            return Err(Error::PoolStopped);
        }

        metrics::tasks_submitted().add(1, &[]);

        if self.size == 0 {
            self.shared.execute(task);
        } else {
            self.shared.queue.push(task);
        }
        Ok(())
    }

    /// Request stop, drain the queue and join every worker.
    ///
    /// Blocks until all work submitted before this call has executed.
    /// Idempotent; also run on drop.
    pub fn stop(&mut self) {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            if previous == PoolState::Stopped {
                return;
            }
            *state = PoolState::Stopping;
            previous
        };
        debug!(from = %previous, state = %PoolState::Stopping, "worker pool stopping");

        self.shared.stop.store(true, Ordering::Release);
        self.shared.queue.wake_all();

        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                // Task panics are caught inside the loop; this is a bug in the loop itself.
                error!("worker thread terminated abnormally");
            }
        }

        // Never started: nobody else will run what was queued.
        if previous == PoolState::Created {
            while let Some(task) = self.shared.queue.try_pop() {
                self.shared.execute(task);
            }
        }

        *self.state.lock() = PoolState::Stopped;
        info!(
            state = %PoolState::Stopped,
            completed = self.completed(),
            panicked = self.panicked(),
            "worker pool stopped"
        );
    }

    /// Number of worker threads (0 in synchronous mode).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks waiting in the queue. A snapshot.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Tasks executed so far, including ones that panicked.
    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Tasks that panicked during execution.
    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> PoolState {
        *self.state.lock()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared, worker_idx: usize) {
    debug!(worker_idx, "worker started");

    while !shared.stop_requested() || !shared.queue.is_empty() {
        shared.queue.wait_until_ready(|| shared.stop_requested());

        // Another worker may have won the race for this item; loop and re-check.
        if let Some(task) = shared.queue.try_pop() {
            shared.execute(task);
        }
    }

    debug!(worker_idx, "worker exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
