//! Execution engine: task queue and the worker pool that drains it.

pub mod pool;
pub mod queue;

pub use pool::{PoolState, WorkerPool};
pub use queue::TaskQueue;

/// A unit of work executed exactly once by the pool.
///
/// `run` consumes the boxed task, so ownership moves from the submitter to
/// the queue to exactly one worker, and the task is dropped when it returns
/// or unwinds.
pub trait Task: Send + 'static {
    /// Short label for logs.
    fn name(&self) -> &str {
        "task"
    }

    fn run(self: Box<Self>);
}

impl<F> Task for F
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (*self)()
    }
}
