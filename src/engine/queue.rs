//! Thread-safe FIFO task queue.
//!
//! A mutex-guarded `VecDeque` paired with a condition variable so blocked
//! consumers sleep instead of spinning.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

pub struct TaskQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    /// Append to the tail and wake one waiter.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.ready.notify_one();
    }

    /// Block until an item is present, then remove and return the head.
    pub fn wait_and_pop(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.ready.wait(&mut items);
        }
    }

    /// Remove and return the head without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Block until the queue is non-empty or `stop` returns true.
    ///
    /// `stop` is evaluated under the queue lock; whoever flips the condition
    /// it reads must call [`wake_all`](Self::wake_all) afterwards.
    pub fn wait_until_ready(&self, stop: impl Fn() -> bool) {
        let mut items = self.items.lock();
        self.ready
            .wait_while(&mut items, |items| items.is_empty() && !stop());
    }

    /// Wake every waiter so it re-checks its condition.
    pub fn wake_all(&self) {
        // Taking the lock orders this wake after any waiter's predicate check.
        let _items = self.items.lock();
        self.ready.notify_all();
    }

    /// Snapshot; may be stale by the time the caller looks at it.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Snapshot; may be stale by the time the caller looks at it.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}
