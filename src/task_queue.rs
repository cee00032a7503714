//! Thread-safe bounded FIFO with close semantics and blocking consumers.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Why a push was refused; the item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    Full(T),
    Closed(T),
}

/// A synchronized FIFO of fixed capacity. Producers never block; consumers
/// block until an item arrives or the queue is closed and drained.
pub struct BoundedQueue<T> {
    inner: Mutex<QueueState<T>>,
    available: Condvar,
    capacity: usize,
}

struct QueueState<T> {
    queue: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue holding at most `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueState {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Push an item; returns it back if the queue is closed or full.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut guard = self.inner.lock();
        if guard.closed {
            return Err(PushError::Closed(item));
        }
        if guard.queue.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        guard.queue.push_back(item);
        self.available.notify_one();
        Ok(())
    }

    /// Try to pop immediately without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().queue.pop_front()
    }

    /// Block until an item is available or the queue is closed and empty.
    pub fn pop_blocking_or_closed(&self) -> Option<T> {
        let mut guard = self.inner.lock();
        loop {
            if let Some(item) = guard.queue.pop_front() {
                return Some(item);
            }
            if guard.closed {
                return None;
            }
            // Wait releases the lock and re-acquires it before returning.
            self.available.wait(&mut guard);
        }
    }

    /// Close the queue and wake all blocked consumers. Queued items stay
    /// available to consumers.
    pub fn close(&self) {
        let mut guard = self.inner.lock();
        guard.closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
