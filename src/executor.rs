//! Owner of the task-index queue, the result queue, and the task store.

use std::sync::Arc;

use crate::error::SimError;
use crate::task_queue::{BoundedQueue, PushError};
use crate::task_store::TaskDataStore;
use crate::types::{TaskIndex, TaskResult};

/// Queues and workload shared by every worker of one run.
///
/// Each run owns its own executor, so several runs can coexist in one process.
pub struct Executor {
    tasks: BoundedQueue<TaskIndex>,
    results: BoundedQueue<TaskResult>,
    store: Arc<TaskDataStore>,
}

impl Executor {
    /// Allocate both queues. Starts no workers.
    pub fn new(task_capacity: usize, result_capacity: usize, store: Arc<TaskDataStore>) -> Self {
        Self {
            tasks: BoundedQueue::with_capacity(task_capacity),
            results: BoundedQueue::with_capacity(result_capacity),
            store,
        }
    }

    /// Convenience constructor sizing both queues to the store length.
    pub fn for_store(store: Arc<TaskDataStore>) -> Self {
        let len = store.len();
        Self::new(len, len, store)
    }

    /// Enqueue every store index in order, then close the task queue.
    pub fn enqueue_all(&self) -> Result<(), SimError> {
        if self.store.len() > self.tasks.capacity() {
            return Err(SimError::QueueFull { queue: "task" });
        }
        for index in 0..self.store.len() {
            self.tasks
                .push(index as TaskIndex)
                .map_err(|err| queue_error("task", err))?;
        }
        self.tasks.close();
        Ok(())
    }

    /// Publish a result; the result queue must still be open.
    pub fn publish(&self, result: TaskResult) -> Result<(), SimError> {
        self.results
            .push(result)
            .map_err(|err| queue_error("result", err))
    }

    pub fn tasks(&self) -> &BoundedQueue<TaskIndex> {
        &self.tasks
    }

    pub fn results(&self) -> &BoundedQueue<TaskResult> {
        &self.results
    }

    pub fn store(&self) -> &TaskDataStore {
        &self.store
    }
}

fn queue_error<T>(queue: &'static str, err: PushError<T>) -> SimError {
    match err {
        PushError::Full(_) => SimError::QueueFull { queue },
        PushError::Closed(_) => SimError::QueueClosed { queue },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor_with(len: usize) -> Executor {
        Executor::new(1, 1, Arc::new(TaskDataStore::with_len(len)))
    }

    #[test]
    fn new_allocates_queues_with_capacity() {
        let executor = Executor::new(3, 5, Arc::new(TaskDataStore::with_len(1)));
        assert_eq!(executor.tasks().capacity(), 3);
        assert_eq!(executor.results().capacity(), 5);
        assert_eq!(executor.tasks().len(), 0);
        assert!(!executor.tasks().is_closed());
    }

    #[test]
    fn task_queue_returns_inserted_index() {
        let executor = executor_with(1);
        executor.tasks().push(1).expect("push index");
        assert_eq!(executor.tasks().try_pop(), Some(1));
    }

    #[test]
    fn result_queue_returns_inserted_result() {
        let executor = executor_with(1);
        let result = TaskResult::new(1, 1, "1");
        executor.publish(result.clone()).expect("publish");
        assert_eq!(executor.results().try_pop(), Some(result));
    }

    #[test]
    fn enqueue_all_pushes_every_index_then_closes() {
        let executor = Executor::for_store(Arc::new(TaskDataStore::with_len(4)));
        executor.enqueue_all().expect("enqueue");
        assert!(executor.tasks().is_closed());
        let drained: Vec<_> =
            std::iter::from_fn(|| executor.tasks().pop_blocking_or_closed()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
    }

    #[test]
    fn enqueue_all_reports_undersized_queue() {
        let executor = executor_with(2);
        let err = executor.enqueue_all().expect_err("capacity 1 < 2 tasks");
        assert!(matches!(err, SimError::QueueFull { queue: "task" }));
    }

    #[test]
    fn publish_after_close_is_an_error() {
        let executor = executor_with(1);
        executor.results().close();
        let err = executor
            .publish(TaskResult::default())
            .expect_err("closed queue");
        assert!(matches!(err, SimError::QueueClosed { queue: "result" }));
    }
}
