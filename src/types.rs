//! Shared identifiers and the task/result model used across the system.

/// Stable identifier assigned to a task at generation time.
pub type TaskId = u32;
/// Position of a task inside the columnar task store.
pub type TaskIndex = u32;

/// Whether a task reads or mutates the shared counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TaskKind {
    #[default]
    Read,
    Write,
}

impl TaskKind {
    pub fn is_write(self) -> bool {
        matches!(self, TaskKind::Write)
    }
}

/// Outcome of one processed task, published on the result queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskResult {
    /// Id of the task that produced this result.
    pub task_id: TaskId,
    /// Wall-clock time of the whole operation, simulated latency included.
    pub elapsed_nanos: u64,
    /// First line seen by a read; empty for writes.
    pub value: String,
}

impl TaskResult {
    pub fn new(task_id: TaskId, elapsed_nanos: u64, value: impl Into<String>) -> Self {
        Self {
            task_id,
            elapsed_nanos,
            value: value.into(),
        }
    }
}
