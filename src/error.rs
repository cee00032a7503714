//! Error types for the task store, shared counter, configuration, and runs.

use std::io;

use thiserror::Error;

use crate::types::TaskIndex;

/// Rejections from the strict task store setters.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("cost {cost} outside [0, {max}]")]
    CostOutOfRange { cost: f32, max: f32 },
}

/// Failures while reading or updating the shared counter.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("shared resource I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The stored line is not a decimal counter.
    #[error("malformed counter line: {line:?}")]
    Malformed { line: String },

    #[error("counter overflow: {current} + {delta}")]
    Overflow { current: u64, delta: u64 },
}

/// Invalid run parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name} value: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("N must be <= {max}, got {value}")]
    ExponentTooLarge { value: u32, max: u32 },

    #[error("T must be > 0")]
    NoWorkers,

    #[error("E must be a percentage in 0..=100, got {0}")]
    WritePercent(u32),

    #[error("unexpected argument: {0}")]
    Unexpected(String),
}

/// Failures of a whole simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("task index {index} out of range for store of {len}")]
    TaskIndexOutOfRange { index: TaskIndex, len: usize },

    #[error("workload has {generated} write tasks, expected {expected}")]
    WriteCountMismatch { expected: usize, generated: usize },

    #[error("{queue} queue is full")]
    QueueFull { queue: &'static str },

    #[error("{queue} queue closed while publishing")]
    QueueClosed { queue: &'static str },

    #[error("failed to spawn {name}: {source}")]
    Spawn { name: String, source: io::Error },

    #[error("{0} thread(s) panicked")]
    ThreadsPanicked(usize),

    #[error("report I/O failed: {0}")]
    Report(#[source] io::Error),
}
