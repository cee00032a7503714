//! Columnar, read-only-after-construction storage of task descriptors.
//!
//! Costs are kept as `u16` fixed-point values (scale 10000) instead of floats
//! to halve the per-task footprint of the cost column.

use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::StoreError;
use crate::types::{TaskId, TaskIndex, TaskKind};

/// Largest accepted simulated cost, in seconds.
pub const MAX_COST: f32 = 0.01;
/// Largest amount a write task may add to the counter.
pub const MAX_VALUE: u8 = 10;
const COST_SCALE: f32 = 10_000.0;
const MICROS_PER_STEP: u64 = 100;

/// Row view over the store columns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TaskDescriptor {
    pub id: TaskId,
    pub cost: f32,
    pub kind: TaskKind,
    pub value: u8,
}

/// Task descriptors stored column-wise; entry `i` of every column is task `i`.
#[derive(Clone, Debug, Default)]
pub struct TaskDataStore {
    ids: Vec<TaskId>,
    costs: Vec<u16>,
    kinds: Vec<TaskKind>,
    values: Vec<u8>,
}

/// `Write` for indices below `write_tasks`, `Read` otherwise.
pub fn classify(index: usize, write_tasks: usize) -> TaskKind {
    if index < write_tasks {
        TaskKind::Write
    } else {
        TaskKind::Read
    }
}

impl TaskDataStore {
    /// Allocate `len` zeroed entries in every column.
    pub fn with_len(len: usize) -> Self {
        Self {
            ids: vec![0; len],
            costs: vec![0; len],
            kinds: vec![TaskKind::Read; len],
            values: vec![0; len],
        }
    }

    /// Generate a shuffled workload of `total` tasks, the first `write_tasks`
    /// ids being writes.
    ///
    /// Shuffles the id column in place and fills the other columns row by row,
    /// so no row-wise copy of the workload is ever built.
    pub fn generate<R: Rng>(total: usize, write_tasks: usize, rng: &mut R) -> Self {
        let mut store = Self::with_len(total);
        for (index, id) in store.ids.iter_mut().enumerate() {
            *id = index as TaskId;
        }
        store.ids.shuffle(rng);

        for index in 0..total {
            store.kinds[index] = classify(store.ids[index] as usize, write_tasks);
            store.values[index] = rng.random_range(0..=MAX_VALUE);
            store.set_cost(index, rng.random_range(0.0..=MAX_COST));
        }
        store
    }

    /// Fill the non-cost columns of one row. Values above `MAX_VALUE` are clamped.
    pub fn set_task(&mut self, index: usize, id: TaskId, kind: TaskKind, value: u8) {
        self.ids[index] = id;
        self.kinds[index] = kind;
        self.values[index] = value.min(MAX_VALUE);
    }

    /// Store `cost` if it lies in `[0, MAX_COST]`; otherwise keep the previous
    /// value. Callers must not assume a rejected cost round-trips.
    pub fn set_cost(&mut self, index: usize, cost: f32) {
        let _ = self.try_set_cost(index, cost);
    }

    /// Strict variant of [`set_cost`](Self::set_cost) that reports rejections.
    pub fn try_set_cost(&mut self, index: usize, cost: f32) -> Result<(), StoreError> {
        // NaN fails `contains` as well.
        if !(0.0..=MAX_COST).contains(&cost) {
            return Err(StoreError::CostOutOfRange {
                cost,
                max: MAX_COST,
            });
        }
        self.costs[index] = (cost * COST_SCALE).round() as u16;
        Ok(())
    }

    /// Decoded cost in seconds.
    pub fn cost(&self, index: usize) -> f32 {
        f32::from(self.costs[index]) / COST_SCALE
    }

    /// Cost as a sleep duration, decoded without going through floats.
    pub fn cost_duration(&self, index: usize) -> Duration {
        Duration::from_micros(u64::from(self.costs[index]) * MICROS_PER_STEP)
    }

    pub fn kind(&self, index: usize) -> TaskKind {
        self.kinds[index]
    }

    pub fn get(&self, index: TaskIndex) -> Option<TaskDescriptor> {
        let index = index as usize;
        if index >= self.len() {
            return None;
        }
        Some(TaskDescriptor {
            id: self.ids[index],
            cost: self.cost(index),
            kind: self.kinds[index],
            value: self.values[index],
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Number of write tasks in the store.
    pub fn write_count(&self) -> usize {
        self.kinds.iter().filter(|kind| kind.is_write()).count()
    }

    /// Counter value expected once every write has been applied.
    pub fn write_value_sum(&self) -> u64 {
        self.kinds
            .iter()
            .zip(&self.values)
            .filter(|(kind, _)| kind.is_write())
            .map(|(_, &value)| u64::from(value))
            .sum()
    }
}
