//! Worker threads: pop task indices, run them against the shared counter
//! under the matching lock mode, and publish timed results.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::completion::{self, CompletionBarrier, WorkerToken};
use crate::error::SimError;
use crate::executor::Executor;
use crate::shared_resource::{ByteStore, SharedResource};
use crate::task_store::TaskDataStore;
use crate::types::{TaskIndex, TaskKind, TaskResult};

/// Per-worker tally, logged when the worker exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub reads: usize,
    pub writes: usize,
}

/// Run one task: exclusive add for writes, shared line read for reads.
/// The simulated latency is spent while holding the lock.
pub fn execute_task<S: ByteStore>(
    store: &TaskDataStore,
    resource: &SharedResource<S>,
    index: TaskIndex,
) -> Result<TaskResult, SimError> {
    let task = store
        .get(index)
        .ok_or_else(|| SimError::TaskIndexOutOfRange {
            index,
            len: store.len(),
        })?;
    let id = task.id;
    let latency = store.cost_duration(index as usize);

    let start = Instant::now();
    let value = match task.kind {
        TaskKind::Write => {
            resource.add(u64::from(task.value), latency)?;
            String::new()
        }
        TaskKind::Read => {
            let line = resource.read_line(latency)?;
            debug!("R - task {id} : {line}");
            line
        }
    };
    let elapsed_nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);

    Ok(TaskResult::new(id, elapsed_nanos, value))
}

/// Drain the task queue until it is closed and empty.
///
/// Returns at the first failure without publishing a result for the failed
/// task; the caller decides how fatal that is.
pub fn run_worker<S: ByteStore>(
    executor: &Executor,
    resource: &SharedResource<S>,
) -> Result<WorkerStats, SimError> {
    let mut stats = WorkerStats::default();
    while let Some(index) = executor.tasks().pop_blocking_or_closed() {
        let result = execute_task(executor.store(), resource, index)?;
        match executor.store().kind(index as usize) {
            TaskKind::Write => stats.writes += 1,
            TaskKind::Read => stats.reads += 1,
        }
        executor.publish(result)?;
    }
    Ok(stats)
}

fn spawn_worker<S: ByteStore + 'static>(
    worker_id: usize,
    executor: Arc<Executor>,
    resource: Arc<SharedResource<S>>,
    token: WorkerToken,
) -> Result<thread::JoinHandle<()>, SimError> {
    let name = format!("worker-{worker_id}");
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let _token = token;
            match run_worker(&executor, &resource) {
                Ok(stats) => {
                    debug!(reads = stats.reads, writes = stats.writes, "worker exiting");
                }
                Err(err) => {
                    error!(%err, "fatal worker error; aborting run");
                    std::process::exit(1);
                }
            }
        })
        .map_err(|source| SimError::Spawn { name, source })
}

/// Close the task queue, discard what is still queued, and join `handles`.
/// Each worker finishes at most its current task. Returns the number of
/// discarded indices.
fn stop_started(executor: &Executor, handles: Vec<thread::JoinHandle<()>>) -> usize {
    executor.tasks().close();
    let mut discarded = 0usize;
    while executor.tasks().try_pop().is_some() {
        discarded += 1;
    }
    let joined = handles.len();
    for handle in handles {
        if handle.join().is_err() {
            error!("worker panicked while stopping");
        }
    }
    warn!(joined, discarded, "pool start failed; stopped running workers");
    discarded
}

/// A fixed set of worker threads plus the drain coordinator.
pub struct WorkerPool {
    workers: Vec<thread::JoinHandle<()>>,
    coordinator: thread::JoinHandle<()>,
}

impl WorkerPool {
    /// Spawn `workers` threads named `worker-{n}` and the coordinator that
    /// closes the result queue after the last of them exits.
    ///
    /// A worker that hits a resource error logs it and exits the process. If a
    /// spawn fails, the workers already running are stopped and joined before
    /// the error is returned.
    pub fn start<S: ByteStore + 'static>(
        executor: Arc<Executor>,
        resource: Arc<SharedResource<S>>,
        workers: usize,
    ) -> Result<Self, SimError> {
        let mut barrier = CompletionBarrier::new();
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let token = barrier.register();
            let spawned = spawn_worker(
                worker_id,
                Arc::clone(&executor),
                Arc::clone(&resource),
                token,
            );
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    stop_started(&executor, handles);
                    return Err(err);
                }
            }
        }
        match completion::spawn_drain_coordinator(barrier, Arc::clone(&executor)) {
            Ok(coordinator) => Ok(Self {
                workers: handles,
                coordinator,
            }),
            Err(err) => {
                stop_started(&executor, handles);
                Err(err)
            }
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Join every worker and the coordinator. Returns how many threads panicked.
    pub fn join(self) -> usize {
        let mut panicked = 0;
        let coordinator = std::iter::once(self.coordinator);
        for handle in self.workers.into_iter().chain(coordinator) {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "thread panicked");
                panicked += 1;
            }
        }
        panicked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceError;
    use crate::shared_resource::{FlakyStore, MemoryStore};
    use std::collections::HashSet;
    use std::time::Duration;

    fn store_from(tasks: &[(TaskKind, u8)]) -> TaskDataStore {
        let mut store = TaskDataStore::with_len(tasks.len());
        for (index, &(kind, value)) in tasks.iter().enumerate() {
            store.set_task(index, index as u32, kind, value);
        }
        store
    }

    /// Run a whole pool over `store` and drain results the way a consumer would.
    fn run_pool(store: TaskDataStore, workers: usize) -> (Vec<TaskResult>, u64) {
        let executor = Arc::new(Executor::for_store(Arc::new(store)));
        executor.enqueue_all().expect("enqueue");
        let resource =
            Arc::new(SharedResource::initialize(MemoryStore::default()).expect("initialize"));

        let pool = WorkerPool::start(Arc::clone(&executor), Arc::clone(&resource), workers)
            .expect("start pool");
        assert_eq!(pool.size(), workers);
        let results: Vec<TaskResult> =
            std::iter::from_fn(|| executor.results().pop_blocking_or_closed()).collect();
        assert_eq!(pool.join(), 0);

        (results, resource.value().expect("final counter"))
    }

    #[test]
    fn write_task_adds_value_and_returns_empty() {
        let store = store_from(&[(TaskKind::Write, 7)]);
        let resource = SharedResource::initialize(MemoryStore::default()).expect("initialize");
        let result = execute_task(&store, &resource, 0).expect("execute");
        assert_eq!(result.task_id, 0);
        assert!(result.value.is_empty());
        assert_eq!(resource.value().expect("value"), 7);
    }

    #[test]
    fn read_task_returns_current_line() {
        let store = store_from(&[(TaskKind::Write, 4), (TaskKind::Read, 9)]);
        let resource = SharedResource::initialize(MemoryStore::default()).expect("initialize");
        execute_task(&store, &resource, 0).expect("write");
        let result = execute_task(&store, &resource, 1).expect("read");
        assert_eq!(result.task_id, 1);
        assert_eq!(result.value, "4");
        // The read value column is ignored.
        assert_eq!(resource.value().expect("value"), 4);
    }

    #[test]
    fn elapsed_time_includes_simulated_latency() {
        let mut store = store_from(&[(TaskKind::Read, 0)]);
        store.set_cost(0, 0.005);
        let resource = SharedResource::initialize(MemoryStore::default()).expect("initialize");
        let result = execute_task(&store, &resource, 0).expect("execute");
        assert!(result.elapsed_nanos >= Duration::from_millis(5).as_nanos() as u64);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let store = store_from(&[(TaskKind::Read, 0)]);
        let resource = SharedResource::initialize(MemoryStore::default()).expect("initialize");
        let err = execute_task(&store, &resource, 5).expect_err("out of range");
        assert!(matches!(err, SimError::TaskIndexOutOfRange { index: 5, len: 1 }));
    }

    #[test]
    fn resource_failure_stops_worker_without_publishing() {
        let store = store_from(&[(TaskKind::Read, 0), (TaskKind::Read, 0)]);
        let executor = Executor::for_store(Arc::new(store));
        executor.enqueue_all().expect("enqueue");
        // Initialization never reads, so an always-failing store still opens.
        let failing = SharedResource::initialize(FlakyStore {
            fail_reads: true,
            ..FlakyStore::default()
        })
        .expect("initialize");

        let err = run_worker(&executor, &failing).expect_err("read must fail");
        assert!(matches!(err, SimError::Resource(_)));
        assert_eq!(executor.results().len(), 0);
        // The second index is left for other workers.
        assert_eq!(executor.tasks().len(), 1);
    }

    #[test]
    fn write_failure_stops_worker_and_keeps_counter() {
        let store = store_from(&[(TaskKind::Write, 4), (TaskKind::Write, 6)]);
        let executor = Executor::for_store(Arc::new(store));
        executor.enqueue_all().expect("enqueue");
        let failing = SharedResource::initialize(FlakyStore::default()).expect("initialize");
        failing.add(2, Duration::ZERO).expect("seed counter");
        failing.store_mut().fail_writes = true;

        let err = run_worker(&executor, &failing).expect_err("write must fail");
        assert!(matches!(err, SimError::Resource(ResourceError::Io(_))));
        assert_eq!(executor.results().len(), 0);
        assert_eq!(failing.value().expect("previous counter"), 2);
    }

    #[test]
    fn stopping_started_workers_discards_queue_and_joins() {
        let total = 200;
        let mut store = store_from(&vec![(TaskKind::Write, 1); total]);
        for index in 0..total {
            store.set_cost(index, 0.002);
        }
        let executor = Arc::new(Executor::for_store(Arc::new(store)));
        executor.enqueue_all().expect("enqueue");
        let resource =
            Arc::new(SharedResource::initialize(MemoryStore::default()).expect("initialize"));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let executor = Arc::clone(&executor);
                let resource = Arc::clone(&resource);
                thread::spawn(move || {
                    run_worker(&executor, &resource).expect("worker");
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(10));

        let discarded = stop_started(&executor, handles);
        assert!(discarded > 0);
        assert_eq!(executor.tasks().len(), 0);

        // Every worker is joined, so the counter no longer moves.
        let settled = resource.value().expect("counter");
        thread::sleep(Duration::from_millis(20));
        assert_eq!(resource.value().expect("counter"), settled);
        assert_eq!(settled as usize + discarded, total);
        assert_eq!(executor.results().len() + discarded, total);
    }

    #[test]
    fn worker_counts_reads_and_writes() {
        let store = store_from(&[
            (TaskKind::Write, 1),
            (TaskKind::Read, 0),
            (TaskKind::Write, 2),
        ]);
        let executor = Executor::for_store(Arc::new(store));
        executor.enqueue_all().expect("enqueue");
        let resource = SharedResource::initialize(MemoryStore::default()).expect("initialize");
        let stats = run_worker(&executor, &resource).expect("run");
        assert_eq!(stats, WorkerStats { reads: 1, writes: 2 });
        assert_eq!(executor.results().len(), 3);
    }

    #[test]
    fn concurrent_writes_are_serializable() {
        let writes = 60;
        let value = 3u8;
        for workers in [1, 2, 4, 8] {
            let store = store_from(&vec![(TaskKind::Write, value); writes]);
            let (results, counter) = run_pool(store, workers);
            assert_eq!(results.len(), writes);
            assert_eq!(counter, writes as u64 * u64::from(value), "workers={workers}");
        }
    }

    #[test]
    fn reads_only_observe_committed_values() {
        // Writes of 1 commit exactly the values 0..=writes.
        let writes = 40;
        let mut tasks = Vec::new();
        for _ in 0..writes {
            tasks.push((TaskKind::Write, 1));
            tasks.push((TaskKind::Read, 0));
        }
        let mut store = store_from(&tasks);
        for index in 0..store.len() {
            store.set_cost(index, 0.0005);
        }

        let (results, counter) = run_pool(store, 6);
        assert_eq!(counter, writes as u64);
        for result in results.iter().filter(|r| r.task_id % 2 == 1) {
            let seen: u64 = result.value.parse().expect("torn or empty read");
            assert!(seen <= writes as u64);
        }
    }

    #[test]
    fn every_index_yields_exactly_one_result() {
        let tasks: Vec<_> = (0..100)
            .map(|i| {
                if i % 3 == 0 {
                    (TaskKind::Write, 2)
                } else {
                    (TaskKind::Read, 0)
                }
            })
            .collect();
        let (results, _) = run_pool(store_from(&tasks), 4);
        let ids: HashSet<u32> = results.iter().map(|r| r.task_id).collect();
        assert_eq!(results.len(), 100);
        assert_eq!(ids, (0..100).collect());
    }

    #[test]
    fn single_worker_sees_writes_in_enqueue_order() {
        let tasks = [
            (TaskKind::Read, 0),
            (TaskKind::Write, 5),
            (TaskKind::Read, 0),
            (TaskKind::Write, 2),
            (TaskKind::Write, 10),
            (TaskKind::Read, 0),
        ];
        let (results, counter) = run_pool(store_from(&tasks), 1);
        let ids: Vec<u32> = results.iter().map(|r| r.task_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
        let reads: Vec<&str> = results
            .iter()
            .filter(|r| !r.value.is_empty())
            .map(|r| r.value.as_str())
            .collect();
        assert_eq!(reads, vec!["0", "5", "17"]);
        assert_eq!(counter, 17);
    }
}
