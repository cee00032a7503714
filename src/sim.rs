//! Single-run and sweep drivers: build a workload, run the pool, drain and
//! verify results, and report timings.

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::error::SimError;
use crate::executor::Executor;
use crate::shared_resource::SharedResource;
use crate::task_store::TaskDataStore;
use crate::worker::WorkerPool;

/// Name of the counter file inside the output directory.
pub const COUNTER_FILE: &str = "shared_file.txt";

const CSV_HEADER: &str = "tasks,workers,write_pct,write_tasks,elapsed_ms,throughput_tasks_per_s,cpu_user_s,cpu_sys_s,final_counter,expected_counter,counter_matches,unique_ids";

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    use libc::{RUSAGE_SELF, getrusage, rusage};
    let mut usage = std::mem::MaybeUninit::<rusage>::zeroed();
    let rc = unsafe { getrusage(RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let usage = unsafe { usage.assume_init() };
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

/// Aggregated outcome of one run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub tasks: usize,
    pub workers: usize,
    pub write_percent: u32,
    pub write_tasks: usize,
    pub read_tasks: usize,
    pub results: usize,
    /// Every result id appeared once and they cover the whole workload.
    pub unique_ids: bool,
    pub final_counter: u64,
    pub expected_counter: u64,
    pub elapsed_ns: u128,
    pub cpu_user_s: Option<f64>,
    pub cpu_sys_s: Option<f64>,
}

impl RunSummary {
    pub fn counter_matches(&self) -> bool {
        self.final_counter == self.expected_counter
    }

    pub fn throughput(&self) -> f64 {
        if self.elapsed_ns == 0 {
            return 0.0;
        }
        self.results as f64 / (self.elapsed_ns as f64 / 1_000_000_000.0)
    }

    fn csv_row(&self) -> String {
        let cpu = |value: Option<f64>| {
            value
                .map(|v| format!("{v:.4}"))
                .unwrap_or_else(|| "NA".to_string())
        };
        format!(
            "{},{},{},{},{:.2},{:.2},{},{},{},{},{},{}",
            self.tasks,
            self.workers,
            self.write_percent,
            self.write_tasks,
            self.elapsed_ns as f64 / 1_000_000.0,
            self.throughput(),
            cpu(self.cpu_user_s),
            cpu(self.cpu_sys_s),
            self.final_counter,
            self.expected_counter,
            self.counter_matches(),
            self.unique_ids
        )
    }

    fn print(&self) {
        let cpu = |value: Option<f64>| {
            value
                .map(|v| format!("{v:.4}"))
                .unwrap_or_else(|| "NA".to_string())
        };
        println!("RUN SUMMARY");
        println!("tasks={}", self.tasks);
        println!("workers={}", self.workers);
        println!("write_tasks={}", self.write_tasks);
        println!("read_tasks={}", self.read_tasks);
        println!("results={}", self.results);
        println!("unique_ids={}", self.unique_ids);
        println!("final_counter={}", self.final_counter);
        println!("expected_counter={}", self.expected_counter);
        println!("counter_matches={}", self.counter_matches());
        println!("elapsed_ns={}", self.elapsed_ns);
        println!("throughput_tasks_per_s={:.2}", self.throughput());
        println!("cpu_user_s={}", cpu(self.cpu_user_s));
        println!("cpu_sys_s={}", cpu(self.cpu_sys_s));
    }
}

/// File name of the timing report for a configuration.
pub fn report_file_name(config: &RunConfig) -> String {
    format!(
        "n{}_t{}_e{}.txt",
        config.exponent, config.workers, config.write_percent
    )
}

fn open_counter_file(path: &Path) -> Result<File, SimError> {
    File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|err| SimError::Resource(err.into()))
}

fn check_workload(store: &TaskDataStore, write_tasks: usize) -> Result<(), SimError> {
    let generated = store.write_count();
    if generated != write_tasks {
        return Err(SimError::WriteCountMismatch {
            expected: write_tasks,
            generated,
        });
    }
    Ok(())
}

/// Run one configuration with the counter persisted at `counter_path`.
pub fn simulate(config: &RunConfig, counter_path: &Path) -> Result<RunSummary, SimError> {
    config.validate()?;
    let total = config.total_tasks();
    let write_tasks = config.write_tasks();

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let store = Arc::new(TaskDataStore::generate(total, write_tasks, &mut rng));
    check_workload(&store, write_tasks)?;
    let expected_counter = store.write_value_sum();

    let executor = Arc::new(Executor::for_store(Arc::clone(&store)));
    executor.enqueue_all()?;
    let resource = Arc::new(SharedResource::initialize(open_counter_file(counter_path)?)?);

    let cpu_start = cpu_times_seconds();
    let start = Instant::now();
    let pool = WorkerPool::start(Arc::clone(&executor), Arc::clone(&resource), config.workers)?;
    info!(
        tasks = total,
        writes = write_tasks,
        workers = pool.size(),
        queued = executor.tasks().len(),
        counter = %counter_path.display(),
        "run started"
    );

    let mut results = 0usize;
    let mut ids = HashSet::with_capacity(total);
    let mut duplicate = false;
    while let Some(result) = executor.results().pop_blocking_or_closed() {
        results += 1;
        if !ids.insert(result.task_id) {
            warn!(task = result.task_id, "duplicate result");
            duplicate = true;
        }
    }
    let elapsed_ns = start.elapsed().as_nanos();

    let panicked = pool.join();
    if panicked > 0 {
        return Err(SimError::ThreadsPanicked(panicked));
    }
    // Workers only exit on a closed, empty queue; anything left is a bug.
    let mut leftover = 0usize;
    while executor.tasks().try_pop().is_some() {
        leftover += 1;
    }
    if leftover > 0 {
        warn!(leftover, "task indices left in queue");
    }
    resource.sync()?;

    let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
            (Some(user_end - user_start), Some(sys_end - sys_start))
        }
        _ => (None, None),
    };

    let summary = RunSummary {
        tasks: total,
        workers: config.workers,
        write_percent: config.write_percent,
        write_tasks,
        read_tasks: total - write_tasks,
        results,
        unique_ids: !duplicate && ids.len() == total,
        final_counter: resource.value()?,
        expected_counter,
        elapsed_ns,
        cpu_user_s,
        cpu_sys_s,
    };
    info!(
        elapsed_ns = %summary.elapsed_ns,
        results = summary.results,
        counter = summary.final_counter,
        "run finished"
    );
    Ok(summary)
}

/// Run one configuration from the CLI: counter file and timing report land in
/// `config.output_dir`. Returns the report path.
pub fn run_once(config: &RunConfig) -> Result<PathBuf, SimError> {
    fs::create_dir_all(&config.output_dir).map_err(SimError::Report)?;
    let summary = simulate(config, &config.output_dir.join(COUNTER_FILE))?;
    summary.print();

    let report = config.output_dir.join(report_file_name(config));
    fs::write(&report, format!("{}\n", summary.elapsed_ns)).map_err(SimError::Report)?;
    if !summary.counter_matches() || !summary.unique_ids {
        warn!(
            final_counter = summary.final_counter,
            expected = summary.expected_counter,
            unique_ids = summary.unique_ids,
            "run verification failed"
        );
    }
    Ok(report)
}

/// Sweep worker counts and write percentages at one exponent, printing CSV.
pub fn run_stress(
    exponent: u32,
    worker_sets: &[usize],
    write_sets: &[u32],
    seed: Option<u64>,
    output_dir: &Path,
) -> Result<(), SimError> {
    fs::create_dir_all(output_dir).map_err(SimError::Report)?;
    let counter_path = output_dir.join(COUNTER_FILE);

    println!("{CSV_HEADER}");
    for &workers in worker_sets {
        for &write_percent in write_sets {
            let mut config = RunConfig::new(exponent, workers, write_percent);
            config.seed = seed;
            config.output_dir = output_dir.to_path_buf();
            let summary = simulate(&config, &counter_path)?;
            println!("{}", summary.csv_row());
            if !summary.counter_matches() {
                eprintln!(
                    "# violation,counter,{},{}",
                    summary.final_counter, summary.expected_counter
                );
            }
            if !summary.unique_ids {
                eprintln!("# violation,result_ids");
            }
        }
    }
    Ok(())
}
