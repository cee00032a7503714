mod completion;
mod config;
mod error;
mod executor;
mod logging;
mod shared_resource;
mod sim;
mod task_queue;
mod task_store;
mod types;
mod worker;

use std::path::PathBuf;

use config::RunConfig;
use error::ConfigError;

const DEFAULT_STRESS_EXPONENT: u32 = 2;
const DEFAULT_WORKER_SETS: [usize; 4] = [1, 2, 4, 8];
const DEFAULT_WRITE_SETS: [u32; 4] = [0, 10, 50, 90];

fn parse_list<T: std::str::FromStr>(
    arg: &str,
    name: &'static str,
) -> Result<Vec<T>, ConfigError> {
    let mut values = Vec::new();
    for part in arg.split(',') {
        if part.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name,
                value: arg.to_string(),
            });
        }
        values.push(config::parse_value(part, name)?);
    }
    Ok(values)
}

fn print_usage(program: &str) {
    println!("Readers-writers workload simulator");
    println!("Usage:");
    println!("  {program} (prompt for N, T, E)");
    println!("  {program} run <N> <T> <E> [--seed S] [--out DIR]");
    println!("  {program} stress [N] [worker_sets] [write_pct_sets] [--seed S] [--out DIR]");
    println!("  {program} --help");
    println!();
    println!("  N  run 10^N tasks (0..={})", config::MAX_EXPONENT);
    println!("  T  worker threads (> 0)");
    println!("  E  percentage of write tasks (0..=100)");
    println!();
    println!("Sets are comma-separated lists (e.g., 1,2,4). Use \"-\" to keep a default.");
    println!("Defaults:");
    println!("  stress N=2 worker_sets=1,2,4,8 write_pct_sets=0,10,50,90");
    println!("Files are written to DIR (default .): shared_file.txt and n<N>_t<T>_e<E>.txt");
    println!("Set RUST_LOG to change log verbosity.");
}

fn exit_with_usage(program: &str, message: &str) -> ! {
    eprintln!("{message}");
    print_usage(program);
    std::process::exit(2);
}

struct StressArgs {
    exponent: u32,
    worker_sets: Vec<usize>,
    write_sets: Vec<u32>,
    seed: Option<u64>,
    output_dir: PathBuf,
}

fn parse_stress_args<I>(args: I) -> Result<StressArgs, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = StressArgs {
        exponent: DEFAULT_STRESS_EXPONENT,
        worker_sets: DEFAULT_WORKER_SETS.to_vec(),
        write_sets: DEFAULT_WRITE_SETS.to_vec(),
        seed: None,
        output_dir: PathBuf::from("."),
    };
    let mut position = 0;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seed" => {
                parsed.seed = Some(config::parse_flag_value(&mut args, "seed")?);
                continue;
            }
            "--out" => {
                parsed.output_dir = PathBuf::from(config::flag_value(&mut args, "out")?);
                continue;
            }
            _ => {}
        }

        if arg != "-" {
            match position {
                0 => parsed.exponent = config::parse_value(&arg, "N")?,
                1 => parsed.worker_sets = parse_list(&arg, "worker_sets")?,
                2 => parsed.write_sets = parse_list(&arg, "write_pct_sets")?,
                _ => return Err(ConfigError::Unexpected(arg)),
            }
        } else if position > 2 {
            return Err(ConfigError::Unexpected(arg));
        }
        position += 1;
    }

    // Validate every combination up front so a sweep never fails halfway.
    for &workers in &parsed.worker_sets {
        for &write_percent in &parsed.write_sets {
            RunConfig::new(parsed.exponent, workers, write_percent).validate()?;
        }
    }
    Ok(parsed)
}

fn main() {
    logging::init();
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "readers_writers".to_string());
    let mut args = std::env::args().skip(1);

    let outcome = match args.next().as_deref() {
        Some("run") => {
            let config = RunConfig::from_args(args)
                .unwrap_or_else(|err| exit_with_usage(&program, &format!("run: {err}")));
            sim::run_once(&config).map(|_| ())
        }
        Some("stress") => {
            let stress = parse_stress_args(args)
                .unwrap_or_else(|err| exit_with_usage(&program, &format!("stress: {err}")));
            sim::run_stress(
                stress.exponent,
                &stress.worker_sets,
                &stress.write_sets,
                stress.seed,
                &stress.output_dir,
            )
        }
        Some("--help") | Some("-h") | Some("help") => {
            print_usage(&program);
            Ok(())
        }
        Some(other) => exit_with_usage(&program, &format!("unknown command: {other}")),
        None => {
            let config = config::prompt_stdin()
                .unwrap_or_else(|err| exit_with_usage(&program, &format!("input: {err}")));
            sim::run_once(&config).map(|_| ())
        }
    };

    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
