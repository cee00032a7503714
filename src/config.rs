//! Run parameters: task-count exponent, worker count, write percentage.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Largest accepted exponent; 10^9 tasks still fit 32-bit ids.
pub const MAX_EXPONENT: u32 = 9;

/// Parameters of one simulation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// `N`: the run processes `10^N` tasks.
    pub exponent: u32,
    /// `T`: worker thread count.
    pub workers: usize,
    /// `E`: share of write tasks, in percent.
    pub write_percent: u32,
    /// Fixed RNG seed for reproducible workloads.
    pub seed: Option<u64>,
    /// Directory receiving the counter file and the timing report.
    pub output_dir: PathBuf,
}

impl RunConfig {
    pub fn new(exponent: u32, workers: usize, write_percent: u32) -> Self {
        Self {
            exponent,
            workers,
            write_percent,
            seed: None,
            output_dir: PathBuf::from("."),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exponent > MAX_EXPONENT {
            return Err(ConfigError::ExponentTooLarge {
                value: self.exponent,
                max: MAX_EXPONENT,
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.write_percent > 100 {
            return Err(ConfigError::WritePercent(self.write_percent));
        }
        Ok(())
    }

    pub fn total_tasks(&self) -> usize {
        10usize.pow(self.exponent)
    }

    /// `total * E / 100`, rounded down.
    pub fn write_tasks(&self) -> usize {
        (self.total_tasks() as u64 * u64::from(self.write_percent) / 100) as usize
    }

    /// Parse `<N> <T> <E> [--seed S] [--out DIR]`.
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut positional = Vec::new();
        let mut seed = None;
        let mut output_dir = None;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--seed" => seed = Some(parse_flag_value(&mut args, "seed")?),
                "--out" => output_dir = Some(PathBuf::from(flag_value(&mut args, "out")?)),
                _ if positional.len() < 3 => positional.push(arg),
                _ => return Err(ConfigError::Unexpected(arg)),
            }
        }
        if positional.len() < 3 {
            return Err(ConfigError::Invalid {
                name: "N T E",
                value: positional.join(" "),
            });
        }

        let mut config = Self::new(
            parse_value(&positional[0], "N")?,
            parse_value(&positional[1], "T")?,
            parse_value(&positional[2], "E")?,
        );
        config.seed = seed;
        if let Some(dir) = output_dir {
            config.output_dir = dir;
        }
        config.validate()?;
        Ok(config)
    }

    /// Ask for `N`, `T`, and `E` interactively.
    pub fn prompt<R: BufRead, W: Write>(
        input: &mut R,
        output: &mut W,
    ) -> Result<Self, ConfigError> {
        let exponent = prompt_value(input, output, "N")?;
        let workers = prompt_value(input, output, "T")?;
        let write_percent = prompt_value(input, output, "E")?;
        let config = Self::new(exponent, workers, write_percent);
        config.validate()?;
        Ok(config)
    }
}

pub fn parse_value<T: std::str::FromStr>(raw: &str, name: &'static str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}

pub fn flag_value<I>(args: &mut I, name: &'static str) -> Result<String, ConfigError>
where
    I: Iterator<Item = String>,
{
    args.next().ok_or(ConfigError::Invalid {
        name,
        value: String::new(),
    })
}

pub fn parse_flag_value<I, T>(args: &mut I, name: &'static str) -> Result<T, ConfigError>
where
    I: Iterator<Item = String>,
    T: std::str::FromStr,
{
    parse_value(&flag_value(args, name)?, name)
}

fn prompt_value<R: BufRead, W: Write, T: std::str::FromStr>(
    input: &mut R,
    output: &mut W,
    name: &'static str,
) -> Result<T, ConfigError> {
    let invalid = |value: String| ConfigError::Invalid { name, value };
    write!(output, "Enter {name}: ")
        .and_then(|_| output.flush())
        .map_err(|err| invalid(err.to_string()))?;
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => Err(invalid("<eof>".to_string())),
        Ok(_) => parse_value(&line, name),
        Err(err) => Err(invalid(err.to_string())),
    }
}

/// Prompt on the process's stdin/stdout.
pub fn prompt_stdin() -> Result<RunConfig, ConfigError> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    RunConfig::prompt(&mut input, &mut output)
}
