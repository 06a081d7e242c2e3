//! Command-line surface for the `wordstats` binary.
//!
//! Results go to stdout, one line per input file in input order. Logs go to
//! stderr.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use tracing::Level;
use tracing_subscriber::fmt;

use crate::config::{IoContextConfig, RunConfig, WorkerPoolConfig, DEFAULT_RING_ENTRIES};
use crate::coordinator::Runtime;
use crate::stats::WordStats;

/// Average line length per file, read through io_uring.
///
/// Every file is read concurrently on a worker pool; one line is printed per
/// file in the order given.
#[derive(Parser, Debug)]
#[command(name = "wordstats", version, about, long_about = None)]
pub struct Cli {
    /// Files to read
    #[arg(required = true, value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Number of worker threads (must be >= 1)
    #[arg(short = 'w', long, default_value_t = num_cpus::get().max(1), value_parser = parse_positive_usize)]
    pub workers: usize,

    /// io_uring submission queue entries (power of two)
    #[arg(long, default_value_t = DEFAULT_RING_ENTRIES)]
    pub ring_entries: u32,

    /// Report every file, printing per-file errors instead of stopping at the first
    #[arg(long)]
    pub keep_going: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "warn", env = "WORDSTATS_LOG")]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            io: IoContextConfig {
                ring_entries: self.ring_entries,
            },
            pool: WorkerPoolConfig {
                workers: self.workers,
                ..WorkerPoolConfig::default()
            },
            ..RunConfig::default()
        }
    }
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

fn parse_positive_usize(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value < 1 {
        return Err(format!("{value} is not in 1.."));
    }
    Ok(value)
}

/// Installs the global fmt subscriber, writing to stderr.
pub fn init_logging(level: LogLevel) -> anyhow::Result<()> {
    let level: Level = level.into();
    fmt::Subscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))
}

/// Significant digits of [`format_general`].
const GENERAL_PRECISION: i32 = 6;

/// Shortest-form rendering of `v` with six significant digits.
///
/// Fixed notation when the decimal exponent is in `-4..6`, scientific
/// (`1.23457e+06`) otherwise; trailing zeros and a bare decimal point are
/// dropped in both.
pub fn format_general(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // The exponent after rounding to the target precision picks the style.
    let sci = format!("{:.*e}", (GENERAL_PRECISION - 1) as usize, v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= GENERAL_PRECISION {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    } else {
        let decimals = (GENERAL_PRECISION - 1 - exp) as usize;
        trim_fraction(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Text printed for a file's mean line length.
pub fn format_mean(stats: &WordStats) -> String {
    match stats.mean_line_length() {
        Some(mean) => format_general(mean),
        None => "n/a (no newlines)".to_string(),
    }
}

/// One result line for `path`.
pub fn format_report_line(path: &Path, stats: &WordStats) -> String {
    format!(
        "Average word length in {} is {}",
        path.display(),
        format_mean(stats)
    )
}

/// Runs the CLI against parsed arguments.
///
/// Fail-fast runs propagate the first error. Keep-going runs print every
/// failure to stderr and report them through the exit code.
pub fn execute(cli: &Cli) -> anyhow::Result<ExitCode> {
    let runtime = Runtime::new(cli.run_config()).context("failed to start runtime")?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let code = if cli.keep_going {
        let reports = runtime.run_settled(&cli.files)?;
        let mut failed = 0usize;
        for report in &reports {
            match &report.result {
                Ok(stats) => writeln!(out, "{}", format_report_line(&report.path, stats))?,
                Err(err) => {
                    failed += 1;
                    eprintln!("Error: {err}");
                }
            }
        }
        if failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    } else {
        let stats = runtime.run(&cli.files)?;
        for (path, s) in cli.files.iter().zip(&stats) {
            writeln!(out, "{}", format_report_line(path, s))?;
        }
        ExitCode::SUCCESS
    };

    out.flush()?;
    runtime.shutdown();
    Ok(code)
}
