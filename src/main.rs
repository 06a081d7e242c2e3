//! wordstats CLI
//!
//! Prints the average line length of each input file, reading every file
//! concurrently through io_uring on a work-stealing worker pool.
//!
//! # Output Format
//!
//! One line per file on stdout, in input order:
//! `Average word length in <path> is <mean>`
//!
//! # Exit Codes
//!
//! - `0`: every file was read
//! - `1`: a file could not be opened or read, or the runtime failed to start
//! - `2`: invalid arguments

use std::process::ExitCode;

use clap::Parser;
use uring_wordstats::cli::{execute, init_logging, Cli};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;
    execute(&cli)
}
