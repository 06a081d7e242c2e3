//! Integration tests for the wordstats pipeline and CLI.
//!
//! Run with: `cargo test --test integration`

mod cli;
mod pipeline;

use std::io::Write;
use std::path::{Path, PathBuf};

use uring_wordstats::{Error, IoContext, IoContextConfig};

/// True if this kernel lets us build a ring; prints why not otherwise.
pub fn uring_available() -> bool {
    match IoContext::new(IoContextConfig::default()) {
        Ok(_) => true,
        Err(Error::ContextInit(err)) => {
            eprintln!("skipping: io_uring unavailable: {err}");
            false
        }
        Err(err) => panic!("unexpected error: {err}"),
    }
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).expect("create fixture");
    f.write_all(bytes).expect("write fixture");
    path
}
