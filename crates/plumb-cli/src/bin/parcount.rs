//! parcount CLI entry point.
//!
//! Usage:
//!   parcount FILE [FILE...]   # Parallel per-letter census over files
//!
//! One worker process per file; results are aggregated over a single pipe
//! and printed as `<letter> Count: <n>` lines. With no files there is
//! nothing to count and nothing is printed.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let files: Vec<PathBuf> = env::args_os().skip(1).map(PathBuf::from).collect();
    if files.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    match plumb_kernel::run_census(&files) {
        Ok(totals) => {
            let mut stdout = io::stdout().lock();
            for (letter, count) in totals.iter() {
                writeln!(stdout, "{letter} Count: {count}")?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("parcount: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
