//! plumb CLI entry point.
//!
//! Usage:
//!   plumb -c "<command line>"     # Run one pipeline from a single string
//!   plumb <token> [token...]      # Run one pipeline from argv tokens
//!   plumb --help | --version

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
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
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            print_usage();
            Ok(ExitCode::FAILURE)
        }

        Some("--help" | "-h") => {
            print_usage();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("plumb {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let line = args.get(2).context("-c requires a command line argument")?;
            Ok(report(plumb_cli::run_line(line)))
        }

        Some(_) => Ok(report(plumb_kernel::run_pipeline(&args[1..]))),
    }
}

fn report(result: plumb_kernel::PipelineResult<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("plumb: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  plumb -c \"<command line>\"   Run one pipeline from a single string");
    eprintln!("  plumb <token> [token...]     Run one pipeline from argv tokens");
    eprintln!();
    eprintln!("Stages are separated by a standalone '|' token. Tokens are split on");
    eprintln!("whitespace only; there is no quoting or redirection.");
}
