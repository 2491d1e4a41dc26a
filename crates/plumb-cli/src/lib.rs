//! plumb-cli: thin front end over plumb-kernel.
//!
//! Tokenizing here is deliberately naive: a command line is split on
//! whitespace and the pipe delimiter must stand alone as its own token.
//! Quoting, redirection, and expansion belong to a real shell front end,
//! which this runner is not.

use plumb_kernel::PipelineResult;

/// Split a command line into tokens for the pipeline executor.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Tokenize and run one pipeline line.
pub fn run_line(line: &str) -> PipelineResult<()> {
    plumb_kernel::run_pipeline(&tokenize(line))
}
