//! plumb-kernel: the core of plumb.
//!
//! This crate provides:
//!
//! - **Splitter**: partitions a token sequence into per-stage command groups
//! - **Pipes**: channel allocation with explicit descriptor ownership
//! - **Stage**: stdio binding computation and the post-fork stage launcher
//! - **Exec**: the execvp primitive that replaces the process image
//! - **Pipeline**: the orchestrator that spawns, closes, and reaps
//! - **Census**: the fan-out letter-counting variant over one shared pipe
//!
//! The single correctness invariant that runs through everything here is
//! descriptor discipline: every process closes every pipe end it does not
//! own, as early as possible. A lingering write end held by a non-owner
//! keeps a downstream reader from ever seeing EOF.

pub mod census;
pub mod error;
pub mod exec;
pub mod pipeline;
pub mod pipes;
pub mod splitter;
pub mod stage;

pub use census::{count_letters, run_census, LetterCounts, ALPHABET_LEN};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{run_pipeline, PIPE_DELIMITER};
pub use stage::StageBinding;
