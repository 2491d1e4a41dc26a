//! Pipeline orchestration: split, wire, spawn, close, reap.
//!
//! The orchestrator drives the splitter and the pipe fabric, forks one
//! child per stage, and is the single aggregator of outcomes. Children
//! report back only through exit status; there is no other inter-stage
//! synchronization. Stages run concurrently and are paced purely by pipe
//! back-pressure.
//!
//! Descriptor bookkeeping is the whole game:
//!
//! - each child closes every channel end except the at-most-two it owns,
//!   before exec;
//! - the parent closes all ends exactly once, after the last fork, since it
//!   never reads or writes pipeline data itself;
//! - reaping is best effort and exhaustive, so no path leaves zombies.

use std::mem;

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::exec;
use crate::pipes::{self, PipeChannel};
use crate::splitter;
use crate::stage::{self, StageBinding};

/// The reserved token separating pipeline stages.
pub const PIPE_DELIMITER: &str = "|";

/// Execute a token sequence as a pipeline.
///
/// Success means every stage exited 0 and every pipe, fork, dup, close,
/// and wait call succeeded. Diagnostics go to the tracing/stderr channel;
/// the return value only classifies the run for the caller.
#[tracing::instrument(level = "debug", skip(tokens), fields(token_count = tokens.len()))]
pub fn run_pipeline(tokens: &[String]) -> PipelineResult<()> {
    let stages = splitter::split_stages(tokens, PIPE_DELIMITER)?;
    if stages.len() == 1 {
        debug!("single stage, skipping channel setup");
        return run_single(&stages[0]);
    }

    let stage_count = stages.len();
    let channel_count = stage_count - 1;
    let mut channels = pipes::create_channels(channel_count)?;
    debug!(stage_count, channel_count, "channels created");

    let mut children: Vec<Pid> = Vec::with_capacity(stage_count);
    for (index, stage_tokens) in stages.iter().enumerate() {
        let binding = StageBinding::for_stage(index, stage_count, channel_count)?;
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                // Post-fork child: close, dup2, exec, _exit. Nothing else.
                let err = run_stage_child(stage_tokens, mem::take(&mut channels), binding);
                exec::exit_with(err);
            }
            Ok(ForkResult::Parent { child }) => {
                debug!(stage = index, pid = child.as_raw(), "stage spawned");
                children.push(child);
            }
            Err(errno) => {
                warn!(stage = index, %errno, "fork failed, aborting pipeline");
                // No further spawns. Release every channel end so the
                // already-running stages see EOF, then reap them all.
                let _ = close_channels(channels);
                let _ = reap_children(&children);
                return Err(PipelineError::Fork(errno));
            }
        }
    }

    // The parent holds no pipeline role; every end must go before reaping
    // or a reader never observes EOF.
    let closed = close_channels(channels);
    let reaped = reap_children(&children);
    closed?;
    reaped
}

/// Zero-pipe fast path: one command, no channels.
fn run_single(tokens: &[String]) -> PipelineResult<()> {
    match unsafe { unistd::fork() }.map_err(PipelineError::Fork)? {
        ForkResult::Child => exec::exit_with(exec::exec_command(tokens)),
        ForkResult::Parent { child } => {
            debug!(pid = child.as_raw(), "fast path spawned");
            let status = waitpid(child, None).map_err(PipelineError::Wait)?;
            stage_outcome(0, status)
        }
    }
}

/// Child-side setup for one stage: dispose of the close set, then hand the
/// owned ends to the launcher. Returns only on failure.
fn run_stage_child(
    tokens: &[String],
    channels: Vec<PipeChannel>,
    binding: StageBinding,
) -> PipelineError {
    let (input, output, unused) = binding.partition(channels);

    let mut close_failure = None;
    for fd in unused {
        if let Err(errno) = pipes::close_fd(fd) {
            close_failure = Some(errno);
        }
    }
    if let Some(errno) = close_failure {
        // The descriptor set is corrupted; do not exec on top of it. The
        // owned ends go too, so no write end outlives this child.
        if let Some(fd) = input {
            let _ = pipes::close_fd(fd);
        }
        if let Some(fd) = output {
            let _ = pipes::close_fd(fd);
        }
        return PipelineError::CloseChannel(errno);
    }

    stage::launch(tokens, input, output)
}

/// Close every channel in the parent, attempting all of them; the first
/// failure is reported after the rest have been tried.
fn close_channels(channels: Vec<PipeChannel>) -> PipelineResult<()> {
    let mut first_failure = None;
    for channel in channels {
        if let Err(errno) = channel.close() {
            warn!(%errno, "parent failed to close a channel");
            first_failure.get_or_insert(errno);
        }
    }
    match first_failure {
        None => Ok(()),
        Some(errno) => Err(PipelineError::CloseChannel(errno)),
    }
}

/// Wait for every spawned child exactly once, in spawn order.
///
/// A wait failure is reported but never stops the remaining reaps; leaving
/// zombies is worse than an imprecise outcome. The first failure of any
/// kind becomes the aggregate result.
fn reap_children(children: &[Pid]) -> PipelineResult<()> {
    let mut outcome = Ok(());
    for (stage, &pid) in children.iter().enumerate() {
        match waitpid(pid, None) {
            Ok(status) => {
                debug!(stage, pid = pid.as_raw(), ?status, "stage reaped");
                if let Err(err) = stage_outcome(stage, status) {
                    warn!(stage, %err, "stage failed");
                    if outcome.is_ok() {
                        outcome = Err(err);
                    }
                }
            }
            Err(errno) => {
                warn!(stage, pid = pid.as_raw(), %errno, "waitpid failed");
                if outcome.is_ok() {
                    outcome = Err(PipelineError::Wait(errno));
                }
            }
        }
    }
    outcome
}

/// Translate a wait status into the stage's outcome.
fn stage_outcome(stage: usize, status: WaitStatus) -> PipelineResult<()> {
    match status {
        WaitStatus::Exited(_, 0) => Ok(()),
        WaitStatus::Exited(_, code) => Err(PipelineError::StageFailed {
            stage,
            status: code,
        }),
        WaitStatus::Signaled(_, signal, _) => Err(PipelineError::StageSignaled {
            stage,
            signal: signal as i32,
        }),
        // Stopped/continued states cannot occur without WUNTRACED, but the
        // match must be total.
        _ => Err(PipelineError::StageFailed { stage, status: -1 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    // Fork-heavy paths are covered end to end in the CLI integration
    // tests, where the pipeline runs in its own single-threaded process.
    // Here we only exercise the paths that reject input before any fork.

    #[test]
    fn empty_tokens_are_rejected_before_any_fork() {
        let err = run_pipeline(&[]).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyPipeline));
    }

    #[test]
    fn trailing_delimiter_is_rejected_before_any_fork() {
        let err = run_pipeline(&toks(&["ls", "|"])).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyStage { stage: 1 }));
    }

    #[test]
    fn adjacent_delimiters_are_rejected_before_any_fork() {
        let err = run_pipeline(&toks(&["ls", "|", "|", "wc"])).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyStage { stage: 1 }));
    }
}
