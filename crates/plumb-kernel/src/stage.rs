//! Stage bindings and the post-fork stage launcher.
//!
//! A binding says where one stage's stdin and stdout come from: a specific
//! channel end, or the ambient descriptors inherited from the parent. The
//! launcher runs inside a freshly forked child, rebinds stdio, and hands
//! off to the exec primitive. It never closes descriptors it was not
//! handed; assembling the per-child close set is the orchestrator's job,
//! because only the orchestrator sees the full channel topology.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::unistd;

use crate::error::{PipelineError, PipelineResult};
use crate::exec;
use crate::pipes::{self, PipeChannel};

/// Input/output assignment for one stage. `None` means the stage inherits
/// the ambient descriptor; `Some(i)` binds to channel i's read end (input)
/// or write end (output).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBinding {
    input: Option<usize>,
    output: Option<usize>,
}

impl StageBinding {
    /// Compute the binding for `stage` of `stage_count` stages over
    /// `channel_count` channels.
    ///
    /// Invariant: stage 0 inherits stdin, the last stage inherits stdout,
    /// and every bound stage reads channel `stage - 1` and writes channel
    /// `stage`. A binding outside the fabric fails fast with
    /// [`PipelineError::BadBinding`].
    pub fn for_stage(
        stage: usize,
        stage_count: usize,
        channel_count: usize,
    ) -> PipelineResult<Self> {
        debug_assert!(stage < stage_count);
        let input = (stage > 0).then(|| stage - 1);
        let output = (stage + 1 < stage_count).then_some(stage);
        for &channel in input.iter().chain(output.iter()) {
            if channel >= channel_count {
                return Err(PipelineError::BadBinding {
                    stage,
                    channel,
                    channel_count,
                });
            }
        }
        Ok(Self { input, output })
    }

    /// Channel index feeding this stage's stdin, if any.
    pub fn input(&self) -> Option<usize> {
        self.input
    }

    /// Channel index receiving this stage's stdout, if any.
    pub fn output(&self) -> Option<usize> {
        self.output
    }

    /// Carve this stage's owned ends out of the channel set.
    ///
    /// Returns the input end, the output end, and every other descriptor —
    /// the close set this stage must dispose of before exec.
    pub fn partition(
        &self,
        channels: Vec<PipeChannel>,
    ) -> (Option<OwnedFd>, Option<OwnedFd>, Vec<OwnedFd>) {
        let mut input = None;
        let mut output = None;
        let mut unused = Vec::with_capacity(channels.len() * 2);
        for (index, channel) in channels.into_iter().enumerate() {
            let (read, write) = channel.into_ends();
            if self.input == Some(index) {
                input = Some(read);
            } else {
                unused.push(read);
            }
            if self.output == Some(index) {
                output = Some(write);
            } else {
                unused.push(write);
            }
        }
        (input, output, unused)
    }
}

/// Rebind stdio to the given channel ends and invoke the exec primitive.
///
/// Runs post-fork, pre-exec. Each step is a hard precondition for the
/// next: a failed redirect is fatal to the stage, and a return from the
/// exec primitive means the command never started. This function only ever
/// returns an error; on success the process image is gone.
pub fn launch(
    tokens: &[String],
    input: Option<OwnedFd>,
    output: Option<OwnedFd>,
) -> PipelineError {
    if let Some(fd) = input {
        if let Err(errno) = redirect(fd, libc::STDIN_FILENO) {
            return PipelineError::Redirect(errno);
        }
    }
    if let Some(fd) = output {
        if let Err(errno) = redirect(fd, libc::STDOUT_FILENO) {
            return PipelineError::Redirect(errno);
        }
    }
    exec::exec_command(tokens)
}

/// dup2 onto a standard descriptor, then close the original; the stage
/// only ever sees the rebound fd.
fn redirect(fd: OwnedFd, target: RawFd) -> Result<(), Errno> {
    unistd::dup2(fd.as_raw_fd(), target)?;
    pipes::close_fd(fd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipes::create_channels;
    use rstest::rstest;

    #[rstest]
    #[case(0, None, Some(0))]
    #[case(1, Some(0), Some(1))]
    #[case(2, Some(1), None)]
    fn bindings_follow_the_stage_invariant(
        #[case] stage: usize,
        #[case] input: Option<usize>,
        #[case] output: Option<usize>,
    ) {
        let binding = StageBinding::for_stage(stage, 3, 2).unwrap();
        assert_eq!(binding.input(), input);
        assert_eq!(binding.output(), output);
    }

    #[test]
    fn single_stage_inherits_both_ends() {
        let binding = StageBinding::for_stage(0, 1, 0).unwrap();
        assert_eq!(binding.input(), None);
        assert_eq!(binding.output(), None);
    }

    #[test]
    fn binding_outside_the_fabric_fails_fast() {
        let err = StageBinding::for_stage(2, 4, 1).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BadBinding {
                stage: 2,
                channel: 1,
                channel_count: 1,
            }
        ));
    }

    #[test]
    fn partition_keeps_owned_ends_and_returns_the_rest() {
        let channels = create_channels(2).unwrap();
        let binding = StageBinding::for_stage(1, 3, 2).unwrap();
        let (input, output, unused) = binding.partition(channels);
        assert!(input.is_some());
        assert!(output.is_some());
        // 2 channels = 4 descriptors, 2 owned by the middle stage.
        assert_eq!(unused.len(), 2);
    }

    #[test]
    fn partition_for_first_stage_disowns_all_but_one() {
        let channels = create_channels(3).unwrap();
        let binding = StageBinding::for_stage(0, 4, 3).unwrap();
        let (input, output, unused) = binding.partition(channels);
        assert!(input.is_none());
        assert!(output.is_some());
        assert_eq!(unused.len(), 5);
    }
}
