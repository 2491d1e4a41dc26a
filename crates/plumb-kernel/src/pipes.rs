//! Pipe fabric: inter-stage channel allocation.
//!
//! Descriptor ownership is explicit at the type level. A `PipeChannel`
//! holds both ends as `OwnedFd`, and closing is a consuming operation that
//! surfaces the error `Drop` would swallow. The fork-inherited copies held
//! by children are accounted for separately, in the orchestrator's
//! per-child close set.

use std::os::fd::{IntoRawFd, OwnedFd};

use nix::errno::Errno;
use nix::unistd;

use crate::error::{PipelineError, PipelineResult};

/// One inter-stage link: a unidirectional byte stream with an owned read
/// end and an owned write end.
#[derive(Debug)]
pub struct PipeChannel {
    read: OwnedFd,
    write: OwnedFd,
}

impl PipeChannel {
    /// Allocate a fresh channel.
    pub fn new() -> PipelineResult<Self> {
        let (read, write) = unistd::pipe().map_err(PipelineError::PipeCreate)?;
        Ok(Self { read, write })
    }

    /// Split the channel into its ends, transferring ownership to the
    /// caller.
    pub fn into_ends(self) -> (OwnedFd, OwnedFd) {
        (self.read, self.write)
    }

    /// Close both ends. Both closes are attempted even if the first fails;
    /// the first error wins.
    pub fn close(self) -> Result<(), Errno> {
        let (read, write) = self.into_ends();
        let first = close_fd(read);
        let second = close_fd(write);
        first.and(second)
    }
}

/// Explicitly consume and close a descriptor.
pub fn close_fd(fd: OwnedFd) -> Result<(), Errno> {
    unistd::close(fd.into_raw_fd())
}

/// Allocate `count` channels for a pipeline with `count + 1` stages.
///
/// On partial failure every channel created so far closes on drop before
/// the error propagates, so the failure path leaks no descriptors.
pub fn create_channels(count: usize) -> PipelineResult<Vec<PipeChannel>> {
    let mut channels = Vec::with_capacity(count);
    for _ in 0..count {
        channels.push(PipeChannel::new()?);
    }
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_requested_channel_count() {
        let channels = create_channels(3).unwrap();
        assert_eq!(channels.len(), 3);
        for channel in channels {
            channel.close().unwrap();
        }
    }

    #[test]
    fn zero_channels_is_fine() {
        assert!(create_channels(0).unwrap().is_empty());
    }

    #[test]
    fn close_consumes_both_ends() {
        let channel = PipeChannel::new().unwrap();
        channel.close().unwrap();
    }
}
