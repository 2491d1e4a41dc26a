//! Parallel letter census: the degenerate one-channel variant of the
//! pipeline primitive.
//!
//! One worker process per input file counts letter occurrences and writes
//! a single fixed-size record into a shared pipe; the parent reads records
//! until EOF and sums them position-wise. Same descriptor discipline as
//! the pipeline: workers close the read end they inherited, the parent
//! closes its write end before reading so EOF can arrive.

use std::fs::File;
use std::io::Read;
use std::mem::size_of;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::exec;
use crate::pipes::{self, PipeChannel};

/// Number of counted letters.
pub const ALPHABET_LEN: usize = 26;

/// Size of one worker record on the wire: 26 native-endian u64 slots.
/// At 208 bytes this is well under PIPE_BUF, so a single write is atomic.
pub const RECORD_LEN: usize = ALPHABET_LEN * size_of::<u64>();

/// Per-letter occurrence counts, case-insensitive over ASCII letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LetterCounts([u64; ALPHABET_LEN]);

impl LetterCounts {
    pub fn new() -> Self {
        Self([0; ALPHABET_LEN])
    }

    /// Count `byte` if it is an ASCII letter; anything else is ignored.
    pub fn record(&mut self, byte: u8) {
        if byte.is_ascii_alphabetic() {
            // The alphabetic guard keeps the subtraction in range.
            self.0[(byte.to_ascii_lowercase() - b'a') as usize] += 1;
        }
    }

    /// Count for one letter, case-insensitive. `None` for non-letters.
    pub fn get(&self, letter: char) -> Option<u64> {
        letter
            .is_ascii_alphabetic()
            .then(|| self.0[(letter.to_ascii_lowercase() as u8 - b'a') as usize])
    }

    /// Add another set of counts position-wise.
    pub fn merge(&mut self, other: &LetterCounts) {
        for (total, count) in self.0.iter_mut().zip(other.0) {
            *total += count;
        }
    }

    /// Encode as one wire record.
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut bytes = [0u8; RECORD_LEN];
        for (slot, count) in bytes.chunks_exact_mut(size_of::<u64>()).zip(self.0) {
            slot.copy_from_slice(&count.to_ne_bytes());
        }
        bytes
    }

    /// Decode one wire record.
    pub fn from_bytes(bytes: &[u8]) -> PipelineResult<Self> {
        if bytes.len() != RECORD_LEN {
            return Err(PipelineError::ShortRecord { len: bytes.len() });
        }
        let mut counts = [0u64; ALPHABET_LEN];
        for (count, slot) in counts.iter_mut().zip(bytes.chunks_exact(size_of::<u64>())) {
            let mut raw = [0u8; size_of::<u64>()];
            raw.copy_from_slice(slot);
            *count = u64::from_ne_bytes(raw);
        }
        Ok(Self(counts))
    }

    /// Iterate `('a'..='z')` with each letter's count.
    pub fn iter(&self) -> impl Iterator<Item = (char, u64)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(index, &count)| ((b'a' + index as u8) as char, count))
    }
}

/// Count letter occurrences in one file, case-insensitive.
pub fn count_letters(path: &Path) -> PipelineResult<LetterCounts> {
    let mut counts = LetterCounts::new();
    let mut file = File::open(path)?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &byte in &buf[..n] {
            counts.record(byte);
        }
    }
    Ok(counts)
}

/// Fan out one worker per file and aggregate their counts.
///
/// An empty file list short-circuits to all-zero counts with no pipe
/// created. Workers are always reaped exhaustively; the first worker
/// failure becomes the aggregate outcome.
#[tracing::instrument(level = "debug", skip(files), fields(file_count = files.len()))]
pub fn run_census(files: &[PathBuf]) -> PipelineResult<LetterCounts> {
    if files.is_empty() {
        return Ok(LetterCounts::new());
    }

    let (read_end, write_end) = PipeChannel::new()?.into_ends();

    let mut workers: Vec<Pid> = Vec::with_capacity(files.len());
    for file in files {
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                // The child exits via _exit, so the OwnedFd wrappers never
                // drop; both ends are closed by raw fd inside the worker.
                match census_worker(file, read_end.as_raw_fd(), &write_end) {
                    Ok(()) => unsafe { libc::_exit(0) },
                    Err(err) => exec::exit_with(err),
                }
            }
            Ok(ForkResult::Parent { child }) => {
                debug!(file = %file.display(), pid = child.as_raw(), "worker spawned");
                workers.push(child);
            }
            Err(errno) => {
                warn!(%errno, "fork failed, aborting census");
                let _ = pipes::close_fd(read_end);
                let _ = pipes::close_fd(write_end);
                let _ = reap_workers(&workers, files);
                return Err(PipelineError::Fork(errno));
            }
        }
    }

    // The parent never writes; its write end must go before the read loop
    // or EOF never arrives.
    if let Err(errno) = pipes::close_fd(write_end) {
        let _ = pipes::close_fd(read_end);
        let _ = reap_workers(&workers, files);
        return Err(PipelineError::CloseChannel(errno));
    }

    // Read to EOF before reaping: workers blocked on a full pipe buffer
    // can only finish once the parent drains the channel.
    let totals = read_records(read_end);
    let reaped = reap_workers(&workers, files);
    let totals = totals?;
    reaped?;
    Ok(totals)
}

/// Worker body: disown the read end, count the file, report one record.
fn census_worker(path: &Path, inherited_read: RawFd, out: &OwnedFd) -> PipelineResult<()> {
    unistd::close(inherited_read).map_err(PipelineError::CloseChannel)?;

    let counts = count_letters(path)?;
    let record = counts.to_bytes();
    let written = unistd::write(out, &record).map_err(PipelineError::RecordWrite)?;
    if written != RECORD_LEN {
        return Err(PipelineError::ShortRecord { len: written });
    }

    unistd::close(out.as_raw_fd()).map_err(PipelineError::CloseChannel)?;
    Ok(())
}

/// Drain the aggregation channel and sum every record.
fn read_records(read_end: OwnedFd) -> PipelineResult<LetterCounts> {
    let mut reader = File::from(read_end);
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;

    if raw.len() % RECORD_LEN != 0 {
        return Err(PipelineError::ShortRecord {
            len: raw.len() % RECORD_LEN,
        });
    }

    let mut totals = LetterCounts::new();
    for chunk in raw.chunks_exact(RECORD_LEN) {
        totals.merge(&LetterCounts::from_bytes(chunk)?);
    }
    Ok(totals)
}

/// Wait for every worker exactly once, best effort.
fn reap_workers(workers: &[Pid], files: &[PathBuf]) -> PipelineResult<()> {
    let mut outcome = Ok(());
    for (index, &pid) in workers.iter().enumerate() {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, 0)) => {}
            Ok(status) => {
                warn!(file = %files[index].display(), ?status, "worker failed");
                if outcome.is_ok() {
                    outcome = Err(PipelineError::WorkerFailed {
                        file: files[index].display().to_string(),
                    });
                }
            }
            Err(errno) => {
                warn!(pid = pid.as_raw(), %errno, "waitpid failed");
                if outcome.is_ok() {
                    outcome = Err(PipelineError::Wait(errno));
                }
            }
        }
    }
    outcome
}
