//! Error types for pipeline execution.
//!
//! The taxonomy follows the phases of a pipeline run: resource creation
//! (pipe, fork), descriptor bookkeeping (redirect, close), command start
//! (exec), and reaping (wait). Children report failure only through their
//! exit status; these errors are what the parent-side aggregator produces.

use nix::errno::Errno;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline execution errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The token sequence was empty.
    #[error("empty pipeline")]
    EmptyPipeline,

    /// A leading, trailing, or doubled delimiter left a stage with no
    /// command tokens.
    #[error("empty command at stage {stage}")]
    EmptyStage { stage: usize },

    /// A stage binding referenced a channel outside the fabric. This is a
    /// contract violation, not a runtime condition.
    #[error("stage {stage} bound to channel {channel}, but only {channel_count} exist")]
    BadBinding {
        stage: usize,
        channel: usize,
        channel_count: usize,
    },

    /// A command token contained an interior NUL and cannot become an argv
    /// entry.
    #[error("token contains a NUL byte: {0:?}")]
    BadToken(String),

    #[error("pipe creation failed: {0}")]
    PipeCreate(#[source] Errno),

    #[error("fork failed: {0}")]
    Fork(#[source] Errno),

    #[error("stdio redirect failed: {0}")]
    Redirect(#[source] Errno),

    #[error("channel close failed: {0}")]
    CloseChannel(#[source] Errno),

    /// The exec primitive returned, meaning the target program never
    /// started.
    #[error("failed to start {command}: {source}")]
    Exec {
        command: String,
        #[source]
        source: Errno,
    },

    #[error("wait failed: {0}")]
    Wait(#[source] Errno),

    /// A stage ran but exited non-zero.
    #[error("stage {stage} exited with status {status}")]
    StageFailed { stage: usize, status: i32 },

    /// A stage was killed by a signal (typically SIGPIPE when an adjacent
    /// stage exited early).
    #[error("stage {stage} terminated by signal {signal}")]
    StageSignaled { stage: usize, signal: i32 },

    /// A census worker exited non-zero; its file was not counted.
    #[error("census worker for {file} failed")]
    WorkerFailed { file: String },

    /// Writing a census record did not transfer the whole record.
    #[error("census record write failed: {0}")]
    RecordWrite(#[source] Errno),

    /// The aggregation channel delivered a byte count that is not a whole
    /// number of records.
    #[error("truncated census record: {len} trailing bytes")]
    ShortRecord { len: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
