//! Fork-failure recovery under process exhaustion.
//!
//! The scenario runs in a dedicated child process so the rlimit and uid
//! changes never leak into the test harness. The child clamps
//! RLIMIT_NPROC, sheds root if it has it (the limit does not bind
//! privileged processes), runs a multi-stage pipeline, and reports what
//! it observed via its exit status.

use nix::errno::Errno;
use nix::sys::resource::{getrlimit, setrlimit, Resource};
use nix::sys::wait::{self, waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Uid};

use plumb_kernel::{run_pipeline, PipelineError};

const OUTCOME_OK: i32 = 0;
const OUTCOME_RLIMIT_FAILED: i32 = 10;
const OUTCOME_SETUID_FAILED: i32 = 11;
const OUTCOME_PIPELINE_RAN: i32 = 12;
const OUTCOME_WRONG_ERROR: i32 = 13;
const OUTCOME_UNREAPED_CHILD: i32 = 14;

const NOBODY: u32 = 65534;

fn toks(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// With RLIMIT_NPROC clamped, a three-stage pipeline cannot finish
/// spawning: fork fails either immediately or partway through. Whatever
/// stages were spawned before the failure must already be reaped by the
/// time `run_pipeline` returns, so a subsequent wait sees no children at
/// all.
fn exhausted_fork_outcome() -> i32 {
    let Ok((_, hard)) = getrlimit(Resource::RLIMIT_NPROC) else {
        return OUTCOME_RLIMIT_FAILED;
    };
    // At most one more process for this uid.
    if setrlimit(Resource::RLIMIT_NPROC, 2, hard).is_err() {
        return OUTCOME_RLIMIT_FAILED;
    }
    if Uid::effective().is_root() && unistd::setuid(Uid::from_raw(NOBODY)).is_err() {
        return OUTCOME_SETUID_FAILED;
    }

    match run_pipeline(&toks(&["seq", "1", "5", "|", "cat", "|", "wc", "-l"])) {
        Ok(()) => OUTCOME_PIPELINE_RAN,
        Err(PipelineError::Fork(_)) => match wait::wait() {
            Err(Errno::ECHILD) => OUTCOME_OK,
            _ => OUTCOME_UNREAPED_CHILD,
        },
        Err(_) => OUTCOME_WRONG_ERROR,
    }
}

#[test]
fn fork_failure_mid_pipeline_reaps_every_spawned_stage() {
    match unsafe { unistd::fork() }.expect("fork") {
        ForkResult::Child => unsafe { libc::_exit(exhausted_fork_outcome()) },
        ForkResult::Parent { child } => {
            let status = waitpid(child, None).expect("waitpid");
            assert_eq!(
                status,
                WaitStatus::Exited(child, OUTCOME_OK),
                "exhaustion scenario reported a failure code"
            );
        }
    }
}
