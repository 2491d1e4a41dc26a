//! The single-command execution primitive.
//!
//! `exec_command` replaces the current process image on success and
//! therefore never returns normally; getting control back is itself the
//! failure signal. The `Infallible` plumbing below makes "code after a
//! successful exec" unrepresentable.

use std::convert::Infallible;
use std::env;
use std::ffi::CString;
use std::path::Path;

use nix::unistd;

use crate::error::{PipelineError, PipelineResult};

/// Exit status for a stage that failed during setup or exec, distinguished
/// from whatever the target program itself would exit with.
pub const STAGE_FAILURE_STATUS: i32 = 1;

/// Execute `tokens` as a program with arguments, replacing the current
/// process image. Returns only on failure to start.
pub fn exec_command(tokens: &[String]) -> PipelineError {
    match try_exec(tokens) {
        Ok(never) => match never {},
        Err(err) => err,
    }
}

fn try_exec(tokens: &[String]) -> PipelineResult<Infallible> {
    let program = tokens.first().ok_or(PipelineError::EmptyPipeline)?;
    let argv = tokens
        .iter()
        .map(|token| {
            CString::new(token.as_str()).map_err(|_| PipelineError::BadToken(token.clone()))
        })
        .collect::<PipelineResult<Vec<CString>>>()?;

    let errno = match unistd::execvp(&argv[0], &argv) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    Err(PipelineError::Exec {
        command: program.clone(),
        source: errno,
    })
}

/// Report a failure and terminate a forked child with the distinguished
/// status. Diagnostics carry the running binary's own name, so a census
/// worker inside parcount does not report as plumb. `_exit` skips atexit
/// handlers and the buffered streams inherited from the parent.
pub(crate) fn exit_with(err: PipelineError) -> ! {
    eprintln!("{}: {err}", program_name());
    unsafe { libc::_exit(STAGE_FAILURE_STATUS) }
}

/// Basename of argv[0], falling back to the crate's public binary name.
fn program_name() -> String {
    env::args_os()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "plumb".to_string())
}
