use crate::command::Command;
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::libc;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, dup2, execvp, fork};
use std::ffi::{CStr, CString};
use std::fmt;
use std::os::fd::RawFd;
use std::path::Path;
use tracing::debug;

/// Decoded termination status of a child process.
///
/// This is the value reported by the `status` builtin for foreground
/// commands and by the completion notices for reaped background jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited normally with the given code.
    Exited(i32),
    /// The process was terminated by the given signal number.
    Signaled(i32),
}

impl ExitOutcome {
    /// Decode a raw wait status. Returns `None` for statuses that do not
    /// represent termination (e.g. a stopped process).
    pub fn from_wait_status(status: &WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(ExitOutcome::Exited(*code)),
            WaitStatus::Signaled(_, sig, _) => Some(ExitOutcome::Signaled(*sig as i32)),
            _ => None,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exit value {}", code),
            ExitOutcome::Signaled(sig) => write!(f, "terminated by signal {}", sig),
        }
    }
}

/// Result of handing a [`Command`] to [`execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spawned {
    /// The child ran in the foreground and has already terminated.
    Foreground(ExitOutcome),
    /// The child is running in the background under the given pid.
    /// The caller is expected to register it with the job registry.
    Background(Pid),
}

/// Spawn `cmd` as a child process, honoring redirection and the
/// background marker.
///
/// `foreground_only` overrides `cmd.background` for this invocation only;
/// the stored flag is left untouched so each execution re-evaluates the
/// current mode.
///
/// Redirection files are opened in the parent before forking: an
/// unopenable file aborts the command without spawning anything. A
/// foreground child has its default interrupt disposition restored before
/// its image is replaced, so the interrupt key still reaches it even
/// though the interpreter itself ignores that signal. Exec failure (bad
/// or non-executable name) is fatal to the child only, which exits with
/// a distinct code the parent observes as a normal termination.
pub fn execute(cmd: &Command, foreground_only: bool) -> Result<Spawned> {
    let background = cmd.background && !foreground_only;

    // Converting the argument vector up front keeps every fallible
    // allocation on the parent side of the fork.
    let program = CString::new(cmd.name.as_str())
        .with_context(|| format!("{}: name contains a NUL byte", cmd.name))?;
    let args: Vec<CString> = cmd
        .args
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<Result<_, _>>()
        .with_context(|| format!("{}: argument contains a NUL byte", cmd.name))?;

    let (input, output) = open_redirects(cmd)?;

    debug!(name = %cmd.name, background, "spawning child");
    match unsafe { fork() } {
        Ok(ForkResult::Child) => run_child(&cmd.name, &program, &args, background, input, output),
        Ok(ForkResult::Parent { child }) => {
            close_both(input, output);
            if background {
                Ok(Spawned::Background(child))
            } else {
                Ok(Spawned::Foreground(wait_foreground(child)?))
            }
        }
        Err(err) => {
            close_both(input, output);
            Err(anyhow::Error::new(err).context("fork failed"))
        }
    }
}

/// Open the redirection targets named by `cmd`, if any.
///
/// The input file is opened read-only; the output file is created or
/// truncated with mode 0644. On failure every descriptor opened so far is
/// closed again and the error is returned, so no child is ever spawned
/// with a half-applied redirection.
fn open_redirects(cmd: &Command) -> Result<(Option<RawFd>, Option<RawFd>)> {
    let input = match &cmd.input_path {
        Some(path) => Some(
            open(Path::new(path), OFlag::O_RDONLY, Mode::empty())
                .with_context(|| format!("cannot open {} for input", path))?,
        ),
        None => None,
    };

    let output = match &cmd.output_path {
        Some(path) => {
            let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
            match open(Path::new(path), flags, Mode::from_bits_truncate(0o644)) {
                Ok(fd) => Some(fd),
                Err(err) => {
                    if let Some(fd) = input {
                        let _ = close(fd);
                    }
                    return Err(anyhow::Error::new(err)
                        .context(format!("cannot open {} for output", path)));
                }
            }
        }
        None => None,
    };

    Ok((input, output))
}

fn close_both(input: Option<RawFd>, output: Option<RawFd>) {
    if let Some(fd) = input {
        let _ = close(fd);
    }
    if let Some(fd) = output {
        let _ = close(fd);
    }
}

/// Child-side setup between `fork` and `execvp`. Never returns.
///
/// Failures here are reported on the child's own stderr and terminate the
/// child alone: exit code 1 for redirection problems, 2 when the program
/// image could not be loaded. The parent observes either as an ordinary
/// nonzero termination.
fn run_child(
    name: &str,
    program: &CStr,
    args: &[CString],
    background: bool,
    input: Option<RawFd>,
    output: Option<RawFd>,
) -> ! {
    // The interpreter ignores SIGINT for itself; a foreground child must
    // be interruptible again, and an ignored disposition would survive
    // the coming exec.
    if !background {
        let _ = unsafe { signal(Signal::SIGINT, SigHandler::SigDfl) };
    }

    if let Some(fd) = input {
        if dup2(fd, libc::STDIN_FILENO).is_err() {
            eprintln!("{}: cannot redirect standard input", name);
            unsafe { libc::_exit(1) };
        }
        let _ = close(fd);
    }

    if let Some(fd) = output {
        if dup2(fd, libc::STDOUT_FILENO).is_err() {
            eprintln!("{}: cannot redirect standard output", name);
            unsafe { libc::_exit(1) };
        }
        let _ = close(fd);
    }

    // On success execvp does not return.
    let err = execvp(program, args).unwrap_err();
    eprintln!("{}: {}", name, err.desc());
    unsafe { libc::_exit(2) };
}

/// Block until exactly `pid` terminates and decode how it went.
///
/// The wait targets the pid just spawned, never `-1`, so background
/// children are left for the registry to reap.
fn wait_foreground(pid: Pid) -> Result<ExitOutcome> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(outcome) = ExitOutcome::from_wait_status(&status) {
                    debug!(%pid, ?outcome, "foreground child finished");
                    return Ok(outcome);
                }
                // Stopped or continued; keep waiting for termination.
            }
            Err(Errno::EINTR) => continue,
            Err(err) => {
                return Err(anyhow::Error::new(err).context(format!("waitpid({}) failed", pid)));
            }
        }
    }
}
