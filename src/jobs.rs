use crate::command::Command;
use crate::exec::ExitOutcome;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Ordered collection of commands currently running in the background.
///
/// The registry is the sole owner of every command it holds: registering
/// moves the command in, and an entry is dropped only once its process has
/// been confirmed terminated (or at shutdown, unconditionally). All
/// mutation happens on the single interpreter thread, so the only
/// structural requirement is that removal during a sweep keeps the
/// traversal cursor valid.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Vec<Command>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a freshly spawned background command into the registry.
    ///
    /// The command must already carry the pid [`execute`] assigned to it.
    /// A healthy registry never holds the same pid twice; the kernel does
    /// not reuse a pid while the earlier process remains unreaped here.
    ///
    /// [`execute`]: crate::exec::execute
    pub fn register(&mut self, cmd: Command) {
        debug_assert!(cmd.pid.is_some(), "registered a command without a pid");
        debug!(pid = ?cmd.pid, name = %cmd.name, "background job registered");
        self.jobs.push(cmd);
    }

    /// Poll every entry once, non-blockingly, in registration order.
    ///
    /// Entries whose process has terminated are removed and returned with
    /// their decoded outcome so the caller can report them; entries whose
    /// process is still alive are left untouched. Removal uses an index
    /// cursor that stays put after deleting the current element, so no
    /// survivor is skipped or visited twice.
    pub fn sweep(&mut self) -> Vec<(Pid, ExitOutcome)> {
        let mut finished = Vec::new();
        let mut i = 0;
        while i < self.jobs.len() {
            let Some(pid) = self.jobs[i].pid else {
                warn!("dropping registry entry without a pid");
                self.jobs.remove(i);
                continue;
            };
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => i += 1,
                Ok(status) => match ExitOutcome::from_wait_status(&status) {
                    Some(outcome) => {
                        debug!(%pid, ?outcome, "background job reaped");
                        self.jobs.remove(i);
                        finished.push((pid, outcome));
                    }
                    // Stopped or continued: not a termination, keep it.
                    None => i += 1,
                },
                Err(err) => {
                    // ECHILD and friends: the process is gone but cannot
                    // be decoded. Drop the entry rather than poll forever.
                    warn!(%pid, %err, "background job lost without a wait status");
                    self.jobs.remove(i);
                }
            }
        }
        finished
    }

    /// Discard every remaining entry regardless of process state.
    ///
    /// Used only at shutdown; the interpreter does not block on stragglers.
    pub fn drain_all(&mut self) {
        if !self.jobs.is_empty() {
            debug!(count = self.jobs.len(), "dropping remaining background jobs");
        }
        self.jobs.clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
