use anyhow::{Context, Result};
use nix::libc;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide flag backing foreground-only mode.
///
/// The stop-signal handler is the only writer besides test code, and it
/// performs nothing but this one atomic flip: printing the transition
/// notice is deferred to the main loop, which observes the flag through a
/// [`ModeWatcher`] the next time it is about to evaluate a command.
static FOREGROUND_ONLY: AtomicBool = AtomicBool::new(false);

/// Scheduling mode of the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The background suffix is honored.
    Normal,
    /// The background suffix is ignored; every command runs in the
    /// foreground.
    ForegroundOnly,
}

impl Mode {
    /// Operator-facing notice for the transition into this mode.
    pub fn notice(self) -> &'static str {
        match self {
            Mode::ForegroundOnly => "Entering foreground-only mode (& is now ignored)",
            Mode::Normal => "Exiting foreground-only mode (& is honored again)",
        }
    }
}

/// Read the mode as of this instant.
pub fn current_mode() -> Mode {
    if FOREGROUND_ONLY.load(Ordering::SeqCst) {
        Mode::ForegroundOnly
    } else {
        Mode::Normal
    }
}

extern "C" fn handle_stop_signal(_signo: libc::c_int) {
    // Async-signal context: one lock-free flip and nothing else.
    FOREGROUND_ONLY.fetch_xor(true, Ordering::SeqCst);
}

/// Install the interpreter's signal dispositions.
///
/// - `SIGTSTP` toggles foreground-only mode through
///   [`handle_stop_signal`]; `SA_RESTART` keeps the blocking line read and
///   the foreground wait from being aborted by the toggle.
/// - `SIGINT` is ignored by the interpreter process itself. Foreground
///   children restore the default disposition before replacing their
///   image, so the interrupt key still terminates them.
///
/// Call once at startup, before the first prompt.
pub fn install() -> Result<()> {
    let toggle = SigAction::new(
        SigHandler::Handler(handle_stop_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGTSTP, &toggle) }.context("installing SIGTSTP handler")?;

    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
    unsafe { sigaction(Signal::SIGINT, &ignore) }.context("ignoring SIGINT")?;

    Ok(())
}

/// Tracks the last mode the main loop acted on, so transitions driven by
/// the asynchronous toggle can be announced exactly once each.
#[derive(Debug)]
pub struct ModeWatcher {
    last: Mode,
}

impl ModeWatcher {
    /// Start watching from the current mode without announcing it.
    pub fn new() -> Self {
        Self {
            last: current_mode(),
        }
    }

    /// Return the new mode if it changed since the previous observation.
    pub fn poll(&mut self) -> Option<Mode> {
        let mode = current_mode();
        if mode != self.last {
            self.last = mode;
            Some(mode)
        } else {
            None
        }
    }

    /// The mode as of the last observation.
    pub fn last_seen(&self) -> Mode {
        self.last
    }
}

impl Default for ModeWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// The flag is process-wide, so tests that toggle it or that depend on it
/// staying `Normal` take turns.
#[cfg(test)]
pub(crate) fn mode_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX.get_or_init(|| Mutex::new(())).lock().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;
    use std::sync::MutexGuard;

    fn lock_mode() -> MutexGuard<'static, ()> {
        mode_test_lock()
    }

    #[test]
    fn test_toggle_cycles_between_modes() {
        let _lock = lock_mode();
        FOREGROUND_ONLY.store(false, Ordering::SeqCst);

        assert_eq!(current_mode(), Mode::Normal);
        handle_stop_signal(libc::SIGTSTP);
        assert_eq!(current_mode(), Mode::ForegroundOnly);
        handle_stop_signal(libc::SIGTSTP);
        assert_eq!(current_mode(), Mode::Normal);
    }

    #[test]
    fn test_watcher_reports_each_transition_once() {
        let _lock = lock_mode();
        FOREGROUND_ONLY.store(false, Ordering::SeqCst);

        let mut watcher = ModeWatcher::new();
        assert_eq!(watcher.poll(), None);

        handle_stop_signal(libc::SIGTSTP);
        assert_eq!(watcher.poll(), Some(Mode::ForegroundOnly));
        assert_eq!(watcher.poll(), None);

        handle_stop_signal(libc::SIGTSTP);
        assert_eq!(watcher.poll(), Some(Mode::Normal));
        assert_eq!(watcher.last_seen(), Mode::Normal);
    }

    #[test]
    fn test_delivered_stop_signal_flips_the_flag() {
        let _lock = lock_mode();
        FOREGROUND_ONLY.store(false, Ordering::SeqCst);

        install().unwrap();
        raise(Signal::SIGTSTP).unwrap();
        assert_eq!(current_mode(), Mode::ForegroundOnly);

        raise(Signal::SIGTSTP).unwrap();
        assert_eq!(current_mode(), Mode::Normal);
    }

    #[test]
    fn test_notices_name_the_ampersand_semantics() {
        assert!(Mode::ForegroundOnly.notice().contains("ignored"));
        assert!(Mode::Normal.notice().contains("honored"));
    }
}
