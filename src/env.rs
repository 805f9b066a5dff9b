use crate::exec::ExitOutcome;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable, interpreter-level view of the process state shared between
/// the prompt loop and the built-in commands.
///
/// The environment contains:
/// - `current_dir`: the working directory commands run in.
/// - `last_status`: the decoded outcome of the most recent foreground
///   command. Background outcomes never land here.
/// - `should_exit`: a flag the prompt loop checks to know when to
///   terminate.
///
/// Note: fields are public for simplicity to keep the crate small.
#[derive(Debug, Clone)]
pub struct Environment {
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// Outcome of the last foreground command; `exit value 0` before any
    /// foreground command has run.
    pub last_status: ExitOutcome,
    /// When set to true, indicates that the interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment`.
    ///
    /// `current_dir` is initialized from `std::env::current_dir()`;
    /// `last_status` starts as a clean exit and `should_exit` as false.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            current_dir,
            last_status: ExitOutcome::Exited(0),
            should_exit: false,
        }
    }

    /// Get the value of a process environment variable.
    pub fn var(&self, key: &str) -> Option<String> {
        stdenv::var(key).ok()
    }

    /// The home directory, per the `HOME` environment variable.
    pub fn home(&self) -> Option<String> {
        self.var("HOME")
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_environment_defaults() {
        let env = Environment::new();
        assert_eq!(env.last_status, ExitOutcome::Exited(0));
        assert!(!env.should_exit);
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.var("PATH").is_some());
    }

    #[test]
    fn test_home_matches_process_env() {
        let env = Environment::new();
        assert_eq!(env.home(), std::env::var("HOME").ok());
    }
}
