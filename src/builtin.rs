use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the interpreter at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// directly in-process without spawning a child process. They are
/// dispatched before the execution engine ever sees the command, and they
/// never touch the last-status value the `status` builtin reports.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "status".
    fn name() -> &'static str;

    /// Executes the command using the provided output stream and
    /// environment.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<()>;
}

/// Object-safe trait for any builtin the dispatcher can run.
pub(crate) trait ExecutableCommand {
    /// Executes the command. Failures are reported on the output stream
    /// and recovered; only a broken output stream propagates.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<()>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        match T::execute(*self, stdout, env) {
            Ok(()) => Ok(()),
            Err(e) => {
                writeln!(stdout, "{:#}", e)?;
                Ok(())
            }
        }
    }
}

/// Fallback command produced when argument parsing stops early, e.g. for
/// `--help` or a malformed invocation. Prints what argh produced.
struct InvalidArgs {
    output: String,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, _env: &mut Environment) -> Result<()> {
        writeln!(stdout, "{}", self.output.trim_end())?;
        Ok(())
    }
}

/// Factory that tries to create a builtin from a name and its arguments.
///
/// Returns `None` when the `name` is not this factory's builtin, leaving
/// the dispatcher to fall through to the execution engine.
pub(crate) trait CommandFactory {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, .. }) => Box::new(InvalidArgs { output }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Leave the interpreter. Remaining background jobs are dropped without
/// waiting for them.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; an exit code argument is not supported.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        // The prompt loop owns shutdown so it can drain the job registry;
        // terminating the process here would skip that.
        env.should_exit = true;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory named by the HOME
/// environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current
    /// directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => {
                if let Some(home) = env.home() {
                    PathBuf::from(home)
                } else {
                    return Err(anyhow::anyhow!("cd: no target and HOME not set"));
                }
            }
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Report how the last foreground command ended: its exit code, or the
/// signal that terminated it. Background commands never affect this.
pub struct Status {}

impl BuiltinCommand for Status {
    fn name() -> &'static str {
        "status"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        writeln!(stdout, "{}", env.last_status)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExitOutcome;
    use std::env as stdenv;
    use std::io;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    fn make_unique_temp_dir() -> io::Result<PathBuf> {
        let mut p = stdenv::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("jobshell_test_cd_{}_{}", std::process::id(), nanos));
        fs::create_dir_all(&p)?;
        Ok(p)
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let temp = make_unique_temp_dir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(&temp).expect("canonicalize failed");

        // save original cwd to restore later
        let orig = stdenv::current_dir().unwrap();
        let mut env = Environment::new();

        let cmd = Cd {
            target: Some(canonical_temp.to_string_lossy().to_string()),
        };
        let res = cmd.execute(&mut Vec::new(), &mut env);

        assert!(res.is_ok());
        assert_eq!(stdenv::current_dir().unwrap(), canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_to_home_when_no_target() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let mut env = Environment::new();

        let home = match env.home() {
            Some(h) => PathBuf::from(h),
            None => return, // нечего проверять без HOME
        };

        let cmd = Cd { target: None };
        let res = cmd.execute(&mut Vec::new(), &mut env);

        assert!(res.is_ok());
        assert_eq!(
            fs::canonicalize(stdenv::current_dir().unwrap()).unwrap(),
            fs::canonicalize(&home).unwrap()
        );

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
    }

    #[test]
    fn test_cd_to_missing_path_is_reported() {
        let _lock = lock_current_dir();
        let mut env = Environment::new();
        let cmd = Cd {
            target: Some("/definitely/not/a/real/path".to_string()),
        };
        let res = cmd.execute(&mut Vec::new(), &mut env);
        assert!(res.is_err());
    }

    #[test]
    fn test_status_reports_last_foreground_outcome() {
        let mut env = Environment::new();
        let mut out = Vec::new();
        Status {}.execute(&mut out, &mut env).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "exit value 0\n");

        env.last_status = ExitOutcome::Signaled(15);
        let mut out = Vec::new();
        Status {}.execute(&mut out, &mut env).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "terminated by signal 15\n");
    }

    #[test]
    fn test_exit_sets_flag_without_terminating() {
        let mut env = Environment::new();
        Exit { _args: vec![] }
            .execute(&mut Vec::new(), &mut env)
            .unwrap();
        assert!(env.should_exit);
    }

    #[test]
    fn test_factory_matches_by_name_only() {
        let factory = Factory::<Status>::default();
        assert!(factory.try_create("status", &[]).is_some());
        assert!(factory.try_create("stat", &[]).is_none());
    }

    #[test]
    fn test_factory_handles_bad_arguments() {
        // An unexpected flag stops argh early; the fallback command prints
        // the diagnostic instead of failing the dispatcher.
        let factory = Factory::<Cd>::default();
        let cmd = factory.try_create("cd", &["--bogus"]).unwrap();
        let mut env = Environment::new();
        let mut out = Vec::new();
        cmd.execute(&mut out, &mut env).unwrap();
        assert!(!out.is_empty());
    }
}
