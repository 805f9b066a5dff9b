use crate::builtin::{Cd, CommandFactory, Exit, Status};
use crate::command::{self, MAX_LINE};
use crate::env::Environment;
use crate::exec::{self, ExitOutcome, Spawned};
use crate::expansion::expand_pid;
use crate::jobs::JobRegistry;
use crate::signals::{self, Mode, ModeWatcher};
use anyhow::Result;
use nix::unistd::getpid;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, Write};
use tracing::debug;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports the builtins defined in this crate — one factory per
/// builtin type.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// The interactive command interpreter.
///
/// Reads one line at a time, expands the pid variable, and dispatches the
/// parsed command either to a builtin or to the execution engine. Spawned
/// background jobs land in the [`JobRegistry`] and are reaped
/// non-blockingly before each prompt; the stop-signal toggle observed
/// through a [`ModeWatcher`] decides whether the background suffix is
/// honored at all.
///
/// Example
/// ```no_run
/// use jobshell::Interpreter;
/// let mut sh = Interpreter::default();
/// sh.repl().unwrap();
/// ```
pub struct Interpreter {
    env: Environment,
    builtins: Vec<Box<dyn CommandFactory>>,
    jobs: JobRegistry,
    modes: ModeWatcher,
    pid: String,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of builtin factories.
    pub(crate) fn new(builtins: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            builtins,
            jobs: JobRegistry::new(),
            modes: ModeWatcher::new(),
            pid: getpid().to_string(),
        }
    }

    /// The interpreter's own pid, as substituted for the `$$` variable.
    pub fn pid(&self) -> &str {
        &self.pid
    }

    /// Interpreter-level state: working directory, last foreground
    /// status, exit flag.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The background jobs currently in flight.
    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Run the read-eval-print loop until `exit` or end of input.
    ///
    /// Each cycle announces a pending mode transition, reaps finished
    /// background jobs, then blocks reading one line. The interrupt key
    /// discards the current line and re-prompts; it never terminates the
    /// interpreter itself.
    pub fn repl(&mut self) -> Result<()> {
        signals::install()?;
        let mut rl = DefaultEditor::new()?;
        println!("jobshell running under pid {}", self.pid);

        loop {
            let mut stdout = io::stdout();
            self.announce_mode(&mut stdout)?;
            self.report_finished_jobs(&mut stdout)?;

            match rl.readline(": ") {
                Ok(line) => {
                    rl.add_history_entry(line.as_str())?;
                    self.eval_line(&line, &mut stdout)?;
                    if self.env.should_exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        // Shutdown sweep: drop whatever is still running, without waiting.
        self.jobs.drain_all();
        Ok(())
    }

    /// Evaluate one raw input line end to end, writing every
    /// operator-facing report to `out`.
    ///
    /// All command-level failures (parse errors, unopenable redirections,
    /// spawn failures) are reported and recovered here; only a broken
    /// output stream propagates as an error.
    pub fn eval_line(&mut self, line: &str, out: &mut dyn Write) -> Result<()> {
        if line.len() > MAX_LINE {
            writeln!(out, "input line exceeds {} bytes, ignored", MAX_LINE)?;
            return Ok(());
        }

        // Blank lines and comments never reach the parser.
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }

        let expanded = expand_pid(line, &self.pid);
        let mut cmd = match command::parse(&expanded) {
            Ok(cmd) => cmd,
            Err(err) => {
                writeln!(out, "{}", err)?;
                return Ok(());
            }
        };
        debug!(name = %cmd.name, background = cmd.background, "dispatching");

        let argv: Vec<&str> = cmd.args.iter().map(|s| s.as_str()).collect();
        for factory in &self.builtins {
            if let Some(builtin) = factory.try_create(&cmd.name, &argv[1..]) {
                return builtin.execute(out, &mut self.env);
            }
        }

        // The mode is re-read at the moment of dispatch, so a toggle that
        // arrived mid-line already applies to this command.
        let foreground_only = signals::current_mode() == Mode::ForegroundOnly;
        match exec::execute(&cmd, foreground_only) {
            Ok(Spawned::Foreground(outcome)) => {
                self.env.last_status = outcome;
                if let ExitOutcome::Signaled(_) = outcome {
                    writeln!(out, "{}", outcome)?;
                }
            }
            Ok(Spawned::Background(pid)) => {
                writeln!(out, "background pid {}", pid)?;
                cmd.pid = Some(pid);
                self.jobs.register(cmd);
            }
            Err(err) => {
                writeln!(out, "{:#}", err)?;
            }
        }
        Ok(())
    }

    /// Print the transition notice if the stop-signal toggled the mode
    /// since the last observation. The signal handler itself never
    /// prints; the notice is surfaced here, on the main thread.
    fn announce_mode(&mut self, out: &mut dyn Write) -> Result<()> {
        if let Some(mode) = self.modes.poll() {
            writeln!(out, "{}", mode.notice())?;
        }
        Ok(())
    }

    /// Reap finished background jobs and report one completion notice
    /// per reaped pid, in registration order.
    fn report_finished_jobs(&mut self, out: &mut dyn Write) -> Result<()> {
        for (pid, outcome) in self.jobs.sweep() {
            writeln!(out, "background pid {} is done: {}", pid, outcome)?;
        }
        Ok(())
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the builtins `exit`, `cd` and `status`.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Status>::default()),
        ])
    }
}
