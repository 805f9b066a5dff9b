//! A small interactive command interpreter built around process
//! orchestration.
//!
//! This crate provides the building blocks of a line-oriented shell that
//! spawns external programs as child processes: a command model with
//! redirection and a background marker, an execution engine over
//! fork/exec, a registry that reaps background jobs without blocking, and
//! a signal-driven mode toggle that suspends `&` semantics. A handful of
//! built-in commands (`exit`, `cd`, `status`) run in-process.
//!
//! The main entry point is [`Interpreter`], which drives the prompt loop
//! and dispatches each parsed line either to a builtin or to the
//! execution engine. The public modules expose the individual pieces for
//! embedding and testing.

mod builtin;
pub mod command;
pub mod env;
pub mod exec;
pub mod expansion;
mod interpreter;
pub mod jobs;
pub mod signals;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;
