use nix::unistd::Pid;
use std::fmt;

/// Maximum number of argument slots a single command may occupy,
/// including the command name itself. Lines that would exceed this
/// are rejected during parsing rather than silently truncated.
pub const MAX_ARGS: usize = 512;

/// Maximum accepted length of one input line, in bytes. The prompt loop
/// rejects longer lines before they ever reach [`parse`].
pub const MAX_LINE: usize = 2048;

/// One unit of work for the interpreter: an executable name, its argument
/// vector, optional redirection targets and the background marker.
///
/// A `Command` is produced by [`parse`] from a single preprocessed input
/// line and is owned by exactly one place at a time: the dispatch loop
/// while it runs in the foreground, or the job registry once it has been
/// spawned in the background (at which point `pid` is populated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The executable token. Always equal to `args[0]`.
    pub name: String,
    /// Full argument vector, `name` included as the first element.
    pub args: Vec<String>,
    /// File to rebind standard input to, or `None` to inherit the
    /// interpreter's own stream.
    pub input_path: Option<String>,
    /// File to rebind standard output to, or `None` to inherit.
    pub output_path: Option<String>,
    /// True when the original line ended in a space followed by `&`.
    /// Subject to override while foreground-only mode is active.
    pub background: bool,
    /// Process id of the spawned child. Only populated while the command
    /// is an in-flight background job held by the registry.
    pub pid: Option<Pid>,
}

/// Errors produced while turning a line into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line carried no command name (e.g. it consisted of the
    /// background suffix alone).
    MissingName,
    /// A redirection operator was not followed by a file name.
    TruncatedRedirect(char),
    /// The argument vector would exceed [`MAX_ARGS`].
    TooManyArguments,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingName => write!(f, "missing command name"),
            ParseError::TruncatedRedirect(op) => {
                write!(f, "redirection '{}' is missing a file name", op)
            }
            ParseError::TooManyArguments => {
                write!(f, "too many arguments (limit is {})", MAX_ARGS)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse one preprocessed line into a [`Command`].
///
/// The caller has already stripped the trailing newline, expanded the pid
/// variable, and filtered out blank lines and comments, so the input is
/// assumed non-empty and non-comment.
///
/// Behavior:
/// - a trailing `" &"` (single space, then `&`, then end of line) marks the
///   command for background execution and is removed before tokenizing;
/// - tokens are split on whitespace; the first becomes `name` and `args[0]`;
/// - a token exactly `<` consumes the next token as the input path, a token
///   exactly `>` consumes the next token as the output path; either operator
///   with nothing after it is a [`ParseError::TruncatedRedirect`];
/// - every other token is appended to `args`, up to [`MAX_ARGS`].
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let (line, background) = match line.strip_suffix(" &") {
        Some(rest) => (rest, true),
        None => (line, false),
    };

    let mut tokens = line.split_whitespace();

    let name = tokens.next().ok_or(ParseError::MissingName)?.to_string();
    let mut args = vec![name.clone()];
    let mut input_path = None;
    let mut output_path = None;

    while let Some(token) = tokens.next() {
        match token {
            "<" => {
                let path = tokens.next().ok_or(ParseError::TruncatedRedirect('<'))?;
                input_path = Some(path.to_string());
            }
            ">" => {
                let path = tokens.next().ok_or(ParseError::TruncatedRedirect('>'))?;
                output_path = Some(path.to_string());
            }
            _ => {
                if args.len() == MAX_ARGS {
                    return Err(ParseError::TooManyArguments);
                }
                args.push(token.to_string());
            }
        }
    }

    Ok(Command {
        name,
        args,
        input_path,
        output_path,
        background,
        pid: None,
    })
}
