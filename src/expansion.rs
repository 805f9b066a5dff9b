//! Input preprocessing: substitution of the interpreter's pid variable.

/// The character that, doubled, stands for the interpreter's own pid.
pub const SENTINEL: char = '$';

/// Replace every occurrence of the doubled sentinel (`$$`) in `line` with
/// `pid`, the interpreter's process id rendered as decimal digits.
///
/// Scanning is left-to-right and non-overlapping, so `$$$` expands to the
/// pid followed by a single `$`. A lone sentinel is copied verbatim.
pub fn expand_pid(line: &str, pid: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == SENTINEL && chars.peek() == Some(&SENTINEL) {
            chars.next();
            out.push_str(pid);
        } else {
            out.push(ch);
        }
    }
    out
}
