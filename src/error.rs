// Error model: every evaluation failure carries a kind plus an optional child
// error, so a deeply nested failure unwinds into a numbered "1> 2> 3>" trace
// instead of a single flat message.

use std::fmt;
use thiserror::Error;

/// One error kind per `ison::error::Error` variant below; kept as a separate
/// enum so callers can match on shape without destructuring the whole error.
#[derive(Error, Debug, Clone)]
pub enum ErrorKind {
    #[error("{0}")]
    Message(String),

    #[error("function '{func}': {message}")]
    FunctionMessage { func: String, message: String },

    #[error("selecting key '{key}' in map")]
    DictSelection { key: String },

    #[error("selecting index {index} in list of length {len}")]
    ListSelection { index: i64, len: usize },

    #[error("no match for pattern '{pattern}' in: {highlighted}")]
    StringMatch { pattern: String, highlighted: String },

    #[error("no match for key pattern '{pattern}' in: {highlighted}")]
    KeyStringMatch { pattern: String, highlighted: String },

    #[error("processing string: {highlighted}")]
    ProcessString { highlighted: String },

    #[error("processing key: {highlighted}")]
    ProcessKey { highlighted: String },

    #[error("in argument string: {highlighted}")]
    ArgString { highlighted: String },

    #[error("in list element {index}")]
    ArgListElement { index: usize },

    #[error("calling function '{func}'")]
    FuncArgs { func: String },

    #[error("resolving reference path '{path}'")]
    RefPath { path: String },

    #[error("evaluating lambda")]
    Lambda,

    #[error("lambda argument {index}")]
    LambdaArgs { index: usize },

    #[error("lambda body part: {highlighted}")]
    LambdaPart { highlighted: String },
}

/// An evaluation error. `child` is boxed because errors nest: a lower-level
/// failure (say, a bad reference path) is wrapped by the higher-level
/// operation that was trying to use it (say, the argument slot evaluating
/// that path), and so on up to the document root.
#[derive(Error, Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub child: Option<Box<Error>>,
    /// True if this error must propagate to the process boundary rather than
    /// being recoverable by a local `!try`/`!default`-style construct.
    pub fatal: bool,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind, child: None, fatal: false }
    }

    pub fn fatal(kind: ErrorKind) -> Self {
        Error { kind, child: None, fatal: true }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Error::new(ErrorKind::Message(msg.into()))
    }

    /// Wrap `self` as the child of a new error of `kind`, propagating
    /// fatality from the child upward if the child was already fatal.
    pub fn wrap(self, kind: ErrorKind) -> Error {
        let fatal = self.fatal;
        Error { kind, child: Some(Box::new(self)), fatal }
    }

    pub fn trace(&self) -> String {
        let mut out = String::new();
        let mut cur = Some(self);
        let mut n = 1;
        while let Some(e) = cur {
            if n > 1 {
                out.push(' ');
            }
            out.push_str(&format!("{n}> {}", e.kind));
            cur = e.child.as_deref();
            n += 1;
        }
        out
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.trace())
    }
}

/// Non-fatal undefined-variable notices, collected separately from errors so
/// a document can evaluate to completion while still reporting them.
#[derive(Debug, Clone, Default)]
pub struct Warnings {
    entries: Vec<Warning>,
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub var_name: String,
    /// The chain of enclosing variable names the lookup was nested under,
    /// outermost first, for example `["server", "port"]`.
    pub chain: Vec<String>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_undefined(&mut self, var_name: impl Into<String>, chain: Vec<String>) {
        self.entries.push(Warning { var_name: var_name.into(), chain });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.entries.iter()
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.chain.is_empty() {
            write!(f, "undefined variable '{}'", self.var_name)
        } else {
            write!(f, "undefined variable '{}' (via {})", self.var_name, self.chain.join("."))
        }
    }
}

/// Highlight helper shared by several error kinds: wraps the substring
/// `[start, end)` of `s` in `>>...<<` markers.
pub fn highlight(s: &str, start: usize, end: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = start.min(chars.len());
    let end = end.min(chars.len()).max(start);
    let before: String = chars[..start].iter().collect();
    let mid: String = chars[start..end].iter().collect();
    let after: String = chars[end..].iter().collect();
    format!("{before}>>{mid}<<{after}")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_numbers_nested_errors() {
        let inner = Error::message("missing close brace");
        let outer = inner.wrap(ErrorKind::RefPath { path: "a:b".into() });
        let trace = outer.trace();
        assert!(trace.starts_with("1> resolving reference path"));
        assert!(trace.contains("2> missing close brace"));
    }

    #[test]
    fn highlight_wraps_substring() {
        assert_eq!(highlight("hello world", 6, 11), "hello >>world<<");
    }
}
