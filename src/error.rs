//! Error taxonomy for the shell core.
//!
//! Lex/Parse/Type/Eval/Io errors abort a `run()` call outright; non-zero
//! child exits and pycmd exceptions are folded into exit codes instead and
//! never reach this enum unless they bubble past the root task.

use std::fmt;
use thiserror::Error;

/// Position of an offending token or character, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self { offset, line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("lex error at {pos}: {message}")]
    Lex { message: String, pos: Position },

    #[error("parse error at {pos}: {message}")]
    Parse { message: String, pos: Position },

    #[error("type error: {message}")]
    Type { message: String },

    #[error("eval error: {message}")]
    Eval { message: String },

    #[error("io error: {message}")]
    Io { message: String },

    #[error("exec error: {message}")]
    Exec { message: String },
}

impl ShellError {
    pub fn lex(message: impl Into<String>, pos: Position) -> Self {
        ShellError::Lex { message: message.into(), pos }
    }

    pub fn parse(message: impl Into<String>, pos: Position) -> Self {
        ShellError::Parse { message: message.into(), pos }
    }

    pub fn ty(message: impl Into<String>) -> Self {
        ShellError::Type { message: message.into() }
    }

    pub fn eval(message: impl Into<String>) -> Self {
        ShellError::Eval { message: message.into() }
    }

    pub fn exec(message: impl Into<String>) -> Self {
        ShellError::Exec { message: message.into() }
    }
}

impl From<std::io::Error> for ShellError {
    fn from(e: std::io::Error) -> Self {
        ShellError::Io { message: e.to_string() }
    }
}
