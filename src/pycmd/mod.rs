//! The pycmd interface contract: a host callable with three parameters
//! `(args, input, options)` and a result iterable, runnable as if it were
//! an external command but exchanging host objects instead of bytes.

pub mod examples;
pub mod registry;

use std::io::Read;

use crate::error::ShellError;
use crate::value::{Scope, Value};

pub use registry::PycmdRegistry;

/// A pycmd's declared stream kind for one side (input or output).
/// `Python` is the default; declared kinds map to diagnosis kinds as
/// `Python -> PY`, `File -> ST`, `No -> NO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeclaredKind {
    #[default]
    Python,
    File,
    No,
}

/// The input side handed to a running pycmd, dictated by its declared
/// `inType`.
pub enum PycmdInput {
    Objects(Box<dyn Iterator<Item = Value> + Send>),
    Bytes(Box<dyn Read + Send>),
    None,
}

/// `options` exposes the caller's host global/local scopes. Borrows rather
/// than owns them -- `run()`'s `globals`/`locals` parameters are themselves
/// borrowed, and every pycmd invocation happens on a scoped thread that is
/// joined before `run()` returns, so there is no need for `Arc` here.
pub struct PycmdOptions<'a> {
    globals: &'a dyn Scope,
    locals: &'a dyn Scope,
}

impl<'a> PycmdOptions<'a> {
    pub fn new(globals: &'a dyn Scope, locals: &'a dyn Scope) -> Self {
        Self { globals, locals }
    }

    pub fn globals(&self) -> &dyn Scope {
        self.globals
    }

    pub fn locals(&self) -> &dyn Scope {
        self.locals
    }
}

pub type PycmdOutput = Box<dyn Iterator<Item = Value> + Send>;

pub trait Pycmd: Send + Sync {
    fn in_type(&self) -> DeclaredKind {
        DeclaredKind::Python
    }

    fn out_type(&self) -> DeclaredKind {
        DeclaredKind::Python
    }

    fn call(&self, args: &[Value], input: PycmdInput, options: &PycmdOptions<'_>) -> Result<PycmdOutput, ShellError>;
}

/// Wraps a plain closure as a `Pycmd` with `Python`/`Python` declared
/// kinds, for the common case of a host lambda passed through a
/// substitution (e.g. `$represent` in the capture-scenario tests).
pub struct FnPycmd<F>(pub F)
where
    F: Fn(&[Value], PycmdInput, &PycmdOptions<'_>) -> Result<PycmdOutput, ShellError> + Send + Sync;

impl<F> Pycmd for FnPycmd<F>
where
    F: Fn(&[Value], PycmdInput, &PycmdOptions<'_>) -> Result<PycmdOutput, ShellError> + Send + Sync,
{
    fn call(&self, args: &[Value], input: PycmdInput, options: &PycmdOptions<'_>) -> Result<PycmdOutput, ShellError> {
        (self.0)(args, input, options)
    }
}
