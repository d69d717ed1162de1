//! hshell - a hybrid Python/shell command pipeline engine.
//!
//! A small command language that lets external processes and host
//! ("pycmd") callables sit in the same pipeline, combinator, and redirect
//! grammar a POSIX shell uses, automatically bridging between byte streams
//! and host-object streams wherever a pipe edge crosses the two.

pub mod diagnosis;
pub mod engine;
pub mod error;
pub mod eval;
pub mod exec;
pub mod pycmd;
pub mod resources;
pub mod parser;
pub mod task;
pub mod tokenizer;
pub mod value;

pub use engine::{NoExprEvaluator, Shell};
pub use error::{Position, ShellError};
pub use eval::ExprEvaluator;
pub use pycmd::{DeclaredKind, Pycmd, PycmdInput, PycmdOptions, PycmdOutput, PycmdRegistry};
pub use task::{tasks::run, CaptureValue, Captures};
pub use tokenizer::AliasMap;
pub use value::{ExitStatus, HostCallable, MapScope, Scope, Value};
