//! The dynamically-typed host value that crosses pycmd boundaries and
//! substitution sites, standing in for a raw Python object.

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::error::ShellError;
use crate::pycmd::Pycmd;

/// A host-supplied closure reachable through a `Value`, used the way the
/// original's `map`/`filter` take a lambda argument.
pub trait HostCallable: Send + Sync {
    fn call(&self, arg: Value) -> Result<Value, ShellError>;
}

impl<F> HostCallable for F
where
    F: Fn(Value) -> Result<Value, ShellError> + Send + Sync,
{
    fn call(&self, arg: Value) -> Result<Value, ShellError> {
        self(arg)
    }
}

/// The one capability the core may assume of an opaque table-like value:
/// it can write itself to a writer. Everything else about `Table` values
/// stays out of scope for the core.
pub trait PrettyPrint: Send + Sync {
    fn pretty_print(&self, w: &mut dyn io::Write) -> io::Result<()>;
}

#[derive(Clone)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value>),
    Pycmd(Arc<dyn Pycmd>),
    Callable(Arc<dyn HostCallable>),
    Table(Arc<dyn PrettyPrint>),
    None,
}

impl Value {
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Pycmd(_) | Value::Callable(_))
    }

    /// "is this iterable of strings?" per the host-reflection contract.
    pub fn as_str_list(&self) -> Option<Vec<String>> {
        match self {
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_display_string());
                }
                Some(out)
            }
            _ => None,
        }
    }

    /// Stringify for inclusion in an external argv. Lists/tuples expand
    /// element-wise by the caller; this only stringifies a single scalar.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
                parts.join(" ")
            }
            Value::Pycmd(_) | Value::Callable(_) => String::new(),
            Value::Table(t) => {
                let mut buf = Vec::new();
                let _ = t.pretty_print(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            }
            Value::None => String::new(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::List(items) => write!(f, "List({:?})", items),
            Value::Pycmd(_) => write!(f, "Pycmd(..)"),
            Value::Callable(_) => write!(f, "Callable(..)"),
            Value::Table(_) => write!(f, "Table(..)"),
            Value::None => write!(f, "None"),
        }
    }
}

/// A read-only name lookup handed to `run()` as `globals`/`locals`, and
/// exposed to pycmds via their `options`.
pub trait Scope: Send + Sync {
    fn get(&self, name: &str) -> Option<Value>;
}

/// A `Scope` over a plain map, convenient for embedders and tests.
#[derive(Default)]
pub struct MapScope(std::collections::HashMap<String, Value>);

impl MapScope {
    pub fn new() -> Self {
        Self(std::collections::HashMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }
}

impl Scope for MapScope {
    fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).cloned()
    }
}

/// Portable stand-in for a child's wait status, reproducing the
/// `WIFEXITED`/`WEXITSTATUS` accessors the capture map promises without
/// leaking a raw wait-status integer into the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ExitStatus {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code), signal: None }
    }

    pub fn from_signal(signal: i32) -> Self {
        Self { code: None, signal: Some(signal) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn signal(&self) -> Option<i32> {
        self.signal
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(code) = status.code() {
                return ExitStatus::from_code(code);
            }
            if let Some(sig) = status.signal() {
                return ExitStatus::from_signal(sig);
            }
        }
        ExitStatus::from_code(status.code().unwrap_or(-1))
    }
}
