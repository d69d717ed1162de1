//! Bridge threads (component J): worker threads that convert between an
//! object sequence and a byte stream, or that drain either kind of output
//! straight into a named `=> name` capture list.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::value::Value;

/// `WriteThread`: reads an object sequence, writes `str(x)+"\n"` for each
/// item to a byte sink. Used both by `ProxyPyOutToNativeTask` (bridging a
/// whole subtree's object output to its parent's byte stdout) and by the
/// pycmd executor's file-redirect branch.
pub fn spawn_write_thread(
    objects: Box<dyn Iterator<Item = Value> + Send>,
    mut sink: impl Write + Send + 'static,
) -> JoinHandle<std::io::Result<()>> {
    thread::spawn(move || {
        for item in objects {
            writeln!(sink, "{}", item.to_display_string())?;
        }
        Ok(())
    })
}

/// `WriteToPyOutThread`: reads lines from a byte source, strips one
/// trailing `\r?\n`, and appends each as a `Value::Str` to a shared
/// `=> name` capture list.
pub fn spawn_write_to_pyout_thread(source: impl Read + Send + 'static, out: Arc<Mutex<Vec<Value>>>) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(source).lines() {
            match line {
                Ok(l) => out.lock().unwrap().push(Value::Str(l)),
                Err(_) => break,
            }
        }
    })
}

/// `WritePyCmdRedirectPyOutThread`: appends a pycmd's object output
/// directly to a `=> name` capture list, with no stringification.
pub fn spawn_write_objects_to_pyout_thread(
    objects: Box<dyn Iterator<Item = Value> + Send>,
    out: Arc<Mutex<Vec<Value>>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for item in objects {
            out.lock().unwrap().push(item);
        }
    })
}

/// Adapts a byte source into an object iterator by reading it as
/// newline-delimited text and wrapping each line as `Value::Str`, used
/// when a `Python`-declared pycmd's input happens to come from a byte
/// (`ST`) producer -- the pycmd contract always hands such a pycmd an
/// object iterator (spec.md 6), so this conversion happens inline rather
/// than via a dedicated AST bridge node.
pub fn lines_as_values(source: impl Read + Send + 'static) -> Box<dyn Iterator<Item = Value> + Send> {
    Box::new(BufReader::new(source).lines().map_while(Result::ok).map(Value::Str))
}
