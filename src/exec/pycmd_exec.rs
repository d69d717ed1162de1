//! Pycmd executor (component I): runs one pycmd's call + output drain on a
//! dedicated worker thread and reports back an `ExitStatus` the way an
//! external process's reaped exit code would, so the task runner can treat
//! the two branches uniformly.
//!
//! The worker is a *scoped* thread (`std::thread::Scope::spawn`) rather
//! than a detached one: `PycmdOptions` borrows the caller's `globals`/
//! `locals`, and the scope guarantees this thread is joined before `run()`
//! returns, so the borrow never needs to be `'static`.

use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::exec::bridge;
use crate::exec::pipe::PyPipe;
use crate::pycmd::{Pycmd, PycmdInput, PycmdOptions};
use crate::value::{ExitStatus, Value};

/// Where a pycmd's output iterable goes. A process with no explicit
/// redirect always has a `Pipe` sink -- diagnosis guarantees every reachable
/// root either has a downstream `|` consumer or gets wrapped in
/// `ProxyPyOutToNative`, which itself supplies a `Pipe`.
pub enum OutputSink {
    Pipe(Arc<PyPipe>),
    File(File),
    PyOut(Arc<Mutex<Vec<Value>>>),
}

/// Spawns the worker thread spec.md 4.I describes: it invokes `cmd.call`,
/// then -- on the same thread, since nothing downstream needs to observe
/// interleaving with the call itself -- drains the returned iterable into
/// `output`. A `Pipe` sink is the exception: `push` just enqueues the lazy
/// iterator, so draining there happens on whichever thread reads the pipe.
pub fn spawn_pycmd<'scope, 'env>(
    scope: &'scope thread::Scope<'scope, 'env>,
    cmd: Arc<dyn Pycmd>,
    args: Vec<Value>,
    input: PycmdInput,
    options: PycmdOptions<'env>,
    output: OutputSink,
) -> thread::ScopedJoinHandle<'scope, ExitStatus> {
    scope.spawn(move || match cmd.call(&args, input, &options) {
        Ok(produced) => match output {
            OutputSink::Pipe(pipe) => {
                pipe.push(produced);
                ExitStatus::from_code(0)
            }
            OutputSink::File(mut file) => match drain_to_file(produced, &mut file) {
                Ok(()) => ExitStatus::from_code(0),
                Err(e) => {
                    eprintln!("hshell: pycmd: write error: {e}");
                    ExitStatus::from_code(1)
                }
            },
            OutputSink::PyOut(out) => {
                let _ = bridge::spawn_write_objects_to_pyout_thread(produced, out).join();
                ExitStatus::from_code(0)
            }
        },
        Err(e) => {
            eprintln!("hshell: pycmd: {e}");
            ExitStatus::from_code(1)
        }
    })
}

fn drain_to_file(produced: Box<dyn Iterator<Item = Value> + Send>, file: &mut File) -> std::io::Result<()> {
    for item in produced {
        writeln!(file, "{}", item.to_display_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pycmd::{FnPycmd, PycmdOutput};
    use crate::value::MapScope;

    fn upper_cmd() -> Arc<dyn Pycmd> {
        Arc::new(FnPycmd(
            |args: &[Value], _input: PycmdInput, _opts: &PycmdOptions<'_>| -> Result<PycmdOutput, crate::error::ShellError> {
                let out: Vec<Value> = args.iter().map(|v| Value::Str(v.to_display_string().to_uppercase())).collect();
                Ok(Box::new(out.into_iter()))
            },
        ))
    }

    #[test]
    fn pipe_sink_enqueues_generator_for_downstream_reader() {
        let globals = MapScope::new();
        let locals = MapScope::new();
        let pipe = PyPipe::new();
        thread::scope(|scope| {
            let handle = spawn_pycmd(
                scope,
                upper_cmd(),
                vec![Value::Str("ab".into())],
                PycmdInput::None,
                PycmdOptions::new(&globals, &locals),
                OutputSink::Pipe(pipe.clone()),
            );
            assert!(handle.join().unwrap().success());
        });
        pipe.close();
        let reader = crate::exec::pipe::PyPipeReader::new(pipe);
        let values: Vec<String> = reader.map(|v| v.to_display_string()).collect();
        assert_eq!(values, vec!["AB".to_string()]);
    }

    #[test]
    fn file_sink_writes_stringified_lines() {
        let globals = MapScope::new();
        let locals = MapScope::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let file = crate::resources::open_redirect_file(path.to_str().unwrap(), false).unwrap();
        thread::scope(|scope| {
            let handle = spawn_pycmd(
                scope,
                upper_cmd(),
                vec![Value::Str("a".into()), Value::Str("b".into())],
                PycmdInput::None,
                PycmdOptions::new(&globals, &locals),
                OutputSink::File(file),
            );
            assert!(handle.join().unwrap().success());
        });
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "A\nB\n");
    }

    #[test]
    fn pyout_sink_captures_objects_verbatim() {
        let globals = MapScope::new();
        let locals = MapScope::new();
        let out = Arc::new(Mutex::new(Vec::new()));
        thread::scope(|scope| {
            let handle = spawn_pycmd(
                scope,
                upper_cmd(),
                vec![Value::Str("z".into())],
                PycmdInput::None,
                PycmdOptions::new(&globals, &locals),
                OutputSink::PyOut(out.clone()),
            );
            assert!(handle.join().unwrap().success());
        });
        let captured = out.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].to_display_string(), "Z");
    }

    #[test]
    fn call_error_reports_exit_code_one() {
        let globals = MapScope::new();
        let locals = MapScope::new();
        let failing: Arc<dyn Pycmd> = Arc::new(FnPycmd(
            |_: &[Value], _: PycmdInput, _: &PycmdOptions<'_>| -> Result<PycmdOutput, crate::error::ShellError> {
                Err(crate::error::ShellError::exec("boom"))
            },
        ));
        thread::scope(|scope| {
            let handle = spawn_pycmd(
                scope,
                failing,
                Vec::new(),
                PycmdInput::None,
                PycmdOptions::new(&globals, &locals),
                OutputSink::PyOut(Arc::new(Mutex::new(Vec::new()))),
            );
            let status = handle.join().unwrap();
            assert_eq!(status.code(), Some(1));
        });
    }
}
