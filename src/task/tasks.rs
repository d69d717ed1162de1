//! Recursive tree walk over a diagnosed [`Labelled`] AST (component K, H, I
//! combined): for each node, decides the concrete stdin/stdout transport,
//! spawns whatever concurrency that node needs, and returns the node's exit
//! status. See the module doc on [`super`] for why this replaces the
//! original's explicit continuation scheduler with direct recursion over
//! `std::thread::scope`.

use std::fs::File;
use std::io::Read;
use std::process::Stdio;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use crate::diagnosis::{self, IoType, Labelled, LabelledArgPart, LabelledArgument, LabelledNode, LabelledProcess, LabelledRedirectTarget};
use crate::error::ShellError;
use crate::eval::{self, EvaluatedArg, ExprEvaluator, LiteralArgPart};
use crate::exec::bridge::{lines_as_values, spawn_write_thread, spawn_write_to_pyout_thread};
use crate::exec::pipe::{os_pipe, PyPipe, PyPipeReader};
use crate::exec::process::{spawn_external, RedirectKind, RedirectSpec};
use crate::exec::pycmd_exec::{spawn_pycmd, OutputSink};
use crate::exec::reaper;
use crate::parser::ast::BinaryOpKind;
use crate::pycmd::registry::PycmdRegistry;
use crate::pycmd::{DeclaredKind, Pycmd, PycmdInput, PycmdOptions};
use crate::resources::ResourceTable;
use crate::tokenizer::AliasMap;
use crate::value::{ExitStatus, Scope, Value};

use super::{CaptureValue, Captures, Controller};

/// Host state and the shared capture sink threaded through every recursive
/// call. Borrowed rather than owned: every concurrent branch a `run` call
/// opens is joined before `run` returns, so nothing here needs `'static`.
pub struct ExecCtx<'a> {
    pub expr_eval: &'a dyn ExprEvaluator,
    pub globals: &'a dyn Scope,
    pub locals: &'a dyn Scope,
    pub controller: &'a Controller,
    pub resources: &'a ResourceTable,
}

/// Where a node's stdin comes from.
enum StreamIn {
    Inherit,
    Bytes(File),
    Objects(PyPipeReader),
}

impl StreamIn {
    fn try_clone(&self) -> Result<StreamIn, ShellError> {
        Ok(match self {
            StreamIn::Inherit => StreamIn::Inherit,
            StreamIn::Bytes(f) => StreamIn::Bytes(f.try_clone().map_err(ShellError::from)?),
            StreamIn::Objects(r) => StreamIn::Objects(r.clone()),
        })
    }

    fn into_stdio(self) -> Result<Stdio, ShellError> {
        match self {
            StreamIn::Inherit => Ok(Stdio::inherit()),
            StreamIn::Bytes(f) => Ok(Stdio::from(f)),
            StreamIn::Objects(_) => Err(ShellError::exec("external process cannot consume an object stream")),
        }
    }

    /// Adapts to whatever shape a pycmd's declared `inType` demands, per the
    /// 3x3 matrix in spec.md 6: a byte producer feeding a `Python`-declared
    /// consumer is bridged inline via `lines_as_values` rather than through a
    /// dedicated AST node (see `exec::bridge`'s own doc comment).
    fn into_pycmd_input(self, declared: DeclaredKind) -> PycmdInput {
        match declared {
            DeclaredKind::No => PycmdInput::None,
            DeclaredKind::File => match self {
                StreamIn::Inherit => PycmdInput::Bytes(Box::new(std::io::stdin())),
                StreamIn::Bytes(f) => PycmdInput::Bytes(Box::new(f)),
                StreamIn::Objects(_) => PycmdInput::None,
            },
            DeclaredKind::Python => match self {
                StreamIn::Inherit => PycmdInput::Objects(Box::new(std::iter::empty())),
                StreamIn::Bytes(f) => PycmdInput::Objects(lines_as_values(f)),
                StreamIn::Objects(r) => PycmdInput::Objects(Box::new(r)),
            },
        }
    }
}

/// Where a node's stdout goes.
enum StreamOut {
    Inherit,
    Bytes(File),
    Objects(Arc<PyPipe>),
}

impl StreamOut {
    fn try_clone(&self) -> Result<StreamOut, ShellError> {
        Ok(match self {
            StreamOut::Inherit => StreamOut::Inherit,
            StreamOut::Bytes(f) => StreamOut::Bytes(f.try_clone().map_err(ShellError::from)?),
            StreamOut::Objects(p) => StreamOut::Objects(p.clone()),
        })
    }

    fn into_stdio(self) -> Result<Stdio, ShellError> {
        match self {
            StreamOut::Inherit => Ok(Stdio::inherit()),
            StreamOut::Bytes(f) => Ok(Stdio::from(f)),
            StreamOut::Objects(_) => Err(ShellError::exec("external process cannot produce an object stream")),
        }
    }

    fn into_output_sink(self) -> Result<OutputSink, ShellError> {
        match self {
            StreamOut::Objects(p) => Ok(OutputSink::Pipe(p)),
            StreamOut::Bytes(f) => Ok(OutputSink::File(f)),
            StreamOut::Inherit => Ok(OutputSink::File(dup_stdout()?)),
        }
    }

    fn into_byte_writer(self) -> Result<Box<dyn std::io::Write + Send>, ShellError> {
        match self {
            StreamOut::Inherit => Ok(Box::new(dup_stdout()?)),
            StreamOut::Bytes(f) => Ok(Box::new(f)),
            StreamOut::Objects(_) => Err(ShellError::exec("proxy target cannot be an object sink")),
        }
    }
}

fn dup_stdout() -> Result<File, ShellError> {
    use std::os::fd::FromRawFd;
    let fd = unsafe { libc::dup(1) };
    if fd < 0 {
        return Err(ShellError::from(std::io::Error::last_os_error()));
    }
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// Diagnoses and executes `cmd_string`, returning whatever `-> name` /
/// `=> name` captures accumulated. Matches `SPEC_FULL.md`'s `run()` -- see
/// [`crate::engine::Shell`] for the convenience wrapper that supplies
/// `registry`/`expr_eval` the way an embedder actually holds them.
#[allow(clippy::too_many_arguments)]
pub fn run(
    cmd_string: &str,
    registry: &PycmdRegistry,
    expr_eval: &dyn ExprEvaluator,
    globals: &dyn Scope,
    locals: &dyn Scope,
    alias_map: Option<&AliasMap>,
) -> Result<Captures, ShellError> {
    let ast = crate::parser::parse(cmd_string, alias_map)?;
    let diag_ctx = diagnosis::DiagnosisCtx { registry, expr_eval, globals, locals };
    let labelled = diagnosis::diagnose(ast, &diag_ctx)?;

    let controller = Controller::new();
    let resources = ResourceTable::new();
    let ctx = ExecCtx { expr_eval, globals, locals, controller: &controller, resources: &resources };
    exec_node(&labelled, StreamIn::Inherit, StreamOut::Inherit, &ctx)?;
    Ok(controller.into_captures())
}

fn exec_node(node: &Labelled, stdin: StreamIn, stdout: StreamOut, ctx: &ExecCtx) -> Result<ExitStatus, ShellError> {
    match &node.node {
        LabelledNode::Process(p) => exec_process(p, stdin, stdout, ctx),
        LabelledNode::BinaryOp { op, left, right } => exec_binary(*op, left, right, stdin, stdout, ctx),
        LabelledNode::Assign { cmd, name } => {
            let status = exec_node(cmd, stdin, stdout, ctx)?;
            ctx.controller.store(name.clone(), CaptureValue::ExitCode(status));
            Ok(status)
        }
        LabelledNode::ProxyPyOutToNative(inner) => exec_proxy(inner, stdin, stdout, ctx),
    }
}

fn exec_binary(
    op: BinaryOpKind,
    left: &Labelled,
    right: &Labelled,
    stdin: StreamIn,
    stdout: StreamOut,
    ctx: &ExecCtx,
) -> Result<ExitStatus, ShellError> {
    match op {
        BinaryOpKind::Pipe => exec_pipe(left, right, stdin, stdout, ctx),
        BinaryOpKind::Semi => {
            let left_status = exec_node(left, stdin.try_clone()?, stdout.try_clone()?, ctx)?;
            let _ = left_status;
            exec_node(right, stdin, stdout, ctx)
        }
        BinaryOpKind::And => {
            let left_status = exec_node(left, stdin.try_clone()?, stdout.try_clone()?, ctx)?;
            if left_status.success() { exec_node(right, stdin, stdout, ctx) } else { Ok(left_status) }
        }
        BinaryOpKind::Or => {
            let left_status = exec_node(left, stdin.try_clone()?, stdout.try_clone()?, ctx)?;
            if !left_status.success() { exec_node(right, stdin, stdout, ctx) } else { Ok(left_status) }
        }
    }
}

/// `PipePyToPyTask` / `PipeNativeToNativeTask`: chooses an object pipe when
/// the left side's output is genuinely `PY` (diagnosis guarantees the right
/// side's `inType` is then also `PY`, since any mismatch would already have
/// been wrapped in a proxy), otherwise a real OS byte pipe.
fn exec_pipe(left: &Labelled, right: &Labelled, stdin: StreamIn, stdout: StreamOut, ctx: &ExecCtx) -> Result<ExitStatus, ShellError> {
    if left.out_type == IoType::Py {
        let pipe = PyPipe::new();
        let reader = PyPipeReader::new(pipe.clone());
        thread::scope(|scope| {
            let left_pipe = pipe.clone();
            let left_handle = scope.spawn(move || {
                let status = exec_node(left, stdin, StreamOut::Objects(left_pipe.clone()), ctx);
                left_pipe.close();
                status
            });
            let right_result = exec_node(right, StreamIn::Objects(reader), stdout, ctx);
            let left_status = left_handle.join().expect("left side of pipe panicked")?;
            let right_status = right_result?;
            let _ = left_status;
            Ok(right_status)
        })
    } else {
        let (read_end, write_end) = os_pipe().map_err(ShellError::from)?;
        thread::scope(|scope| {
            let left_handle = scope.spawn(move || exec_node(left, stdin, StreamOut::Bytes(write_end), ctx));
            let right_result = exec_node(right, StreamIn::Bytes(read_end), stdout, ctx);
            let left_status = left_handle.join().expect("left side of pipe panicked")?;
            let right_status = right_result?;
            let _ = left_status;
            Ok(right_status)
        })
    }
}

/// `ProxyPyOutToNativeTask`: bridges the wrapped subtree's object output to
/// this subtree's byte stdout, on a detached writer thread joined before
/// returning.
fn exec_proxy(inner: &Labelled, stdin: StreamIn, stdout: StreamOut, ctx: &ExecCtx) -> Result<ExitStatus, ShellError> {
    let pipe = PyPipe::new();
    let reader = PyPipeReader::new(pipe.clone());
    let sink = stdout.into_byte_writer()?;
    let bridge = spawn_write_thread(Box::new(reader), sink);
    let result = exec_node(inner, stdin, StreamOut::Objects(pipe.clone()), ctx);
    pipe.close();
    let bridge_result = bridge.join().expect("proxy bridge thread panicked");
    let status = result?;
    bridge_result.map_err(ShellError::from)?;
    Ok(status)
}

fn exec_process(p: &LabelledProcess, stdin: StreamIn, stdout: StreamOut, ctx: &ExecCtx) -> Result<ExitStatus, ShellError> {
    match &p.pycmd {
        None => exec_external_process(p, stdin, stdout, ctx),
        Some(cmd) => exec_pycmd_process(p, cmd.clone(), stdin, stdout, ctx),
    }
}

fn exec_external_process(p: &LabelledProcess, stdin: StreamIn, stdout: StreamOut, ctx: &ExecCtx) -> Result<ExitStatus, ShellError> {
    let argv = build_argv(p, ctx)?;
    if argv.is_empty() {
        return Err(ShellError::exec("empty command"));
    }

    let mut redirect_specs = Vec::with_capacity(p.redirects.len());
    for r in &p.redirects {
        let kind = match &r.target {
            LabelledRedirectTarget::Dup { dst_fd } => RedirectKind::Dup { dst_fd: *dst_fd },
            LabelledRedirectTarget::File { target } => {
                RedirectKind::File { path: resolve_redirect_path(target, ctx)?, append: r.append }
            }
            LabelledRedirectTarget::PyOut { var_name } => RedirectKind::PyOut { var_name: var_name.clone() },
        };
        redirect_specs.push(RedirectSpec { src_fd: r.src_fd, kind });
    }

    let stdin_stdio = stdin.into_stdio()?;
    let stdout_stdio = stdout.into_stdio()?;
    let mut spawned = spawn_external(&argv, redirect_specs, stdin_stdio, stdout_stdio, ctx.resources)?;

    let pid = spawned.pid;
    let mut bridges = Vec::with_capacity(spawned.pyout_reads.len());
    for (name, file) in spawned.pyout_reads.drain(..) {
        let out = Arc::new(Mutex::new(Vec::new()));
        let handle = spawn_write_to_pyout_thread(file, out.clone());
        bridges.push((name, out, handle));
    }

    // Never call `Child::wait` ourselves: the global reaper owns
    // `waitpid(-1, ...)` for every child this engine spawns, so a second
    // waiter here would race it.
    drop(spawned.child);
    let (tx, rx) = mpsc::channel();
    reaper::global().register(pid, Box::new(move |status| { let _ = tx.send(status); }));
    let status = rx.recv().map_err(|_| ShellError::exec("reaper channel closed before child exit was observed"))?;

    for (name, out, handle) in bridges {
        handle.join().expect("pyout bridge thread panicked");
        let lines: Vec<String> = out.lock().unwrap().iter().map(Value::to_display_string).collect();
        ctx.controller.store(name, CaptureValue::Lines(lines));
    }

    Ok(status)
}

enum PycmdRedirect {
    None,
    File(String, bool),
    PyOut(String),
}

fn validate_pycmd_redirects(p: &LabelledProcess, ctx: &ExecCtx) -> Result<PycmdRedirect, ShellError> {
    if p.redirects.len() > 1 {
        return Err(ShellError::ty("a pycmd accepts at most one redirect"));
    }
    match p.redirects.first() {
        None => Ok(PycmdRedirect::None),
        Some(r) => match &r.target {
            LabelledRedirectTarget::Dup { .. } => Err(ShellError::ty("a pycmd cannot take a numbered duplicate redirect")),
            LabelledRedirectTarget::File { target } => Ok(PycmdRedirect::File(resolve_redirect_path(target, ctx)?, r.append)),
            LabelledRedirectTarget::PyOut { var_name } => Ok(PycmdRedirect::PyOut(var_name.clone())),
        },
    }
}

fn exec_pycmd_process(
    p: &LabelledProcess,
    cmd: Arc<dyn Pycmd>,
    stdin: StreamIn,
    stdout: StreamOut,
    ctx: &ExecCtx,
) -> Result<ExitStatus, ShellError> {
    let args = build_pycmd_args(p, ctx)?;
    let input = stdin.into_pycmd_input(cmd.in_type());
    let redirect = validate_pycmd_redirects(p, ctx)?;
    let options = PycmdOptions::new(ctx.globals, ctx.locals);

    match redirect {
        PycmdRedirect::None => {
            let sink = stdout.into_output_sink()?;
            thread::scope(|scope| {
                let handle = spawn_pycmd(scope, cmd, args, input, options, sink);
                Ok(handle.join().expect("pycmd worker thread panicked"))
            })
        }
        PycmdRedirect::File(path, append) => {
            let file = crate::resources::open_redirect_file(&path, append)?;
            ctx.resources.track(&file)?;
            thread::scope(|scope| {
                let handle = spawn_pycmd(scope, cmd, args, input, options, OutputSink::File(file));
                Ok(handle.join().expect("pycmd worker thread panicked"))
            })
        }
        PycmdRedirect::PyOut(name) => {
            let out = Arc::new(Mutex::new(Vec::new()));
            let status = thread::scope(|scope| {
                let handle = spawn_pycmd(scope, cmd, args, input, options, OutputSink::PyOut(out.clone()));
                handle.join().expect("pycmd worker thread panicked")
            });
            let objects = Arc::try_unwrap(out).expect("pycmd worker already joined").into_inner().unwrap();
            ctx.controller.store(name, CaptureValue::Objects(objects));
            Ok(status)
        }
    }
}

/// Resolves one argument's backquote-bearing parts into [`LiteralArgPart`]s
/// ready for [`eval::evaluate_argument`], joining a backquote's collected
/// words with spaces when it shares the argument with other literal pieces.
/// Callers special-case the "sole backquote" shape themselves so its words
/// can splice in as separate argv/pycmd-arg entries instead.
fn resolve_argument_literal_parts(arg: &LabelledArgument, ctx: &ExecCtx) -> Result<Vec<LiteralArgPart>, ShellError> {
    let mut out = Vec::with_capacity(arg.len());
    for part in arg {
        match part {
            LabelledArgPart::Literal(s) => out.push(LiteralArgPart::Literal(s.clone())),
            LabelledArgPart::SingleQuoted(s) => out.push(LiteralArgPart::SingleQuoted(s.clone())),
            LabelledArgPart::Substitution(s) => out.push(LiteralArgPart::Substitution(s.clone())),
            LabelledArgPart::Backquote(sub) => {
                let words = resolve_backquote_words(sub, ctx)?;
                out.push(LiteralArgPart::SingleQuoted(words.join(" ")));
            }
        }
    }
    Ok(out)
}

fn build_argv(p: &LabelledProcess, ctx: &ExecCtx) -> Result<Vec<String>, ShellError> {
    let mut argv = Vec::new();
    for arg in &p.args {
        if let [LabelledArgPart::Backquote(sub)] = arg.as_slice() {
            argv.extend(resolve_backquote_words(sub, ctx)?);
            continue;
        }
        let parts = resolve_argument_literal_parts(arg, ctx)?;
        let evaluated = eval::evaluate_argument(&parts, ctx.expr_eval, ctx.globals, ctx.locals)?;
        argv.extend(eval::evaluated_arg_to_words(&evaluated));
    }
    Ok(argv)
}

fn build_pycmd_args(p: &LabelledProcess, ctx: &ExecCtx) -> Result<Vec<Value>, ShellError> {
    let mut args = Vec::new();
    for arg in &p.args {
        if let [LabelledArgPart::Backquote(sub)] = arg.as_slice() {
            args.extend(resolve_backquote_words(sub, ctx)?.into_iter().map(Value::Str));
            continue;
        }
        let parts = resolve_argument_literal_parts(arg, ctx)?;
        match eval::evaluate_argument(&parts, ctx.expr_eval, ctx.globals, ctx.locals)? {
            EvaluatedArg::Scalar(v) => args.push(v),
            EvaluatedArg::Words(words) => args.extend(words.into_iter().map(Value::Str)),
        }
    }
    Ok(args)
}

fn resolve_redirect_path(target: &LabelledArgument, ctx: &ExecCtx) -> Result<String, ShellError> {
    if let [LabelledArgPart::Backquote(sub)] = target.as_slice() {
        return Ok(resolve_backquote_words(sub, ctx)?.join(" "));
    }
    let parts = resolve_argument_literal_parts(target, ctx)?;
    match eval::evaluate_argument(&parts, ctx.expr_eval, ctx.globals, ctx.locals)? {
        EvaluatedArg::Scalar(v) => Ok(v.to_display_string()),
        EvaluatedArg::Words(words) => Ok(words.join(" ")),
    }
}

/// spec.md 4.G step 1: runs a backquoted sub-AST with a fresh stdout pipe on
/// a concurrent reader thread (so a large sub-command's output can't
/// deadlock against a full pipe buffer), then joins its collected text into
/// whitespace-separated words.
fn resolve_backquote_words(sub: &Labelled, ctx: &ExecCtx) -> Result<Vec<String>, ShellError> {
    let (mut read_end, write_end) = os_pipe().map_err(ShellError::from)?;
    thread::scope(|scope| {
        let reader = scope.spawn(move || {
            let mut buf = String::new();
            read_end.read_to_string(&mut buf).map(|_| buf)
        });
        let status = exec_node(sub, StreamIn::Inherit, StreamOut::Bytes(write_end), ctx)?;
        let _ = status;
        let text = reader.join().expect("backquote reader thread panicked").map_err(ShellError::from)?;
        Ok(text.split_whitespace().map(str::to_string).collect())
    })
}
