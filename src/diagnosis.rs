//! IO-type diagnoser (component E): walks the parsed AST and labels every
//! node with `(inType, outType)`, inserting `ProxyPyOutToNative` bridge
//! nodes wherever a byte-stream producer feeds an object-stream consumer
//! or vice versa. Produces the `Labelled` tree the task runner executes.

use std::sync::Arc;

use crate::error::ShellError;
use crate::eval::{resolve_substitution, ExprEvaluator};
use crate::parser::ast::{self, Argument as RawArgument, Ast, BinaryOpKind, Process, RedirectTarget};
use crate::pycmd::registry::PycmdRegistry;
use crate::pycmd::{DeclaredKind, Pycmd};
use crate::value::{Scope, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoType {
    St,
    Py,
    No,
    /// Internal only: a boolean combinator's sides disagree. Must never
    /// reach a pipe's right-hand side that demands `Py`.
    Mix,
}

impl IoType {
    pub fn is_file_like(self) -> bool {
        matches!(self, IoType::St | IoType::No)
    }

    fn merge(a: IoType, b: IoType) -> IoType {
        if a == b {
            a
        } else if a == IoType::No {
            b
        } else if b == IoType::No {
            a
        } else {
            IoType::Mix
        }
    }
}

impl From<DeclaredKind> for IoType {
    fn from(k: DeclaredKind) -> Self {
        match k {
            DeclaredKind::Python => IoType::Py,
            DeclaredKind::File => IoType::St,
            DeclaredKind::No => IoType::No,
        }
    }
}

/// One labelled argument-part: identical to the parser's `ArgPart` except
/// a `Backquote` now wraps a diagnosed sub-tree instead of a raw `Ast`.
#[derive(Debug, Clone)]
pub enum LabelledArgPart {
    Literal(String),
    SingleQuoted(String),
    Substitution(String),
    Backquote(Arc<Labelled>),
}

pub type LabelledArgument = Vec<LabelledArgPart>;

#[derive(Debug, Clone)]
pub enum LabelledRedirectTarget {
    Dup { dst_fd: i32 },
    File { target: LabelledArgument },
    PyOut { var_name: String },
}

#[derive(Debug, Clone)]
pub struct LabelledRedirect {
    pub append: bool,
    pub src_fd: i32,
    pub target: LabelledRedirectTarget,
}

#[derive(Clone)]
pub struct LabelledProcess {
    pub args: Vec<LabelledArgument>,
    pub redirects: Vec<LabelledRedirect>,
    /// Resolved once at diagnosis time: the concrete pycmd this process
    /// head names, whether found by registry name or by resolving a
    /// substitution to a callable directly. `None` means external.
    pub pycmd: Option<Arc<dyn Pycmd>>,
}

/// `Pycmd` is not `Debug` (it's a caller-supplied trait object), so this
/// prints whether a pycmd is attached rather than its contents.
impl std::fmt::Debug for LabelledProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelledProcess")
            .field("args", &self.args)
            .field("redirects", &self.redirects)
            .field("pycmd", &self.pycmd.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub enum LabelledNode {
    Process(LabelledProcess),
    BinaryOp { op: BinaryOpKind, left: Arc<Labelled>, right: Arc<Labelled> },
    Assign { cmd: Arc<Labelled>, name: String },
    ProxyPyOutToNative(Arc<Labelled>),
}

#[derive(Debug)]
pub struct Labelled {
    pub node: LabelledNode,
    pub in_type: IoType,
    pub out_type: IoType,
}

impl Labelled {
    fn new(node: LabelledNode, in_type: IoType, out_type: IoType) -> Arc<Self> {
        Arc::new(Self { node, in_type, out_type })
    }
}

fn wrap_proxy(inner: Arc<Labelled>) -> Arc<Labelled> {
    let in_type = inner.in_type;
    Labelled::new(LabelledNode::ProxyPyOutToNative(inner), in_type, IoType::St)
}

pub struct DiagnosisCtx<'a> {
    pub registry: &'a PycmdRegistry,
    pub expr_eval: &'a dyn ExprEvaluator,
    pub globals: &'a dyn Scope,
    pub locals: &'a dyn Scope,
}

/// Entry point: diagnoses the whole tree, then wraps the root in a proxy
/// if its output is not file-like (terminal output must reach the
/// caller's byte stdout).
pub fn diagnose(ast: Ast, ctx: &DiagnosisCtx) -> Result<Arc<Labelled>, ShellError> {
    let labelled = diagnose_node(ast, ctx)?;
    if labelled.out_type.is_file_like() {
        Ok(labelled)
    } else {
        Ok(wrap_proxy(labelled))
    }
}

fn diagnose_node(ast: Ast, ctx: &DiagnosisCtx) -> Result<Arc<Labelled>, ShellError> {
    match ast {
        Ast::Process(p) => diagnose_process(p, ctx),
        Ast::Assign(a) => {
            let inner = diagnose_node(*a.cmd, ctx)?;
            let (in_type, out_type) = (inner.in_type, inner.out_type);
            Ok(Labelled::new(LabelledNode::Assign { cmd: inner, name: a.name }, in_type, out_type))
        }
        Ast::BinaryOp(b) => diagnose_binary(b, ctx),
    }
}

fn diagnose_binary(b: ast::BinaryOp, ctx: &DiagnosisCtx) -> Result<Arc<Labelled>, ShellError> {
    let left = diagnose_node(*b.left, ctx)?;
    let right = diagnose_node(*b.right, ctx)?;
    match b.op {
        BinaryOpKind::Pipe => {
            if left.out_type == IoType::Mix && right.in_type == IoType::Py {
                return Err(ShellError::ty("pipe: left side has incoherent (MIX) output feeding a pycmd"));
            }
            let left = if !left.out_type.is_file_like() && right.in_type.is_file_like() {
                wrap_proxy(left)
            } else {
                left
            };
            let in_type = left.in_type;
            let out_type = right.out_type;
            Ok(Labelled::new(
                LabelledNode::BinaryOp { op: BinaryOpKind::Pipe, left, right },
                in_type,
                out_type,
            ))
        }
        op => {
            let in_type = IoType::merge(left.in_type, right.in_type);
            if in_type == IoType::Mix {
                return Err(ShellError::ty("boolean combinator: sides disagree on input stream kind"));
            }
            let out_type = IoType::merge(left.out_type, right.out_type);
            let left = if out_type.is_file_like() && !left.out_type.is_file_like() { wrap_proxy(left) } else { left };
            let right = if out_type.is_file_like() && !right.out_type.is_file_like() { wrap_proxy(right) } else { right };
            Ok(Labelled::new(LabelledNode::BinaryOp { op, left, right }, in_type, out_type))
        }
    }
}

enum HeadPycmd {
    None,
    Named(String),
    Direct(Arc<dyn Pycmd>),
}

fn resolve_head_value(v: &Value, registry: &PycmdRegistry) -> HeadPycmd {
    match v {
        Value::Pycmd(p) => HeadPycmd::Direct(p.clone()),
        Value::Str(s) if registry.contains(s) => HeadPycmd::Named(s.clone()),
        Value::List(items) => items.first().map(|f| resolve_head_value(f, registry)).unwrap_or(HeadPycmd::None),
        _ => HeadPycmd::None,
    }
}

fn detect_pycmd_head(p: &Process, ctx: &DiagnosisCtx) -> Result<HeadPycmd, ShellError> {
    let first = match p.args.first() {
        Some(a) if a.len() == 1 => a,
        _ => return Ok(HeadPycmd::None),
    };
    match &first[0] {
        ast::ArgPart::Literal(s) | ast::ArgPart::SingleQuoted(s) => {
            if ctx.registry.contains(s) {
                Ok(HeadPycmd::Named(s.clone()))
            } else {
                Ok(HeadPycmd::None)
            }
        }
        ast::ArgPart::Substitution(text) => {
            let v = resolve_substitution(text, ctx.expr_eval, ctx.globals, ctx.locals)?;
            Ok(resolve_head_value(&v, ctx.registry))
        }
        ast::ArgPart::Backquote(_) => Ok(HeadPycmd::None),
    }
}

fn diagnose_process(p: Process, ctx: &DiagnosisCtx) -> Result<Arc<Labelled>, ShellError> {
    let head = detect_pycmd_head(&p, ctx)?;
    let (mut in_type, out_type, pycmd) = match head {
        HeadPycmd::None => (IoType::St, IoType::St, None),
        HeadPycmd::Named(name) => {
            let cmd = ctx.registry.get(&name).expect("detect_pycmd_head only names registered pycmds");
            let (i, o) = (IoType::from(cmd.in_type()), IoType::from(cmd.out_type()));
            (i, o, Some(cmd))
        }
        HeadPycmd::Direct(cmd) => {
            let (i, o) = (IoType::from(cmd.in_type()), IoType::from(cmd.out_type()));
            (i, o, Some(cmd))
        }
    };

    let mut args = Vec::with_capacity(p.args.len());
    for arg in p.args {
        let (labelled_arg, arg_in) = diagnose_argument(arg, ctx)?;
        args.push(labelled_arg);
        in_type = IoType::merge(in_type, arg_in);
        if in_type == IoType::Mix {
            return Err(ShellError::ty("process argument's backquote disagrees with the process's input kind"));
        }
    }

    let mut redirects = Vec::with_capacity(p.redirects.len());
    for r in p.redirects {
        let target = match r.target {
            RedirectTarget::Dup { dst_fd } => LabelledRedirectTarget::Dup { dst_fd },
            RedirectTarget::File { target } => {
                let (t, arg_in) = diagnose_argument(target, ctx)?;
                in_type = IoType::merge(in_type, arg_in);
                if in_type == IoType::Mix {
                    return Err(ShellError::ty("redirect target's backquote disagrees with the process's input kind"));
                }
                LabelledRedirectTarget::File { target: t }
            }
            RedirectTarget::PyOut { var_name } => LabelledRedirectTarget::PyOut { var_name },
        };
        redirects.push(LabelledRedirect { append: r.append, src_fd: r.src_fd, target });
    }

    Ok(Labelled::new(LabelledNode::Process(LabelledProcess { args, redirects, pycmd }), in_type, out_type))
}

fn diagnose_argument(arg: RawArgument, ctx: &DiagnosisCtx) -> Result<(LabelledArgument, IoType), ShellError> {
    let mut out = Vec::with_capacity(arg.len());
    let mut in_type = IoType::No;
    for part in arg {
        match part {
            ast::ArgPart::Literal(s) => out.push(LabelledArgPart::Literal(s)),
            ast::ArgPart::SingleQuoted(s) => out.push(LabelledArgPart::SingleQuoted(s)),
            ast::ArgPart::Substitution(s) => out.push(LabelledArgPart::Substitution(s)),
            ast::ArgPart::Backquote(sub_ast) => {
                let sub = diagnose_node(*sub_ast, ctx)?;
                let sub = if sub.out_type == IoType::Py { wrap_proxy(sub) } else { sub };
                in_type = IoType::merge(in_type, sub.in_type);
                if in_type == IoType::Mix {
                    return Err(ShellError::ty("backquoted sub-command disagrees with the process's input kind"));
                }
                out.push(LabelledArgPart::Backquote(sub));
            }
        }
    }
    Ok((out, in_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::pycmd::{PycmdInput, PycmdOptions, PycmdOutput};
    use crate::value::MapScope;

    struct NoopExprEval;
    impl ExprEvaluator for NoopExprEval {
        fn eval(&self, expr: &str, _g: &dyn Scope, _l: &dyn Scope) -> Result<Value, ShellError> {
            Err(ShellError::eval(format!("no expression evaluator configured for {expr}")))
        }
    }

    struct PyPycmd;
    impl Pycmd for PyPycmd {
        fn call(&self, _args: &[Value], _input: PycmdInput, _options: &PycmdOptions<'_>) -> Result<PycmdOutput, ShellError> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    fn ctx<'a>(registry: &'a PycmdRegistry, expr_eval: &'a dyn ExprEvaluator, globals: &'a dyn Scope, locals: &'a dyn Scope) -> DiagnosisCtx<'a> {
        DiagnosisCtx { registry, expr_eval, globals, locals }
    }

    #[test]
    fn plain_pipeline_is_st_st_with_no_proxy() {
        let registry = PycmdRegistry::new();
        let expr_eval = NoopExprEval;
        let globals = MapScope::new();
        let locals = MapScope::new();
        let ast = parse("cat tmp.txt | grep -v b", None).unwrap();
        let labelled = diagnose(ast, &ctx(&registry, &expr_eval, &globals, &locals)).unwrap();
        assert_eq!(labelled.out_type, IoType::St);
        assert!(matches!(labelled.node, LabelledNode::BinaryOp { .. }));
    }

    #[test]
    fn pycmd_output_gets_proxied_to_bytes_at_root() {
        let mut registry = PycmdRegistry::new();
        registry.register("pycmd", Arc::new(PyPycmd));
        let expr_eval = NoopExprEval;
        let globals = MapScope::new();
        let locals = MapScope::new();
        let ast = parse("pycmd", None).unwrap();
        let labelled = diagnose(ast, &ctx(&registry, &expr_eval, &globals, &locals)).unwrap();
        assert!(matches!(labelled.node, LabelledNode::ProxyPyOutToNative(_)));
        assert_eq!(labelled.out_type, IoType::St);
    }

    #[test]
    fn pycmd_and_external_boolean_combinator_is_rejected() {
        let mut registry = PycmdRegistry::new();
        registry.register("pycmd", Arc::new(PyPycmd));
        let expr_eval = NoopExprEval;
        let globals = MapScope::new();
        let locals = MapScope::new();
        let ast = parse("pycmd && cat f", None).unwrap();
        let err = diagnose(ast, &ctx(&registry, &expr_eval, &globals, &locals)).unwrap_err();
        assert!(matches!(err, ShellError::Type { .. }));
    }
}
