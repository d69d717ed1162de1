//! The parser's typed AST: `Process` and `BinaryOp`/`Assign` nodes, with
//! back-quoted sub-ASTs embedded directly in arguments.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpKind {
    Semi,
    And,
    Or,
    Pipe,
}

/// One piece of an argument. A bare `backquote` token never survives to
/// this representation — the parser always replaces it with the embedded
/// sub-AST before the argument is considered finished. Double-quoted
/// literals are expanded in place by the parser's `dquote` pass before
/// reaching here, so this enum never holds a double-quoted variant.
#[derive(Debug, Clone)]
pub enum ArgPart {
    Literal(String),
    SingleQuoted(String),
    Substitution(String),
    Backquote(Box<Ast>),
}

/// Non-empty ordered sequence of argument-tokens.
pub type Argument = Vec<ArgPart>;

#[derive(Debug, Clone)]
pub enum RedirectTarget {
    /// `n>&m` / `n>>&m` duplicate form.
    Dup { dst_fd: i32 },
    /// `n>file` / `n>>file` file form.
    File { target: Argument },
    /// `=> name`, later rewritten by the executor into
    /// `(append=false, src=1, kind=pyout, target=name)`.
    PyOut { var_name: String },
}

#[derive(Debug, Clone)]
pub struct Redirect {
    pub append: bool,
    pub src_fd: i32,
    pub target: RedirectTarget,
}

#[derive(Debug, Clone, Default)]
pub struct Process {
    pub args: Vec<Argument>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone)]
pub struct BinaryOp {
    pub op: BinaryOpKind,
    pub left: Box<Ast>,
    pub right: Box<Ast>,
}

#[derive(Debug, Clone)]
pub struct Assign {
    pub cmd: Box<Ast>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum Ast {
    Process(Process),
    BinaryOp(BinaryOp),
    Assign(Assign),
}

impl Ast {
    pub fn process(p: Process) -> Self {
        Ast::Process(p)
    }

    pub fn binary(op: BinaryOpKind, left: Ast, right: Ast) -> Self {
        Ast::BinaryOp(BinaryOp { op, left: Box::new(left), right: Box::new(right) })
    }

    pub fn assign(cmd: Ast, name: impl Into<String>) -> Self {
        Ast::Assign(Assign { cmd: Box::new(cmd), name: name.into() })
    }
}
