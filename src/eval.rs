//! Argument evaluator (component G): resolves substitutions, decides
//! whether an argument is globbable, and performs the scalar or glob
//! evaluation path. Backquote resolution is *not* handled here -- it
//! requires running a sub-AST, which only the task runner can do -- so
//! callers are expected to have already rewritten any `ArgPart::Backquote`
//! parts into plain literal words (one `LiteralArgPart::SingleQuoted` per
//! collected word) before calling [`evaluate_argument`].

use std::sync::Arc;

use glob::{glob_with, MatchOptions};

use crate::error::ShellError;
use crate::value::{Scope, Value};

/// Host-expression evaluator callback: evaluates `${expr}`'s inner text
/// against a composed scope. Free names inside the expression are the
/// host's problem to resolve (environment / globals / locals composition
/// is up to the callback); `$NAME` substitutions, which are plain name
/// lookups rather than expressions, are resolved directly by
/// [`resolve_name`] instead.
pub trait ExprEvaluator: Send + Sync {
    fn eval(&self, expr: &str, globals: &dyn Scope, locals: &dyn Scope) -> Result<Value, ShellError>;
}

/// An argument-part with any backquotes already resolved to plain words,
/// the shape [`evaluate_argument`] consumes.
#[derive(Debug, Clone)]
pub enum LiteralArgPart {
    Literal(String),
    SingleQuoted(String),
    Substitution(String),
}

/// Result of evaluating one argument.
#[derive(Debug, Clone)]
pub enum EvaluatedArg {
    /// A single scalar value. Preserves the native `Value` type when the
    /// argument was exactly one substitution piece (so a `$xs` that
    /// resolves to a list stays a list downstream); otherwise it is the
    /// stringified, tilde-expanded concatenation of every piece.
    Scalar(Value),
    /// The sorted result of glob-expanding a globbable argument. Empty
    /// when no path matched.
    Words(Vec<String>),
}

/// `locals`, then `globals`, then the process environment -- the same
/// precedence order `pysh`'s `VarDict.__getitem__` applies.
pub fn resolve_name(name: &str, globals: &dyn Scope, locals: &dyn Scope) -> Option<Value> {
    locals
        .get(name)
        .or_else(|| globals.get(name))
        .or_else(|| std::env::var(name).ok().map(Value::Str))
}

/// Dispatches a substitution token's text (`$NAME` or `${expr}`) to name
/// resolution or the expression evaluator callback.
pub fn resolve_substitution(
    text: &str,
    expr_eval: &dyn ExprEvaluator,
    globals: &dyn Scope,
    locals: &dyn Scope,
) -> Result<Value, ShellError> {
    if let Some(inner) = text.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        return expr_eval.eval(inner, globals, locals);
    }
    let name = text.strip_prefix('$').unwrap_or(text);
    resolve_name(name, globals, locals).ok_or_else(|| ShellError::eval(format!("undefined variable: {name}")))
}

fn tilde_expand(s: &str) -> String {
    if let Some(rest) = s.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Some(home) = std::env::var_os("HOME") {
                return format!("{}{}", home.to_string_lossy(), rest);
            }
        }
    }
    s.to_string()
}

/// True if any *literal* piece (not a substitution) contains a glob
/// metacharacter. Substitution-derived text never makes an argument
/// globbable on its own -- its `*`/`?` characters are protected in the
/// glob path instead.
fn has_glob_pattern(parts: &[LiteralArgPart]) -> bool {
    parts.iter().any(|p| match p {
        LiteralArgPart::Literal(s) | LiteralArgPart::SingleQuoted(s) => s.contains('*') || s.contains('?'),
        LiteralArgPart::Substitution(_) => false,
    })
}

/// Escapes `*`/`?` so they match literally in a glob pattern, used to
/// protect characters that came from a substitution rather than from the
/// literal source text.
fn escape_glob_metachars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '*' => out.push_str("[*]"),
            '?' => out.push_str("[?]"),
            '[' => out.push_str("[[]"),
            _ => out.push(c),
        }
    }
    out
}

fn stringify(v: &Value) -> String {
    v.to_display_string()
}

/// Evaluates one fully-resolved argument (backquotes already replaced by
/// literal words) following spec.md 4.G steps 2-5.
pub fn evaluate_argument(
    parts: &[LiteralArgPart],
    expr_eval: &dyn ExprEvaluator,
    globals: &dyn Scope,
    locals: &dyn Scope,
) -> Result<EvaluatedArg, ShellError> {
    if has_glob_pattern(parts) {
        return evaluate_glob_path(parts, expr_eval, globals, locals);
    }
    evaluate_scalar_path(parts, expr_eval, globals, locals)
}

fn evaluate_scalar_path(
    parts: &[LiteralArgPart],
    expr_eval: &dyn ExprEvaluator,
    globals: &dyn Scope,
    locals: &dyn Scope,
) -> Result<EvaluatedArg, ShellError> {
    if parts.len() == 1 {
        let value = match &parts[0] {
            LiteralArgPart::Literal(s) => Value::Str(tilde_expand(s)),
            LiteralArgPart::SingleQuoted(s) => Value::Str(s.clone()),
            LiteralArgPart::Substitution(text) => resolve_substitution(text, expr_eval, globals, locals)?,
        };
        // A substitution that resolved to a bare string still gets
        // tilde-expanded; any other native type (list, callable, ...)
        // passes through untouched.
        let value = match value {
            Value::Str(s) => Value::Str(tilde_expand(&s)),
            other => other,
        };
        return Ok(EvaluatedArg::Scalar(value));
    }

    let mut out = String::new();
    for part in parts {
        match part {
            LiteralArgPart::Literal(s) | LiteralArgPart::SingleQuoted(s) => out.push_str(s),
            LiteralArgPart::Substitution(text) => {
                let v = resolve_substitution(text, expr_eval, globals, locals)?;
                out.push_str(&stringify(&v));
            }
        }
    }
    Ok(EvaluatedArg::Scalar(Value::Str(tilde_expand(&out))))
}

fn evaluate_glob_path(
    parts: &[LiteralArgPart],
    expr_eval: &dyn ExprEvaluator,
    globals: &dyn Scope,
    locals: &dyn Scope,
) -> Result<EvaluatedArg, ShellError> {
    let mut pattern = String::new();
    for part in parts {
        match part {
            LiteralArgPart::Literal(s) | LiteralArgPart::SingleQuoted(s) => pattern.push_str(s),
            LiteralArgPart::Substitution(text) => {
                let v = resolve_substitution(text, expr_eval, globals, locals)?;
                pattern.push_str(&escape_glob_metachars(&stringify(&v)));
            }
        }
    }
    let pattern = tilde_expand(&pattern);

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let mut matches: Vec<String> = glob_with(&pattern, options)
        .map_err(|e| ShellError::eval(format!("invalid glob pattern {pattern:?}: {e}")))?
        .filter_map(|entry| entry.ok())
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    matches.sort();
    Ok(EvaluatedArg::Words(matches))
}

/// Stringifies a `Value` for inclusion in an external argv, expanding
/// lists/tuples element-wise the way the host-expression evaluator's
/// stringify contract (spec.md 6) requires.
pub fn expand_for_argv(value: &Value) -> Vec<String> {
    match value {
        Value::List(items) => items.iter().flat_map(expand_for_argv).collect(),
        other => vec![stringify(other)],
    }
}

/// `EvaluatedArg` reduced to the words it contributes to a process's argv.
pub fn evaluated_arg_to_words(arg: &EvaluatedArg) -> Vec<String> {
    match arg {
        EvaluatedArg::Scalar(v) => expand_for_argv(v),
        EvaluatedArg::Words(words) => words.clone(),
    }
}

/// Resolves a registered pycmd, if `value` (or the head of a list whose
/// first element does) names one. Mirrors the diagnoser's head-resolution
/// rule, reused by the executor when a substitution's resolved value
/// should act as a pycmd.
pub fn as_pycmd(value: &Value, registry: &crate::pycmd::PycmdRegistry) -> Option<Arc<dyn crate::pycmd::Pycmd>> {
    match value {
        Value::Pycmd(p) => Some(p.clone()),
        Value::Str(s) => registry.get(s),
        Value::List(items) => items.first().and_then(|v| as_pycmd(v, registry)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MapScope;

    struct NoopExprEval;
    impl ExprEvaluator for NoopExprEval {
        fn eval(&self, expr: &str, _g: &dyn Scope, _l: &dyn Scope) -> Result<Value, ShellError> {
            Err(ShellError::eval(format!("no expression evaluator configured for {expr}")))
        }
    }

    #[test]
    fn single_substitution_preserves_native_type() {
        let mut locals = MapScope::new();
        locals.insert("xs", Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        let globals = MapScope::new();
        let expr_eval = NoopExprEval;
        let parts = vec![LiteralArgPart::Substitution("$xs".to_string())];
        let result = evaluate_argument(&parts, &expr_eval, &globals, &locals).unwrap();
        match result {
            EvaluatedArg::Scalar(Value::List(items)) => assert_eq!(items.len(), 3),
            other => panic!("expected preserved list, got {other:?}"),
        }
    }

    /// Looks a name up in `locals`/`globals` directly, so `${name}` behaves
    /// like a trivial expression language that is just name lookup.
    struct LookupExprEval;
    impl ExprEvaluator for LookupExprEval {
        fn eval(&self, expr: &str, globals: &dyn Scope, locals: &dyn Scope) -> Result<Value, ShellError> {
            resolve_name(expr, globals, locals).ok_or_else(|| ShellError::eval(format!("undefined expression: {expr}")))
        }
    }

    #[test]
    fn concatenated_substitutions_stringify() {
        let mut locals = MapScope::new();
        locals.insert("x", Value::Str("a".to_string()));
        locals.insert("y", Value::Str("b".to_string()));
        let globals = MapScope::new();
        let expr_eval = LookupExprEval;
        let parts = vec![
            LiteralArgPart::Substitution("${x}".to_string()),
            LiteralArgPart::Substitution("$y".to_string()),
        ];
        let result = evaluate_argument(&parts, &expr_eval, &globals, &locals).unwrap();
        match result {
            EvaluatedArg::Scalar(Value::Str(s)) => assert_eq!(s, "ab"),
            other => panic!("expected scalar string, got {other:?}"),
        }
    }

    #[test]
    fn undefined_substitution_is_eval_error() {
        let globals = MapScope::new();
        let locals = MapScope::new();
        let expr_eval = NoopExprEval;
        let parts = vec![LiteralArgPart::Substitution("$missing".to_string())];
        let err = evaluate_argument(&parts, &expr_eval, &globals, &locals).unwrap_err();
        assert!(matches!(err, ShellError::Eval { .. }));
    }

    #[test]
    fn glob_with_no_matches_yields_empty_words() {
        let globals = MapScope::new();
        let locals = MapScope::new();
        let expr_eval = NoopExprEval;
        let parts = vec![LiteralArgPart::Literal("/definitely/not/a/real/path/*.nope".to_string())];
        let result = evaluate_argument(&parts, &expr_eval, &globals, &locals).unwrap();
        match result {
            EvaluatedArg::Words(words) => assert!(words.is_empty()),
            other => panic!("expected Words, got {other:?}"),
        }
    }

    #[test]
    fn expand_for_argv_flattens_lists() {
        let v = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(expand_for_argv(&v), vec!["1", "2", "3"]);
    }
}
