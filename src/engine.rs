//! Embedder-facing convenience wrapper (component N): bundles a
//! [`PycmdRegistry`] and an [`ExprEvaluator`] so repeated `run()` calls don't
//! need to thread both through by hand, the way a long-lived interpreter
//! session holds its command table once and reuses it across many scripts.

use crate::error::ShellError;
use crate::eval::ExprEvaluator;
use crate::pycmd::PycmdRegistry;
use crate::task::{tasks, Captures};
use crate::tokenizer::AliasMap;
use crate::value::Scope;

/// A configured shell: a pycmd registry plus the host-expression evaluator
/// `${...}` substitutions call into. Cheap to construct once and reuse --
/// `run` takes `globals`/`locals` per call since those vary with the
/// caller's current variable bindings.
pub struct Shell<'a> {
    registry: PycmdRegistry,
    expr_eval: Box<dyn ExprEvaluator + 'a>,
}

impl<'a> Shell<'a> {
    pub fn new(registry: PycmdRegistry, expr_eval: impl ExprEvaluator + 'a) -> Self {
        Self { registry, expr_eval: Box::new(expr_eval) }
    }

    pub fn registry(&self) -> &PycmdRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PycmdRegistry {
        &mut self.registry
    }

    /// Diagnoses and executes `cmd_string`, returning its `-> name` /
    /// `=> name` captures.
    pub fn run(
        &self,
        cmd_string: &str,
        globals: &dyn Scope,
        locals: &dyn Scope,
        alias_map: Option<&AliasMap>,
    ) -> Result<Captures, ShellError> {
        tasks::run(cmd_string, &self.registry, self.expr_eval.as_ref(), globals, locals, alias_map)
    }
}

/// An [`ExprEvaluator`] that always fails, for embedders with no `${...}`
/// expression language of their own -- `$NAME` substitutions still resolve
/// fine through [`crate::eval::resolve_name`], since that path never calls
/// into this evaluator.
pub struct NoExprEvaluator;

impl ExprEvaluator for NoExprEvaluator {
    fn eval(&self, expr: &str, _globals: &dyn Scope, _locals: &dyn Scope) -> Result<crate::value::Value, ShellError> {
        Err(ShellError::eval(format!("no ${{...}} expression evaluator configured (got {expr:?})")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MapScope;

    #[test]
    fn shell_run_round_trips_a_capture() {
        let shell = Shell::new(PycmdRegistry::new(), NoExprEvaluator);
        let globals = MapScope::new();
        let locals = MapScope::new();
        let captures = shell.run("true -> rc", &globals, &locals, None).unwrap();
        assert!(captures.contains_key("rc"));
    }
}
