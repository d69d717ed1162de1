//! Small example pycmds used by tests and the `hshell` CLI's default
//! registry. Not the built-in pycmd library the core treats as out of
//! scope — just enough concrete implementations to exercise the
//! interface contract end to end, reimplemented from the original's
//! `pycmd_map`/`pycmd_filter`/`pycmd_cd`.

use std::io::{BufRead, BufReader};

use super::{DeclaredKind, Pycmd, PycmdInput, PycmdOptions, PycmdOutput};
use crate::error::ShellError;
use crate::value::Value;

fn input_to_values(input: PycmdInput) -> Result<Vec<Value>, ShellError> {
    match input {
        PycmdInput::Objects(iter) => Ok(iter.collect()),
        PycmdInput::Bytes(r) => {
            let mut out = Vec::new();
            for line in BufReader::new(r).lines() {
                out.push(Value::Str(line.map_err(ShellError::from)?));
            }
            Ok(out)
        }
        PycmdInput::None => Ok(Vec::new()),
    }
}

fn callable_arg(args: &[Value]) -> Result<Value, ShellError> {
    args.get(1)
        .cloned()
        .ok_or_else(|| ShellError::eval("map/filter require a callable argument"))
}

fn invoke(callable: &Value, arg: Value) -> Result<Value, ShellError> {
    match callable {
        Value::Callable(f) => f.call(arg),
        Value::Pycmd(p) => {
            let empty = crate::value::MapScope::new();
            let out = p.call(&[arg], PycmdInput::None, &PycmdOptions::new(&empty, &empty))?;
            Ok(out.into_iter().next().unwrap_or(Value::None))
        }
        other => Err(ShellError::ty(format!("{other:?} is not callable"))),
    }
}

/// `map <callable>`: applies a callable to every input object.
pub struct Map;

impl Pycmd for Map {
    fn call(&self, args: &[Value], input: PycmdInput, _options: &PycmdOptions<'_>) -> Result<PycmdOutput, ShellError> {
        let f = callable_arg(args)?;
        let items = input_to_values(input)?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(invoke(&f, item)?);
        }
        Ok(Box::new(out.into_iter()))
    }
}

/// `filter <callable>`: keeps input objects for which the callable
/// returns a truthy `Bool`.
pub struct Filter;

impl Pycmd for Filter {
    fn call(&self, args: &[Value], input: PycmdInput, _options: &PycmdOptions<'_>) -> Result<PycmdOutput, ShellError> {
        let cond = callable_arg(args)?;
        let items = input_to_values(input)?;
        let mut out = Vec::new();
        for item in items {
            let keep = match invoke(&cond, item.clone())? {
                Value::Bool(b) => b,
                Value::None => false,
                _ => true,
            };
            if keep {
                out.push(item);
            }
        }
        Ok(Box::new(out.into_iter()))
    }
}

/// `cd <path>`: changes the process working directory. Declared
/// `outType=No`: it must produce no elements.
pub struct Cd;

impl Pycmd for Cd {
    fn out_type(&self) -> DeclaredKind {
        DeclaredKind::No
    }

    fn call(&self, args: &[Value], _input: PycmdInput, _options: &PycmdOptions<'_>) -> Result<PycmdOutput, ShellError> {
        let target = args
            .get(1)
            .map(Value::to_display_string)
            .ok_or_else(|| ShellError::eval("cd requires a path argument"))?;
        std::env::set_current_dir(&target).map_err(|e| ShellError::exec(format!("cd {target}: {e}")))?;
        Ok(Box::new(std::iter::empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MapScope;
    use std::sync::Arc;

    #[test]
    fn map_applies_callable() {
        let globals = MapScope::new();
        let locals = MapScope::new();
        let options = PycmdOptions::new(&globals, &locals);
        let double: Arc<dyn crate::value::HostCallable> = Arc::new(|v: Value| match v {
            Value::Int(n) => Ok(Value::Int(n * 2)),
            other => Ok(other),
        });
        let args = vec![Value::Str("map".into()), Value::Callable(double)];
        let input = PycmdInput::Objects(Box::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)].into_iter()));
        let out: Vec<Value> = Map.call(&args, input, &options).unwrap().collect();
        let ints: Vec<i64> = out
            .into_iter()
            .map(|v| match v {
                Value::Int(n) => n,
                _ => panic!("expected int"),
            })
            .collect();
        assert_eq!(ints, vec![2, 4, 6]);
    }

    #[test]
    fn filter_keeps_truthy() {
        let globals = MapScope::new();
        let locals = MapScope::new();
        let options = PycmdOptions::new(&globals, &locals);
        let even: Arc<dyn crate::value::HostCallable> = Arc::new(|v: Value| match v {
            Value::Int(n) => Ok(Value::Bool(n % 2 == 0)),
            _ => Ok(Value::Bool(false)),
        });
        let args = vec![Value::Str("filter".into()), Value::Callable(even)];
        let input = PycmdInput::Objects(Box::new(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)].into_iter()));
        let out: Vec<Value> = Filter.call(&args, input, &options).unwrap().collect();
        assert_eq!(out.len(), 2);
    }
}
