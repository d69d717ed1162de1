//! Name -> callable table. Read-only once a `run` begins; registration
//! must complete beforehand.

use std::collections::HashMap;
use std::sync::Arc;

use super::Pycmd;

#[derive(Default)]
pub struct PycmdRegistry {
    entries: HashMap<String, Arc<dyn Pycmd>>,
}

impl PycmdRegistry {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    pub fn register(&mut self, name: impl Into<String>, cmd: Arc<dyn Pycmd>) {
        self.entries.insert(name.into(), cmd);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Pycmd>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pycmd::{DeclaredKind, PycmdInput, PycmdOptions, PycmdOutput};
    use crate::error::ShellError;
    use crate::value::Value;

    struct Noop;
    impl Pycmd for Noop {
        fn out_type(&self) -> DeclaredKind {
            DeclaredKind::No
        }
        fn call(&self, _args: &[Value], _input: PycmdInput, _options: &PycmdOptions<'_>) -> Result<PycmdOutput, ShellError> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = PycmdRegistry::new();
        reg.register("noop", Arc::new(Noop));
        assert!(reg.contains("noop"));
        assert!(!reg.contains("missing"));
        assert!(reg.get("noop").is_some());
    }
}
