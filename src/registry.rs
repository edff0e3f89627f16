// Function registry: name -> (callable, raw_args) populated once at
// evaluator construction. A name ending in `.*` claims a dotted-namespace
// group (`path.*` answers for `path.name`, `path.parent`, ...); lookup tries
// the exact name first, then strips the last `.segment` and retries against
// the `.*` form.

use crate::error::Result;
use crate::eval::Evaluator;
use crate::value::Value;
use std::collections::HashMap;

/// A built-in's calling convention: the evaluator handle, the argument
/// values (already evaluated unless the entry is `raw_args`), a parallel
/// slice recording whether each argument was itself fully resolved (no
/// remaining `$...` expressions), and the name the call was actually made
/// under (so a `.*` catch-all can dispatch on it).
pub type BuiltinFn = fn(&mut Evaluator, &[Value], &[bool], &str) -> Result<(Value, bool)>;

#[derive(Clone, Copy)]
pub struct Entry {
    pub raw_args: bool,
    pub func: BuiltinFn,
}

#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: &str, raw_args: bool, func: BuiltinFn) {
        self.entries.insert(name.to_string(), Entry { raw_args, func });
    }

    /// Exact match first, then the nearest `prefix.*` ancestor: `a.b.c` tries
    /// `a.b.c`, then `a.b.*`, then `a.*`.
    pub fn lookup(&self, name: &str) -> Option<&Entry> {
        if let Some(e) = self.entries.get(name) {
            return Some(e);
        }
        let mut rest = name;
        while let Some(dot) = rest.rfind('.') {
            rest = &rest[..dot];
            if let Some(e) = self.entries.get(&format!("{rest}.*")) {
                return Some(e);
            }
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], _name: &str) -> Result<(Value, bool)> {
        Ok((args.first().cloned().unwrap_or(Value::Null), false))
    }

    #[test]
    fn exact_name_resolves() {
        let mut reg = Registry::new();
        reg.define("add", false, noop);
        assert!(reg.lookup("add").is_some());
        assert!(reg.lookup("sub").is_none());
    }

    #[test]
    fn dotted_namespace_falls_back_to_star() {
        let mut reg = Registry::new();
        reg.define("path.*", false, noop);
        assert!(reg.lookup("path.name").is_some());
        assert!(reg.lookup("path.parent.extra").is_some());
        assert!(!reg.entries.contains_key("path.name"));
    }

    #[test]
    fn raw_args_flag_is_preserved() {
        let mut reg = Registry::new();
        reg.define("quote", true, noop);
        assert!(reg.lookup("quote").unwrap().raw_args);
    }
}
