// Environment: the evaluator's variable state, held as a handful of
// fixed fields (`top`, `locals`, `globals`, ...) rather than as entries in
// the document being evaluated. Reserved document keys only exist to load
// and unload these fields; user data never sees them.

use crate::value::Value;
use std::collections::HashMap;
use std::collections::HashSet;

/// One scope frame: its bindings plus the subset that has already been
/// evaluated (vs. still holding a raw, unevaluated definition).
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub vars: HashMap<String, Value>,
    pub evaluated: HashSet<String>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value, evaluated: bool) {
        let name = name.into();
        if evaluated {
            self.evaluated.insert(name.clone());
        } else {
            self.evaluated.remove(&name);
        }
        self.vars.insert(name, value);
    }

    pub fn mark_evaluated(&mut self, name: &str) {
        self.evaluated.insert(name.to_string());
    }

    pub fn is_evaluated(&self, name: &str) -> bool {
        self.evaluated.contains(name)
    }
}

/// The five variable kinds named in the document model, distinguished by
/// their scoping and lifetime rules (see `Environment` docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Locals,
    Globals,
    Runtime,
    FuncLocals,
    FuncGlobals,
}

/// One binding pushed for key-expansion contexts (`@ctx`, `@key`, `@value`).
/// `suffix` disambiguates nested expansions of the same name, e.g. `@key`,
/// `@key1`, `@key2`.
#[derive(Debug, Clone)]
pub struct CtxBinding {
    pub ctx: Value,
    pub key: Value,
    pub value: Value,
}

/// Evaluator-local variable state. Locals and func-locals are LIFO stacks of
/// `Frame`s (one per nested map scope); globals, func-globals and runtime
/// variables are flat and flow outward from wherever they're defined,
/// persisting for the remainder of the document walk.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// `@top`: the document root, fixed once at evaluator construction.
    pub top: Value,
    /// `@loc` / `@loc-s` / `@loc-eval-s`.
    pub locals: Vec<Frame>,
    /// `@glo`.
    pub globals: Frame,
    /// `@rtv`.
    pub runtime: Frame,
    /// `@func-loc` / `@func-loc-s`.
    pub func_locals: Vec<Frame>,
    /// `@func-glo`.
    pub func_globals: Frame,
    ctx_stack: Vec<CtxBinding>,
}

impl Environment {
    pub fn new(top: Value) -> Self {
        Environment { top, ..Default::default() }
    }

    pub fn push_locals(&mut self) {
        self.locals.push(Frame::new());
    }

    pub fn pop_locals(&mut self) -> Option<Frame> {
        self.locals.pop()
    }

    pub fn push_func_locals(&mut self) {
        self.func_locals.push(Frame::new());
    }

    pub fn pop_func_locals(&mut self) -> Option<Frame> {
        self.func_locals.pop()
    }

    pub fn frame_mut(&mut self, kind: VarKind) -> &mut Frame {
        match kind {
            VarKind::Locals => self.locals.last_mut().expect("locals frame must be pushed before use"),
            VarKind::Globals => &mut self.globals,
            VarKind::Runtime => &mut self.runtime,
            VarKind::FuncLocals => self.func_locals.last_mut().expect("func-locals frame must be pushed before use"),
            VarKind::FuncGlobals => &mut self.func_globals,
        }
    }

    /// Lookup order mandated by the reference resolver: innermost locals
    /// frame, then globals, then runtime vars, then innermost func-locals
    /// frame, then func-globals.
    pub fn lookup(&self, name: &str) -> Option<(&Value, VarKind)> {
        if let Some(frame) = self.locals.last() {
            if let Some(v) = frame.get(name) {
                return Some((v, VarKind::Locals));
            }
        }
        if let Some(v) = self.globals.get(name) {
            return Some((v, VarKind::Globals));
        }
        if let Some(v) = self.runtime.get(name) {
            return Some((v, VarKind::Runtime));
        }
        if let Some(frame) = self.func_locals.last() {
            if let Some(v) = frame.get(name) {
                return Some((v, VarKind::FuncLocals));
            }
        }
        if let Some(v) = self.func_globals.get(name) {
            return Some((v, VarKind::FuncGlobals));
        }
        None
    }

    pub fn is_evaluated(&self, name: &str, kind: VarKind) -> bool {
        match kind {
            VarKind::Locals => self.locals.last().map(|f| f.is_evaluated(name)).unwrap_or(false),
            VarKind::Globals => self.globals.is_evaluated(name),
            VarKind::Runtime => self.runtime.is_evaluated(name),
            VarKind::FuncLocals => self.func_locals.last().map(|f| f.is_evaluated(name)).unwrap_or(false),
            VarKind::FuncGlobals => self.func_globals.is_evaluated(name),
        }
    }

    pub fn push_ctx(&mut self, ctx: Value, key: Value, value: Value) -> usize {
        let suffix = self.ctx_stack.len();
        self.ctx_stack.push(CtxBinding { ctx, key, value });
        suffix
    }

    pub fn pop_ctx(&mut self) {
        self.ctx_stack.pop();
    }

    /// Resolve `@ctx`, `@key`, `@value` and their numbered variants
    /// (`@key1`, `@key2`, ...) against the binding stack, innermost first.
    pub fn lookup_ctx(&self, name: &str) -> Option<&Value> {
        let (base, suffix) = split_ctx_suffix(name)?;
        let depth = self.ctx_stack.len();
        if suffix >= depth {
            return None;
        }
        let binding = &self.ctx_stack[depth - 1 - suffix];
        match base {
            "ctx" => Some(&binding.ctx),
            "key" => Some(&binding.key),
            "value" => Some(&binding.value),
            _ => None,
        }
    }
}

fn split_ctx_suffix(name: &str) -> Option<(&str, usize)> {
    for base in ["ctx", "key", "value"] {
        if let Some(rest) = name.strip_prefix(base) {
            if rest.is_empty() {
                return Some((base, 0));
            }
            if let Ok(n) = rest.parse::<usize>() {
                return Some((base, n));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_order_is_locals_then_globals_then_runtime() {
        let mut env = Environment::new(Value::Null);
        env.runtime.set("x", Value::Int(1), true);
        env.globals.set("x", Value::Int(2), true);
        env.push_locals();
        env.frame_mut(VarKind::Locals).set("x", Value::Int(3), true);

        let (v, kind) = env.lookup("x").unwrap();
        assert_eq!(*v, Value::Int(3));
        assert_eq!(kind, VarKind::Locals);

        env.pop_locals();
        let (v, kind) = env.lookup("x").unwrap();
        assert_eq!(*v, Value::Int(2));
        assert_eq!(kind, VarKind::Globals);
    }

    #[test]
    fn ctx_bindings_nest_with_numeric_suffix() {
        let mut env = Environment::new(Value::Null);
        env.push_ctx(Value::Int(0), Value::String("a".into()), Value::Int(10));
        env.push_ctx(Value::Int(1), Value::String("b".into()), Value::Int(20));

        assert_eq!(env.lookup_ctx("key"), Some(&Value::String("b".into())));
        assert_eq!(env.lookup_ctx("key1"), Some(&Value::String("a".into())));
        assert_eq!(env.lookup_ctx("value"), Some(&Value::Int(20)));
    }
}
