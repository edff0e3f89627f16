// Evaluator: the recursive walker over maps, lists and strings that ties the
// tokenizer, splitter, registry, reference resolver and lambda engine
// together. Owns the environment and produces a fully-reduced document tree.

use crate::env::{Environment, VarKind};
use crate::error::{Error, ErrorKind, Result, Warnings};
use crate::lambda;
use crate::registry::Registry;
use crate::sandbox::Sandbox;
use crate::splitter::{classify, split_commas, split_path, ArgKind};
use crate::tokenizer::{tokenize, Match};
use crate::value::{self, Value};
use indexmap::IndexMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};

const MAX_STRING_PASSES: usize = 64;

/// The result of evaluating one node: its value, whether it is flagged
/// literal (don't rescan the substituted region for further expressions),
/// and whether it is pending (could not be fully resolved this pass).
#[derive(Debug, Clone)]
pub struct EvalResult {
    pub value: Value,
    pub is_literal: bool,
    pub pending: bool,
}

impl EvalResult {
    fn done(value: Value) -> Self {
        EvalResult { value, is_literal: false, pending: false }
    }

    fn literal(value: Value) -> Self {
        EvalResult { value, is_literal: true, pending: false }
    }

    fn pending(value: Value) -> Self {
        EvalResult { value, is_literal: false, pending: true }
    }
}

/// Loads the document referenced by an `__includes__` path. Kept as an
/// injected callback rather than a hard filesystem dependency, since loading
/// documents from disk is a collaborator at the boundary, not core behavior.
pub type IncludeLoader = dyn Fn(&str) -> Result<Value>;

pub struct Evaluator {
    pub env: Environment,
    pub registry: Registry,
    pub warnings: Warnings,
    /// Cleared the moment any reference or function call fails to resolve;
    /// inspected by callers after a top-level `process` call.
    pub fully_processed: bool,
    pub os_name: String,
    pub host_name: String,
    include_stack: Vec<String>,
    var_chain: Vec<String>,
    loader: Option<Box<IncludeLoader>>,
    sandbox: Option<Sandbox>,
    rand_generators: HashMap<String, ChaCha8Rng>,
    rand_next_id: u64,
}

impl Evaluator {
    pub fn new(top: Value, registry: Registry) -> Self {
        Evaluator {
            env: Environment::new(top),
            registry,
            warnings: Warnings::new(),
            fully_processed: true,
            os_name: std::env::consts::OS.to_string(),
            host_name: String::new(),
            include_stack: Vec::new(),
            var_chain: Vec::new(),
            loader: None,
            sandbox: None,
            rand_generators: HashMap::new(),
            rand_next_id: 0,
        }
    }

    pub fn set_platform(&mut self, os_name: impl Into<String>, host_name: impl Into<String>) {
        self.os_name = os_name.into();
        self.host_name = host_name.into();
    }

    pub fn set_include_loader(&mut self, loader: impl Fn(&str) -> Result<Value> + 'static) {
        self.loader = Some(Box::new(loader));
    }

    pub fn set_sandbox(&mut self, sandbox: Sandbox) {
        self.sandbox = Some(sandbox);
    }

    /// Filesystem builtins call this to reach the capability-sandboxed root;
    /// fails fast rather than falling back to unsandboxed std::fs access.
    pub fn sandbox(&self) -> Result<&Sandbox> {
        self.sandbox.as_ref().ok_or_else(|| {
            Error::fatal(ErrorKind::FunctionMessage {
                func: "file".into(),
                message: "no sandbox configured for file access".into(),
            })
        })
    }

    /// Creates a new named PRNG stream seeded from `seed` and returns an
    /// opaque handle. Callers must treat the handle as an opaque token (see
    /// the rand.* design notes) and only ever round-trip it back through
    /// `rand_with`.
    pub fn rand_new(&mut self, seed: u64) -> String {
        let id = self.rand_next_id;
        self.rand_next_id += 1;
        let handle = format!("rand:{id}:{seed}");
        self.rand_generators.insert(handle.clone(), ChaCha8Rng::seed_from_u64(seed));
        handle
    }

    pub fn rand_with<T>(&mut self, handle: &str, f: impl FnOnce(&mut ChaCha8Rng) -> T) -> Result<T> {
        let rng = self.rand_generators.get_mut(handle).ok_or_else(|| {
            Error::fatal(ErrorKind::FunctionMessage {
                func: "rand".into(),
                message: format!("unknown generator handle '{handle}'"),
            })
        })?;
        Ok(f(rng))
    }

    /// `Process(data)`: evaluate `data` to a fixed point and return the
    /// result. `fully_processed` reflects whether every reference/call in
    /// the document resolved.
    pub fn process(&mut self, data: Value) -> Result<Value> {
        self.fully_processed = true;
        let r = self.eval_value(&data)?;
        Ok(r.value)
    }

    /// `ToString(value, indent)`: canonical JSON dump.
    pub fn to_string_canonical(value: &Value, indent: usize) -> String {
        value.to_json_string(Some(indent))
    }

    /// `ExecFunc(name, *args)`: direct registry dispatch with already-
    /// processed arguments.
    /// Fully evaluates `v` to a fixed point without changing `process`'s
    /// top-level fully-processed tracking semantics (a lambda caller uses
    /// this to resolve the value a `lambda::apply` substitution produced).
    pub fn eval_to_value(&mut self, v: &Value) -> Result<Value> {
        Ok(self.eval_value(v)?.value)
    }

    pub fn exec_func(&mut self, name: &str, args: &[Value]) -> Result<(Value, bool)> {
        let entry = *self
            .registry
            .lookup(name)
            .ok_or_else(|| Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "not found".into() }))?;
        let flags = vec![true; args.len()];
        (entry.func)(self, args, &flags, name)
    }

    pub fn add_runtime_vars(&mut self, vars: IndexMap<String, Value>, evaluated: &HashSet<String>) {
        for (k, v) in vars {
            let is_eval = evaluated.contains(&k);
            self.env.runtime.set(k, v, is_eval);
        }
    }

    pub fn get_runtime_vars(&self) -> &std::collections::HashMap<String, Value> {
        &self.env.runtime.vars
    }

    pub fn get_runtime_var_eval_set(&self) -> &HashSet<String> {
        &self.env.runtime.evaluated
    }

    fn mark_unresolved(&mut self) {
        self.fully_processed = false;
    }

    // -- node dispatch --------------------------------------------------

    fn eval_value(&mut self, v: &Value) -> Result<EvalResult> {
        match v {
            Value::Map(m) => self.eval_map(m),
            Value::List(l) => self.eval_list(l),
            Value::String(s) => self.eval_string(s),
            other => Ok(EvalResult::done(other.clone())),
        }
    }

    fn eval_list(&mut self, items: &[Value]) -> Result<EvalResult> {
        if let Some(Value::String(tag)) = items.first() {
            if tag == "__lambda__" {
                let body = if items.len() == 2 { items[1].clone() } else { Value::List(items[1..].to_vec()) };
                let inner = lambda::to_lambda_string(&body);
                return Ok(EvalResult::literal(Value::String(format!("$L{{$*{{^{inner}}}}}"))));
            }
        }
        let mut out = Vec::with_capacity(items.len());
        let mut pending = false;
        for (i, item) in items.iter().enumerate() {
            let r = self.eval_value(item).map_err(|e| e.wrap(ErrorKind::ArgListElement { index: i }))?;
            pending |= r.pending;
            out.push(r.value);
        }
        if pending {
            self.mark_unresolved();
        }
        Ok(EvalResult { value: Value::List(out), is_literal: false, pending })
    }

    // -- map node ---------------------------------------------------------

    fn eval_map(&mut self, m: &IndexMap<String, Value>) -> Result<EvalResult> {
        let mut m = self.apply_platform_overlay(m.clone())?;
        self.apply_includes(&mut m)?;
        self.apply_pre(&mut m)?;

        self.env.push_locals();
        self.env.push_func_locals();

        let result = self.eval_map_body(&mut m);

        self.env.pop_func_locals();
        self.env.pop_locals();

        let (out, pending) = result?;
        Ok(EvalResult { value: Value::Map(out), is_literal: false, pending })
    }

    fn apply_platform_overlay(&self, mut m: IndexMap<String, Value>) -> Result<IndexMap<String, Value>> {
        let Some(platform) = m.shift_remove(value::KEY_PLATFORM) else {
            return Ok(m);
        };
        let Value::Map(table) = platform else {
            return Err(Error::fatal(ErrorKind::Message("__platform__ must be a map".into())));
        };
        let Some(os_entry) = table.get(&self.os_name) else {
            return Ok(m);
        };
        let Value::Map(os_map) = os_entry else {
            return Err(Error::fatal(ErrorKind::Message("__platform__ OS entry must be a map".into())));
        };
        for (glob, node) in os_map {
            if !glob_match(glob, &self.host_name) {
                continue;
            }
            let Value::Map(node_map) = node else {
                return Err(Error::fatal(ErrorKind::Message("__platform__ host entry must be a map".into())));
            };
            if let Some(Value::Map(data)) = node_map.get("__data__") {
                for (k, v) in data {
                    m.insert(k.clone(), v.clone());
                }
            }
            break;
        }
        Ok(m)
    }

    fn apply_includes(&mut self, m: &mut IndexMap<String, Value>) -> Result<()> {
        let Some(includes) = m.shift_remove(value::KEY_INCLUDES) else {
            return Ok(());
        };
        let Value::List(paths) = includes else {
            return Err(Error::fatal(ErrorKind::Message("__includes__ must be a list".into())));
        };
        for path_node in paths {
            let path_str = self.eval_value(&path_node)?.value;
            let path = path_str.to_string();
            if self.include_stack.contains(&path) {
                return Err(Error::fatal(ErrorKind::Message(format!("cyclic include: {path}"))));
            }
            let Some(loader) = self.loader.as_ref() else {
                return Err(Error::fatal(ErrorKind::FunctionMessage {
                    func: "__includes__".into(),
                    message: format!("no include loader configured for '{path}'"),
                }));
            };
            let doc = loader(&path)?;
            self.include_stack.push(path.clone());
            let evaluated = self.eval_value(&doc);
            self.include_stack.pop();
            let Value::Map(included) = evaluated?.value else {
                return Err(Error::fatal(ErrorKind::Message(format!("include '{path}' did not evaluate to a map"))));
            };
            for (k, v) in included {
                m.entry(k).or_insert(v);
            }
        }
        Ok(())
    }

    fn apply_pre(&mut self, m: &mut IndexMap<String, Value>) -> Result<()> {
        let Some(pre) = m.shift_remove(value::KEY_PRE) else {
            return Ok(());
        };
        let evaluated = self.eval_value(&pre)?.value;
        let Value::Map(pre_map) = evaluated else {
            return Err(Error::fatal(ErrorKind::Message("__pre__ must evaluate to a map".into())));
        };
        for (k, v) in pre_map {
            if value::VAR_BLOCK_KEYS.contains(&k.as_str()) {
                merge_var_block(m, &k, v)?;
            } else {
                m.entry(k).or_insert(v);
            }
        }
        Ok(())
    }

    fn eval_map_body(&mut self, m: &mut IndexMap<String, Value>) -> Result<(IndexMap<String, Value>, bool)> {
        self.install_var_blocks(m)?;
        self.evaluate_var_blocks()?;

        let mut out = IndexMap::new();
        let mut pending = false;
        for (k, v) in m.iter() {
            if value::is_reserved_key(k) || k.as_str() == "__eval_globals__" || k.as_str() == "__eval_locals__" {
                continue;
            }
            let (entries, key_pending) = self.eval_key_and_value(k, v)?;
            pending |= key_pending;
            for (ck, cv) in entries {
                out.insert(ck, cv);
            }
        }
        Ok((out, pending))
    }

    fn install_var_blocks(&mut self, m: &IndexMap<String, Value>) -> Result<()> {
        let locals = merged_block(m, value::KEY_LOCALS, "__eval_locals__")?;
        let globals = merged_block(m, value::KEY_GLOBALS, "__eval_globals__")?;
        let func_globals = plain_block(m, value::KEY_FUNC_GLOBALS)?;
        let func_locals = plain_block(m, value::KEY_FUNC_LOCALS)?;
        let runtime = plain_block(m, value::KEY_RUNTIME_VARS)?;

        check_disjoint(&globals, &func_globals, "__globals__", "__func_globals__")?;
        check_disjoint(&locals, &func_locals, "__locals__", "__func_locals__")?;

        for (k, v) in locals {
            self.env.frame_mut(VarKind::Locals).set(k, v, false);
        }
        for (k, v) in globals {
            self.env.frame_mut(VarKind::Globals).set(k, v, false);
        }
        for (k, v) in runtime {
            self.env.frame_mut(VarKind::Runtime).set(k, v, false);
        }
        for (k, v) in func_globals {
            self.env.frame_mut(VarKind::FuncGlobals).set(k, v, false);
        }
        for (k, v) in func_locals {
            self.env.frame_mut(VarKind::FuncLocals).set(k, v, false);
        }
        Ok(())
    }

    /// Evaluation order fixed by spec: locals, globals, runtime, then the
    /// two function-definition kinds.
    fn evaluate_var_blocks(&mut self) -> Result<()> {
        for kind in [VarKind::Locals, VarKind::Globals, VarKind::Runtime, VarKind::FuncLocals, VarKind::FuncGlobals] {
            let names: Vec<String> = self.env.frame_mut(kind).vars.keys().cloned().collect();
            for name in names {
                if self.env.is_evaluated(&name, kind) {
                    continue;
                }
                let raw = self.env.frame_mut(kind).get(&name).cloned().unwrap();
                self.var_chain.push(name.clone());
                let r = self.eval_value(&raw);
                self.var_chain.pop();
                let r = r?;
                if r.pending {
                    self.mark_unresolved();
                    continue;
                }
                self.env.frame_mut(kind).set(name, r.value, true);
            }
        }
        Ok(())
    }

    fn eval_key_and_value(&mut self, key: &str, value_node: &Value) -> Result<(Vec<(String, Value)>, bool)> {
        let matches = tokenize(key).map_err(|e| e.wrap(ErrorKind::ProcessKey { highlighted: key.to_string() }))?;
        let whole_key_is_expr = matches.len() == 1 && matches[0].start == 0 && matches[0].end == key.chars().count();

        if whole_key_is_expr {
            let r = self.dispatch_match(&matches[0])?;
            if r.pending {
                return Ok((vec![(key.to_string(), value_node.clone())], true));
            }
            return match r.value {
                Value::List(items) => self.expand_over(Value::List(items.clone()), items.into_iter().enumerate().map(|(i, v)| (Value::Int(i as i64), v)), value_node),
                Value::Map(entries) => {
                    let ctx = Value::Map(entries.clone());
                    self.expand_over(ctx, entries.into_iter().map(|(k, v)| (Value::String(k), v)), value_node)
                }
                other => self.eval_single_child(other.to_string(), value_node),
            };
        }

        let r = self.eval_string(key)?;
        if r.pending {
            return Ok((vec![(key.to_string(), value_node.clone())], true));
        }
        self.eval_single_child(r.value.to_string(), value_node)
    }

    fn eval_single_child(&mut self, key: String, value_node: &Value) -> Result<(Vec<(String, Value)>, bool)> {
        let r = self.eval_value(value_node)?;
        if r.pending {
            self.mark_unresolved();
        }
        Ok((vec![(key, r.value)], r.pending))
    }

    fn expand_over(
        &mut self,
        ctx: Value,
        entries: impl Iterator<Item = (Value, Value)>,
        value_node: &Value,
    ) -> Result<(Vec<(String, Value)>, bool)> {
        let mut out = Vec::new();
        let mut pending = false;
        for (key, elem) in entries {
            self.env.push_ctx(ctx.clone(), key.clone(), elem);
            let r = self.eval_value(value_node);
            self.env.pop_ctx();
            let r = r?;
            pending |= r.pending;
            out.push((key.to_string(), r.value));
        }
        if pending {
            self.mark_unresolved();
        }
        Ok((out, pending))
    }

    // -- string node --------------------------------------------------------

    fn eval_string(&mut self, s: &str) -> Result<EvalResult> {
        let mut current = s.to_string();
        for _ in 0..MAX_STRING_PASSES {
            let matches = tokenize(&current).map_err(|e| e.wrap(ErrorKind::ProcessString { highlighted: current.clone() }))?;
            if matches.is_empty() {
                return Ok(EvalResult::done(Value::String(strip_backquotes(&current))));
            }

            let whole = matches.len() == 1 && matches[0].start == 0 && matches[0].end == current.chars().count();
            if whole {
                let r = self.dispatch_match(&matches[0])?;
                if r.pending {
                    self.mark_unresolved();
                    return Ok(EvalResult::pending(Value::String(current)));
                }
                if r.is_literal {
                    return Ok(EvalResult::literal(r.value));
                }
                match r.value {
                    Value::String(next) if next != current => {
                        current = next;
                        continue;
                    }
                    other => return Ok(EvalResult::done(other)),
                }
            }

            let chars: Vec<char> = current.chars().collect();
            let mut out = String::new();
            let mut cursor = 0;
            let mut pending = false;
            let mut any_literal = false;
            for m in &matches {
                out.extend(&chars[cursor..m.start]);
                let r = self.dispatch_match(m)?;
                if r.pending {
                    pending = true;
                    out.extend(&chars[m.start..m.end]);
                } else {
                    any_literal |= r.is_literal;
                    out.push_str(&stringify_for_splice(&r.value));
                }
                cursor = m.end;
            }
            out.extend(&chars[cursor..]);

            if pending {
                self.mark_unresolved();
                return Ok(EvalResult::pending(Value::String(out)));
            }
            if any_literal || out == current {
                return Ok(EvalResult::done(Value::String(strip_backquotes(&out))));
            }
            current = out;
        }
        Err(Error::fatal(ErrorKind::Message(format!("string reduction did not converge: {current}"))))
    }

    fn dispatch_match(&mut self, m: &Match) -> Result<EvalResult> {
        if m.func.is_empty() {
            return self.resolve_reference(&m.args_text);
        }
        self.dispatch_call(&m.func, &m.args_text)
    }

    // -- reference resolution -------------------------------------------

    fn lookup_name(&mut self, name: &str) -> Option<Value> {
        if name == "@top" {
            return Some(self.env.top.clone());
        }
        // `@ctx`/`@key`/`@value` bindings are looked up without their sigil;
        // everything else (locals, globals, ...) is looked up by plain name.
        if let Some(ctx_name) = name.strip_prefix('@') {
            if let Some(v) = self.env.lookup_ctx(ctx_name) {
                return Some(v.clone());
            }
        }
        self.env.lookup(name).map(|(v, _)| v.clone())
    }

    /// `${path}` and `${path, arg, name=value, ...}` share one grammar: the
    /// text between the braces is comma-split the same way a function call's
    /// argument list is, the first slot is the reference path, and any
    /// remaining slots are evaluated and applied to the resolved value as a
    /// lambda call (`${greet, name=World}` looks up `greet`, then calls it).
    fn resolve_reference(&mut self, args_text: &str) -> Result<EvalResult> {
        let ref_wrap = |e: Error| e.wrap(ErrorKind::RefPath { path: args_text.to_string() });
        let slots = split_commas(args_text).map_err(ref_wrap)?;
        let raw_path = slots.first().map(String::as_str).unwrap_or("");

        let wrap = |e: Error| e.wrap(ErrorKind::RefPath { path: raw_path.to_string() });
        let mut segments = split_path(raw_path).map_err(wrap)?;
        let mut is_literal = false;
        if segments.last().map(|s| s.is_empty()).unwrap_or(false) {
            segments.pop();
            is_literal = true;
        }

        let (mut current, mut pending) = if segments.is_empty() {
            (Value::Null, false)
        } else {
            let head = segments[0].clone();
            let (mut current, mut pending) = if head.contains('$') {
                let r = self.eval_string(&head)?;
                (r.value, r.pending)
            } else if let Some(v) = self.lookup_name(&head) {
                (v, false)
            } else {
                self.warnings.push_undefined(head.clone(), self.var_chain.clone());
                (Value::Null, true)
            };

            for seg in &segments[1..] {
                if pending {
                    break;
                }
                let key_text = if seg.contains('$') {
                    let r = self.eval_string(seg)?;
                    if r.pending {
                        pending = true;
                        continue;
                    }
                    r.value.to_string()
                } else {
                    seg.clone()
                };
                current = crate::refpath::descend(&current, &key_text).map_err(wrap)?;
            }
            (current, pending)
        };

        if !pending && slots.len() > 1 {
            let mut lambda_args = Vec::new();
            let mut lambda_flags = Vec::new();
            for slot in &slots[1..] {
                self.eval_arg_slot(slot, &mut lambda_args, &mut lambda_flags, &mut pending)?;
            }
            if !pending {
                let body = lambda_body(&current).map_err(ref_wrap)?;
                let applied = lambda::apply(&body, &lambda_args).map_err(|e| {
                    e.wrap(ErrorKind::FunctionMessage { func: raw_path.to_string(), message: "lambda application failed".into() })
                })?;
                let r = self.eval_value(&applied)?;
                current = r.value;
                pending = r.pending;
                is_literal = r.is_literal;
            }
        }

        if pending {
            self.mark_unresolved();
        }
        Ok(EvalResult { value: current, is_literal, pending })
    }

    // -- function dispatch ------------------------------------------------

    /// `$*{^lambda-text}` is the splice marker `lambda::apply` leaves behind
    /// for a non-string argument substituted into a whole-string slot; it is
    /// core lambda-engine plumbing, not a user-facing builtin, so it is
    /// resolved here rather than through the registry.
    fn eval_splice(&mut self, args_text: &str) -> Result<EvalResult> {
        let inner = args_text.strip_prefix('^').unwrap_or(args_text);
        let value = lambda::to_lambda_object(inner)
            .map_err(|e| e.wrap(ErrorKind::FunctionMessage { func: "*".into(), message: "bad splice".into() }))?;
        Ok(EvalResult::literal(value))
    }

    fn dispatch_call(&mut self, func: &str, args_text: &str) -> Result<EvalResult> {
        if func == "*" {
            return self.eval_splice(args_text);
        }

        if let Some(entry) = self.registry.lookup(func).copied() {
            if entry.raw_args {
                let (value, is_literal) = (entry.func)(self, &[Value::String(args_text.to_string())], &[true], func)?;
                return Ok(EvalResult { value, is_literal, pending: false });
            }
            let Some((args, flags)) = self.eval_arg_list(func, args_text)? else {
                return Ok(EvalResult::pending(Value::Null));
            };
            let (value, is_literal) = (entry.func)(self, &args, &flags, func).map_err(|e| {
                e.wrap(ErrorKind::FunctionMessage { func: func.to_string(), message: "call failed".into() })
            })?;
            return Ok(EvalResult { value, is_literal, pending: false });
        }

        // Not a registered builtin: `$name{args}` also invokes a
        // user-defined lambda bound to `name`, applying args the same way a
        // builtin would receive them.
        let Some(lambda_val) = self.lookup_name(func) else {
            return Err(Error::fatal(ErrorKind::FunctionMessage { func: func.to_string(), message: "not found".into() }));
        };
        let Some((args, _flags)) = self.eval_arg_list(func, args_text)? else {
            return Ok(EvalResult::pending(Value::Null));
        };
        let body = lambda_body(&lambda_val)?;
        let applied = lambda::apply(&body, &args)
            .map_err(|e| e.wrap(ErrorKind::FunctionMessage { func: func.to_string(), message: "lambda application failed".into() }))?;
        self.eval_value(&applied)
    }

    fn eval_arg_list(&mut self, func: &str, args_text: &str) -> Result<Option<(Vec<Value>, Vec<bool>)>> {
        let slots = split_commas(args_text).map_err(|e| e.wrap(ErrorKind::FuncArgs { func: func.to_string() }))?;
        let mut args = Vec::new();
        let mut flags = Vec::new();
        let mut pending = false;
        for slot in &slots {
            if slot.is_empty() && slots.len() == 1 {
                continue;
            }
            self.eval_arg_slot(slot, &mut args, &mut flags, &mut pending)?;
        }
        if pending {
            Ok(None)
        } else {
            Ok(Some((args, flags)))
        }
    }

    fn eval_arg_slot(&mut self, slot: &str, args: &mut Vec<Value>, flags: &mut Vec<bool>, pending: &mut bool) -> Result<()> {
        match classify(slot) {
            ArgKind::Placeholder(name) => {
                args.push(Value::String(format!("%{name}")));
                flags.push(true);
            }
            ArgKind::Literal(inner) => {
                let r = self.eval_string(&inner).map_err(|e| e.wrap(ErrorKind::ArgString { highlighted: inner.clone() }))?;
                if r.pending {
                    *pending = true;
                }
                args.push(r.value);
                flags.push(true);
            }
            ArgKind::Unroll(inner) => {
                let r = self.eval_string(&inner).map_err(|e| e.wrap(ErrorKind::ArgString { highlighted: inner.clone() }))?;
                if r.pending {
                    *pending = true;
                    return Ok(());
                }
                match r.value {
                    Value::List(items) => {
                        for item in items {
                            args.push(item);
                            flags.push(true);
                        }
                    }
                    Value::Map(entries) => {
                        for (k, v) in entries {
                            args.push(Value::List(vec![Value::String(k), v]));
                            flags.push(true);
                        }
                    }
                    other => {
                        args.push(other);
                        flags.push(true);
                    }
                }
            }
            ArgKind::Named(name, inner) => {
                // the value half of `name=value` may itself be an unroll or
                // tuple (`k=*$K`); reclassify it so the named slot carries a
                // list of items rather than the stringified splice syntax.
                match classify(&inner) {
                    ArgKind::Unroll(expr) => {
                        let r = self.eval_string(&expr).map_err(|e| e.wrap(ErrorKind::ArgString { highlighted: expr.clone() }))?;
                        if r.pending {
                            *pending = true;
                        }
                        let value = match r.value {
                            Value::Map(entries) => {
                                Value::List(entries.into_iter().map(|(k, v)| Value::List(vec![Value::String(k), v])).collect())
                            }
                            other => other,
                        };
                        args.push(Value::NamedArg(name, Box::new(value)));
                        flags.push(!r.pending);
                    }
                    ArgKind::Tuple(inner_tuple) => {
                        let sub_slots = split_commas(&inner_tuple)?;
                        let mut items = Vec::new();
                        let mut item_flags = Vec::new();
                        let mut sub_pending = false;
                        for sub in &sub_slots {
                            self.eval_arg_slot(sub, &mut items, &mut item_flags, &mut sub_pending)?;
                        }
                        if sub_pending {
                            *pending = true;
                        }
                        args.push(Value::NamedArg(name, Box::new(Value::List(items))));
                        flags.push(!sub_pending);
                    }
                    _ => {
                        let r = self.eval_string(&inner).map_err(|e| e.wrap(ErrorKind::ArgString { highlighted: inner.clone() }))?;
                        if r.pending {
                            *pending = true;
                        }
                        args.push(Value::NamedArg(name, Box::new(r.value)));
                        flags.push(!r.pending);
                    }
                }
            }
            ArgKind::Tuple(inner) => {
                let sub_slots = split_commas(&inner)?;
                let mut items = Vec::new();
                let mut item_flags = Vec::new();
                let mut sub_pending = false;
                for sub in &sub_slots {
                    self.eval_arg_slot(sub, &mut items, &mut item_flags, &mut sub_pending)?;
                }
                if sub_pending {
                    *pending = true;
                }
                args.push(Value::List(items));
                flags.push(!sub_pending);
            }
            ArgKind::Plain(inner) => {
                let r = self.eval_string(&inner).map_err(|e| e.wrap(ErrorKind::ArgString { highlighted: inner.clone() }))?;
                if r.pending {
                    *pending = true;
                }
                args.push(r.value);
                flags.push(!r.pending);
            }
        }
        Ok(())
    }
}

fn lambda_body(value: &Value) -> Result<Value> {
    lambda::body_of(value)
}

fn merged_block(m: &IndexMap<String, Value>, key: &str, deprecated: &str) -> Result<IndexMap<String, Value>> {
    let mut out = plain_block(m, key)?;
    for (k, v) in plain_block(m, deprecated)? {
        out.insert(k, v);
    }
    Ok(out)
}

fn plain_block(m: &IndexMap<String, Value>, key: &str) -> Result<IndexMap<String, Value>> {
    match m.get(key) {
        None => Ok(IndexMap::new()),
        Some(Value::Map(inner)) => Ok(inner.clone()),
        Some(_) => Err(Error::fatal(ErrorKind::Message(format!("'{key}' must be a map")))),
    }
}

fn check_disjoint(a: &IndexMap<String, Value>, b: &IndexMap<String, Value>, a_name: &str, b_name: &str) -> Result<()> {
    for k in a.keys() {
        if b.contains_key(k) {
            return Err(Error::fatal(ErrorKind::Message(format!(
                "'{k}' defined in both {a_name} and {b_name}"
            ))));
        }
    }
    Ok(())
}

fn merge_var_block(m: &mut IndexMap<String, Value>, key: &str, incoming: Value) -> Result<()> {
    let Value::Map(incoming) = incoming else {
        return Err(Error::fatal(ErrorKind::Message(format!("'{key}' must be a map"))));
    };
    let mut existing = plain_block(m, key)?;
    for (k, v) in incoming {
        if existing.contains_key(&k) {
            return Err(Error::fatal(ErrorKind::Message(format!("duplicate variable '{k}' in '{key}' from __pre__"))));
        }
        existing.insert(k, v);
    }
    m.insert(key.to_string(), Value::Map(existing));
    Ok(())
}

fn stringify_for_splice(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) => v.to_string(),
        other => other.to_json_string(None),
    }
}

fn strip_backquotes(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('`') && s.ends_with('`') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Tiny `*`/`?` glob used for the `__platform__` hostname table; there is no
/// need for a full glob crate over a single-segment hostname match.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn rec(p: &[char], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('*') => rec(&p[1..], t) || (!t.is_empty() && rec(p, &t[1..])),
            Some('?') => !t.is_empty() && rec(&p[1..], &t[1..]),
            Some(c) => t.first() == Some(c) && rec(&p[1..], &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    rec(&p, &t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator(top: Value) -> Evaluator {
        Evaluator::new(top, Registry::new())
    }

    fn run(doc: Value) -> Value {
        let mut ev = evaluator(doc.clone());
        ev.process(doc).unwrap()
    }

    fn strip_vars(v: Value) -> Value {
        match v {
            Value::Map(m) => Value::Map(
                m.into_iter()
                    .filter(|(k, _)| !value::is_reserved_key(k))
                    .map(|(k, v)| (k, strip_vars(v)))
                    .collect(),
            ),
            other => other,
        }
    }

    #[test]
    fn let_reference_scenario() {
        let doc: serde_json::Value = serde_json::from_str(r#"{"__locals__": {"a": 1, "b": "${a}"}, "x": "${b}"}"#).unwrap();
        let result = strip_vars(run(Value::from_json(doc)));
        if let Value::Map(m) = &result {
            assert_eq!(m.get("x"), Some(&Value::Int(1)));
        } else {
            panic!("expected map, got {result:?}");
        }
    }

    #[test]
    fn list_slicing_scenario() {
        let doc: serde_json::Value =
            serde_json::from_str(r#"{"__locals__": {"L": [1,2,3,4,5,6,7]}, "y": "${L:5~1-2}"}"#).unwrap();
        let result = strip_vars(run(Value::from_json(doc)));
        if let Value::Map(m) = &result {
            assert_eq!(m.get("y"), Some(&Value::List(vec![Value::Int(6), Value::Int(4), Value::Int(2)])));
        } else {
            panic!("expected map, got {result:?}");
        }
    }

    #[test]
    fn key_expansion_over_list_scenario() {
        let doc: serde_json::Value =
            serde_json::from_str(r#"{"__locals__": {"K": ["a","b","c"]}, "${K}": "${@value}"}"#).unwrap();
        let result = strip_vars(run(Value::from_json(doc)));
        if let Value::Map(m) = &result {
            assert_eq!(m.get("a"), Some(&Value::String("a".into())));
            assert_eq!(m.get("b"), Some(&Value::String("b".into())));
            assert_eq!(m.get("c"), Some(&Value::String("c".into())));
        } else {
            panic!("expected map, got {result:?}");
        }
    }

    #[test]
    fn undefined_variable_is_pending_and_warns() {
        let doc = Value::Map(IndexMap::from([("x".to_string(), Value::String("${missing}".into()))]));
        let mut ev = evaluator(doc.clone());
        let result = ev.process(doc).unwrap();
        assert!(!ev.fully_processed);
        assert!(!ev.warnings.is_empty());
        if let Value::Map(m) = result {
            assert_eq!(m.get("x"), Some(&Value::String("${missing}".into())));
        } else {
            panic!("expected map");
        }
    }

    #[test]
    fn platform_overlay_merges_matching_host() {
        let doc: serde_json::Value = serde_json::from_str(
            r#"{"__platform__": {"linux": {"*": {"__data__": {"greeting": "hi"}}}}, "g": "${greeting}"}"#,
        )
        .unwrap();
        let mut ev = evaluator(Value::Null);
        ev.set_platform("linux", "anyhost");
        let result = strip_vars(ev.process(Value::from_json(doc)).unwrap());
        if let Value::Map(m) = &result {
            assert_eq!(m.get("g"), Some(&Value::String("hi".into())));
        } else {
            panic!("expected map, got {result:?}");
        }
    }

    #[test]
    fn literal_trailing_segment_suppresses_rescan() {
        let doc = Value::Map(IndexMap::from([
            ("__locals__".to_string(), Value::Map(IndexMap::from([("a".to_string(), Value::String("${b}".into()))]))),
            ("x".to_string(), Value::String("${a:}".into())),
        ]));
        let result = strip_vars(run(doc));
        if let Value::Map(m) = &result {
            assert_eq!(m.get("x"), Some(&Value::String("${b}".into())));
        } else {
            panic!("expected map, got {result:?}");
        }
    }

    #[test]
    fn lambda_with_named_args_scenario() {
        // A minimal stand-in for the real `L` builtin (which lives in the
        // builtins module, outside the evaluator core): wrap the raw body
        // text as a lambda value exactly as `lambda::wrap` would.
        let mut reg = Registry::new();
        reg.define("L", true, |_ev, args, _flags, _name| {
            let text = args[0].as_str().unwrap_or_default().to_string();
            Ok((lambda::wrap(&Value::String(text)), true))
        });

        let doc: serde_json::Value = serde_json::from_str(
            r#"{"__func_globals__": {"greet": "$L{Hello %name%}"}, "s": "$greet{name=World}"}"#,
        )
        .unwrap();
        let mut ev = Evaluator::new(Value::Null, reg);
        let result = strip_vars(ev.process(Value::from_json(doc)).unwrap());
        if let Value::Map(m) = &result {
            assert_eq!(m.get("s"), Some(&Value::String("Hello World".into())));
        } else {
            panic!("expected map, got {result:?}");
        }
    }

    #[test]
    fn reference_with_trailing_args_calls_the_resolved_lambda() {
        // `${path, args...}` is the bare-reference form of a call: the first
        // comma slot names what to look up, the rest are applied to it.
        let mut reg = Registry::new();
        reg.define("L", true, |_ev, args, _flags, _name| {
            let text = args[0].as_str().unwrap_or_default().to_string();
            Ok((lambda::wrap(&Value::String(text)), true))
        });

        let doc: serde_json::Value = serde_json::from_str(
            r#"{"__func_globals__": {"greet": "$L{Hello %name%}"}, "s": "${greet, name=World}"}"#,
        )
        .unwrap();
        let mut ev = Evaluator::new(Value::Null, reg);
        let result = strip_vars(ev.process(Value::from_json(doc)).unwrap());
        if let Value::Map(m) = &result {
            assert_eq!(m.get("s"), Some(&Value::String("Hello World".into())));
        } else {
            panic!("expected map, got {result:?}");
        }
    }
}
