//! Lambda constructors and callers: `L`, `L*`, `!`, `!foreach`, `!where`.
//!
//! `L`/`L*` are raw-args builtins — the tokenizer already isolated the text
//! between the outer braces, so these build a deferred `$L{...}` marker from
//! it rather than evaluating it now. A document author writes the body in
//! plain ISON surface syntax (`%k%=%v%`, not S-wrapped JSON text), so a body
//! that isn't already a structured JSON literal (`[...]`, `{...}`, `"..."`)
//! is S-wrapped here to become the single string the lambda engine expects.
//! `!`/`!foreach`/`!where` apply an already-built lambda value to evaluated
//! arguments via [`lambda::apply`], then run the evaluator over the
//! substituted result so nested references inside the body resolve in the
//! caller's environment.

use crate::error::{Error, ErrorKind, Result};
use crate::eval::Evaluator;
use crate::lambda;
use crate::splitter::split_commas;
use crate::value::Value;
use ison_macros::builtin;

fn lambda_arg_body(v: &Value, name: &str) -> Result<Value> {
    lambda::body_of(v).map_err(|e| e.wrap(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects a lambda value".into() }))
}

/// A document author's raw `$L{...}` body is plain ISON surface syntax, not
/// pre-S-wrapped JSON text, so it needs wrapping before the lambda engine
/// can parse it — *unless* it already round-trips through the engine's own
/// decoder, which happens whenever this is a second pass over text an
/// earlier `L`/`L*` call already produced (a bare `$name` reference to a
/// previously-built lambda re-enters this builtin through the string
/// reduction pass). Checking via `to_lambda_object` rather than sniffing
/// the first character keeps repeated application idempotent instead of
/// accumulating nested `$S{...}` wraps.
fn as_body_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if lambda::to_lambda_object(trimmed).is_ok() {
        trimmed.to_string()
    } else {
        format!("$S{{{trimmed}}}")
    }
}

#[builtin(name = "L", raw = true)]
pub fn l(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], _name: &str) -> Result<(Value, bool)> {
    let raw = args.first().and_then(Value::as_str).unwrap_or("");
    Ok((Value::String(format!("$L{{{}}}", as_body_text(raw))), true))
}

#[builtin(name = "L*", raw = true)]
pub fn l_star(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let raw = args.first().and_then(Value::as_str).unwrap_or("");
    let slots = split_commas(raw).map_err(|e| e.wrap(ErrorKind::FunctionMessage { func: name.to_string(), message: "bad argument list".into() }))?;
    let body = format!("[{}]", slots.iter().map(|s| as_body_text(s)).collect::<Vec<_>>().join(","));
    Ok((Value::String(format!("$L{{{body}}}")), true))
}

#[builtin(name = "!")]
pub fn call(ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let lambda_val = args.first().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects a lambda as the first argument".into() })
    })?;
    let body = lambda_arg_body(lambda_val, name)?;
    let applied = lambda::apply(&body, &args[1..])
        .map_err(|e| e.wrap(ErrorKind::FunctionMessage { func: name.to_string(), message: "lambda application failed".into() }))?;
    let result = ev.eval_to_value(&applied)?;
    Ok((result, true))
}

#[builtin(name = "!where")]
pub fn where_(ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    let body = lambda_arg_body(&args[0], name)?;
    let Value::List(items) = &args[1] else {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "second argument must be a list".into() }));
    };
    let mut out = Vec::new();
    for item in items {
        let applied = lambda::apply(&body, std::slice::from_ref(item))
            .map_err(|e| e.wrap(ErrorKind::FunctionMessage { func: name.to_string(), message: "lambda application failed".into() }))?;
        if ev.eval_to_value(&applied)?.is_truthy() {
            out.push(item.clone());
        }
    }
    Ok((Value::List(out), true))
}

#[builtin(name = "!foreach")]
pub fn foreach(ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let lambda_val = args.first().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects a lambda as the first argument".into() })
    })?;
    let body = lambda_arg_body(lambda_val, name)?;

    let mut positional: Vec<Value> = Vec::new();
    let mut named_lists: Vec<(String, Vec<Value>)> = Vec::new();
    for a in &args[1..] {
        match a {
            Value::NamedArg(n, v) => {
                let Value::List(items) = v.as_ref() else {
                    return Err(Error::fatal(ErrorKind::FunctionMessage {
                        func: name.to_string(),
                        message: format!("named argument '{n}' must be a list to iterate over"),
                    }));
                };
                named_lists.push((n.clone(), items.clone()));
            }
            other => positional.push(other.clone()),
        }
    }
    if named_lists.is_empty() {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects at least one named list argument".into() }));
    }
    let len = named_lists[0].1.len();
    if named_lists.iter().any(|(_, l)| l.len() != len) {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "named list arguments must all have the same length".into() }));
    }

    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let mut call_args = positional.clone();
        for (n, l) in &named_lists {
            call_args.push(Value::NamedArg(n.clone(), Box::new(l[i].clone())));
        }
        let applied = lambda::apply(&body, &call_args)
            .map_err(|e| e.wrap(ErrorKind::FunctionMessage { func: name.to_string(), message: "lambda application failed".into() }))?;
        out.push(ev.eval_to_value(&applied)?);
    }
    Ok((Value::List(out), true))
}

pub fn register_all(reg: &mut crate::registry::Registry) {
    register_l(reg);
    register_l_star(reg);
    register_call(reg);
    register_where_(reg);
    register_foreach(reg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn ev() -> Evaluator {
        Evaluator::new(Value::Null, Registry::new())
    }

    #[test]
    fn l_s_wraps_a_plain_text_body() {
        let (v, literal) = l(&mut ev(), &[Value::String("%0".into())], &[true], "L").unwrap();
        assert_eq!(v, Value::String("$L{$S{%0}}".into()));
        assert!(literal);
    }

    #[test]
    fn l_leaves_a_structured_body_alone() {
        let (v, _) = l(&mut ev(), &[Value::String(r#"["%0","%1"]"#.into())], &[true], "L").unwrap();
        assert_eq!(v, Value::String(r#"$L{["%0","%1"]}"#.into()));
    }

    #[test]
    fn call_applies_positional_args_and_evaluates_the_result() {
        let lambda_val = l(&mut ev(), &[Value::String("%0".into())], &[true], "L").unwrap().0;
        let (v, _) = call(&mut ev(), &[lambda_val, Value::Int(5)], &[true, true], "!").unwrap();
        assert_eq!(v, Value::Int(5));
    }

    #[test]
    fn foreach_zips_named_lists_by_index() {
        let lambda_val = l(&mut ev(), &[Value::String("%k%=%v%".into())], &[true], "L").unwrap().0;
        let k = Value::NamedArg("k".into(), Box::new(Value::List(vec![Value::String("a".into()), Value::String("b".into())])));
        let v = Value::NamedArg("v".into(), Box::new(Value::List(vec![Value::Int(1), Value::Int(2)])));
        let (result, _) = foreach(&mut ev(), &[lambda_val, k, v], &[true, true, true], "!foreach").unwrap();
        assert_eq!(result, Value::List(vec![Value::String("a=1".into()), Value::String("b=2".into())]));
    }

    #[test]
    fn where_keeps_items_the_predicate_accepts() {
        let lambda_val = l(&mut ev(), &[Value::String("%0".into())], &[true], "L").unwrap().0;
        let items = Value::List(vec![Value::Bool(true), Value::Bool(false), Value::Int(1)]);
        let (result, _) = where_(&mut ev(), &[lambda_val, items], &[true, true], "!where").unwrap();
        assert_eq!(result, Value::List(vec![Value::Bool(true), Value::Int(1)]));
    }
}
