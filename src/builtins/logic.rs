//! Logical and comparison primitives: `and`, `or`, `not`, `=`, `!=`, `<`,
//! `>`, `<=`, `>=`.
//!
//! Comparisons order ints and floats numerically (mixed pairs compare as
//! floats) and strings lexically; comparing across those two families is a
//! function-message error rather than an arbitrary ordering.

use crate::error::{Error, ErrorKind, Result};
use crate::eval::Evaluator;
use crate::value::Value;
use ison_macros::builtin;
use std::cmp::Ordering;

fn order(a: &Value, b: &Value, func: &str) -> Result<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                Error::fatal(ErrorKind::FunctionMessage { func: func.to_string(), message: "NaN is not ordered".into() })
            }),
            _ => Err(Error::fatal(ErrorKind::FunctionMessage {
                func: func.to_string(),
                message: format!("cannot compare {} and {}", a.type_name(), b.type_name()),
            })),
        },
    }
}

#[builtin(name = "and")]
pub fn and(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], _name: &str) -> Result<(Value, bool)> {
    Ok((Value::Bool(args.iter().all(Value::is_truthy)), false))
}

#[builtin(name = "or")]
pub fn or(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], _name: &str) -> Result<(Value, bool)> {
    Ok((Value::Bool(args.iter().any(Value::is_truthy)), false))
}

#[builtin(name = "not")]
pub fn not(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let v = args.first().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 1 argument".into() })
    })?;
    Ok((Value::Bool(!v.is_truthy()), false))
}

#[builtin(name = "=")]
pub fn eq(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    Ok((Value::Bool(args[0] == args[1]), false))
}

#[builtin(name = "!=")]
pub fn ne(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    Ok((Value::Bool(args[0] != args[1]), false))
}

#[builtin(name = "<")]
pub fn lt(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    Ok((Value::Bool(order(&args[0], &args[1], name)? == Ordering::Less), false))
}

#[builtin(name = ">")]
pub fn gt(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    Ok((Value::Bool(order(&args[0], &args[1], name)? == Ordering::Greater), false))
}

#[builtin(name = "<=")]
pub fn le(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    Ok((Value::Bool(order(&args[0], &args[1], name)? != Ordering::Greater), false))
}

#[builtin(name = ">=")]
pub fn ge(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    Ok((Value::Bool(order(&args[0], &args[1], name)? != Ordering::Less), false))
}

pub fn register_all(reg: &mut crate::registry::Registry) {
    register_and(reg);
    register_or(reg);
    register_not(reg);
    register_eq(reg);
    register_ne(reg);
    register_lt(reg);
    register_gt(reg);
    register_le(reg);
    register_ge(reg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn ev() -> Evaluator {
        Evaluator::new(Value::Null, Registry::new())
    }

    #[test]
    fn lt_orders_numbers() {
        let (v, _) = lt(&mut ev(), &[Value::Int(1), Value::Float(2.0)], &[true, true], "<").unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn comparing_incompatible_types_errors() {
        assert!(lt(&mut ev(), &[Value::Int(1), Value::String("a".into())], &[true, true], "<").is_err());
    }

    #[test]
    fn and_short_circuits_on_value_not_evaluation() {
        let (v, _) = and(&mut ev(), &[Value::Bool(true), Value::Int(0)], &[true, true], "and").unwrap();
        assert_eq!(v, Value::Bool(false));
    }
}
