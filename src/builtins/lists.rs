//! List combinators: `len`, `first`, `last`, `append`, `reverse`, `sort`,
//! `range`.
//!
//! Slicing and indexed access already live in the reference resolver
//! (`a:1`, `a:5~1-2`); these cover the operations that aren't expressible as
//! a reference path.

use crate::error::{Error, ErrorKind, Result};
use crate::eval::Evaluator;
use crate::value::Value;
use ison_macros::builtin;

fn as_list<'a>(v: &'a Value, func: &str) -> Result<&'a [Value]> {
    match v {
        Value::List(l) => Ok(l),
        other => Err(Error::fatal(ErrorKind::FunctionMessage {
            func: func.to_string(),
            message: format!("expected a list, got {}", other.type_name()),
        })),
    }
}

#[builtin(name = "len")]
pub fn len(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let v = args.first().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 1 argument".into() })
    })?;
    let n = v.len().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: format!("{} has no length", v.type_name()) })
    })?;
    Ok((Value::Int(n as i64), false))
}

#[builtin(name = "first")]
pub fn first(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let l = as_list(args.first().unwrap_or(&Value::Null), name)?;
    let v = l.first().cloned().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "list is empty".into() })
    })?;
    Ok((v, false))
}

#[builtin(name = "last")]
pub fn last(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let l = as_list(args.first().unwrap_or(&Value::Null), name)?;
    let v = l.last().cloned().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "list is empty".into() })
    })?;
    Ok((v, false))
}

#[builtin(name = "append")]
pub fn append(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let mut out = Vec::new();
    for a in args {
        out.extend(as_list(a, name)?.iter().cloned());
    }
    Ok((Value::List(out), false))
}

#[builtin(name = "reverse")]
pub fn reverse(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let mut l = as_list(args.first().unwrap_or(&Value::Null), name)?.to_vec();
    l.reverse();
    Ok((Value::List(l), false))
}

#[builtin(name = "sort")]
pub fn sort(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let mut l = as_list(args.first().unwrap_or(&Value::Null), name)?.to_vec();
    l.sort_by(|a, b| {
        a.as_f64()
            .zip(b.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .unwrap_or_else(|| a.to_string().cmp(&b.to_string()))
    });
    Ok((Value::List(l), false))
}

#[builtin(name = "range")]
pub fn range(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let ints: Vec<i64> = args
        .iter()
        .map(|v| {
            v.as_int().ok_or_else(|| {
                Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects integer arguments".into() })
            })
        })
        .collect::<Result<_>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(Error::fatal(ErrorKind::FunctionMessage {
                func: name.to_string(),
                message: "expects 1 to 3 arguments".into(),
            }))
        }
    };
    if step == 0 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "step cannot be 0".into() }));
    }
    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            out.push(Value::Int(i));
            i += step;
        }
    } else {
        while i > stop {
            out.push(Value::Int(i));
            i += step;
        }
    }
    Ok((Value::List(out), false))
}

pub fn register_all(reg: &mut crate::registry::Registry) {
    register_len(reg);
    register_first(reg);
    register_last(reg);
    register_append(reg);
    register_reverse(reg);
    register_sort(reg);
    register_range(reg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn ev() -> Evaluator {
        Evaluator::new(Value::Null, Registry::new())
    }

    #[test]
    fn range_counts_up_by_default() {
        let (v, _) = range(&mut ev(), &[Value::Int(3)], &[true], "range").unwrap();
        assert_eq!(v, Value::List(vec![Value::Int(0), Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn sort_orders_numbers_ascending() {
        let l = Value::List(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        let (v, _) = sort(&mut ev(), &[l], &[true], "sort").unwrap();
        assert_eq!(v, Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    }
}
