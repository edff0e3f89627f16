//! Map combinators: `keys`, `values`, `has`, `merge`.

use crate::error::{Error, ErrorKind, Result};
use crate::eval::Evaluator;
use crate::value::Value;
use indexmap::IndexMap;
use ison_macros::builtin;

fn as_map<'a>(v: &'a Value, func: &str) -> Result<&'a IndexMap<String, Value>> {
    match v {
        Value::Map(m) => Ok(m),
        other => Err(Error::fatal(ErrorKind::FunctionMessage {
            func: func.to_string(),
            message: format!("expected a map, got {}", other.type_name()),
        })),
    }
}

#[builtin(name = "keys")]
pub fn keys(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let m = as_map(args.first().unwrap_or(&Value::Null), name)?;
    Ok((Value::List(m.keys().cloned().map(Value::String).collect()), false))
}

#[builtin(name = "values")]
pub fn values(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let m = as_map(args.first().unwrap_or(&Value::Null), name)?;
    Ok((Value::List(m.values().cloned().collect()), false))
}

#[builtin(name = "has")]
pub fn has(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    let m = as_map(&args[0], name)?;
    let key = args[1].as_str().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "key must be a string".into() })
    })?;
    Ok((Value::Bool(m.contains_key(key)), false))
}

#[builtin(name = "merge")]
pub fn merge(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let mut out = IndexMap::new();
    for a in args {
        for (k, v) in as_map(a, name)? {
            out.insert(k.clone(), v.clone());
        }
    }
    Ok((Value::Map(out), false))
}

pub fn register_all(reg: &mut crate::registry::Registry) {
    register_keys(reg);
    register_values(reg);
    register_has(reg);
    register_merge(reg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn ev() -> Evaluator {
        Evaluator::new(Value::Null, Registry::new())
    }

    #[test]
    fn merge_lets_later_maps_win() {
        let a = Value::Map(IndexMap::from([("x".to_string(), Value::Int(1))]));
        let b = Value::Map(IndexMap::from([("x".to_string(), Value::Int(2))]));
        let (v, _) = merge(&mut ev(), &[a, b], &[true, true], "merge").unwrap();
        if let Value::Map(m) = v {
            assert_eq!(m.get("x"), Some(&Value::Int(2)));
        } else {
            panic!("expected map");
        }
    }
}
