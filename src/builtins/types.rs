//! Type predicates and scalar conversions: `null?`, `bool?`, `int?`,
//! `float?`, `number?`, `string?`, `list?`, `map?`, `to-int`, `to-float`,
//! `to-string`.

use crate::error::{Error, ErrorKind, Result};
use crate::eval::Evaluator;
use crate::value::Value;
use ison_macros::builtin;

fn one<'a>(args: &'a [Value], name: &str) -> Result<&'a Value> {
    args.first().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 1 argument".into() })
    })
}

#[builtin(name = "null?")]
pub fn is_null(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::Bool(matches!(one(args, name)?, Value::Null)), false))
}

#[builtin(name = "bool?")]
pub fn is_bool(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::Bool(matches!(one(args, name)?, Value::Bool(_))), false))
}

#[builtin(name = "int?")]
pub fn is_int(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::Bool(matches!(one(args, name)?, Value::Int(_))), false))
}

#[builtin(name = "float?")]
pub fn is_float(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::Bool(matches!(one(args, name)?, Value::Float(_))), false))
}

#[builtin(name = "number?")]
pub fn is_number(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::Bool(matches!(one(args, name)?, Value::Int(_) | Value::Float(_))), false))
}

#[builtin(name = "string?")]
pub fn is_string(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::Bool(matches!(one(args, name)?, Value::String(_))), false))
}

#[builtin(name = "list?")]
pub fn is_list(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::Bool(matches!(one(args, name)?, Value::List(_))), false))
}

#[builtin(name = "map?")]
pub fn is_map(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::Bool(matches!(one(args, name)?, Value::Map(_))), false))
}

#[builtin(name = "to-int")]
pub fn to_int(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let v = one(args, name)?;
    let i = match v {
        Value::Int(i) => *i,
        Value::Float(f) => *f as i64,
        Value::String(s) => s.trim().parse().map_err(|_| {
            Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: format!("'{s}' is not an integer") })
        })?,
        Value::Bool(b) => *b as i64,
        other => {
            return Err(Error::fatal(ErrorKind::FunctionMessage {
                func: name.to_string(),
                message: format!("cannot convert {} to int", other.type_name()),
            }))
        }
    };
    Ok((Value::Int(i), false))
}

#[builtin(name = "to-float")]
pub fn to_float(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let v = one(args, name)?;
    let f = match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        Value::String(s) => s.trim().parse().map_err(|_| {
            Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: format!("'{s}' is not a number") })
        })?,
        other => {
            return Err(Error::fatal(ErrorKind::FunctionMessage {
                func: name.to_string(),
                message: format!("cannot convert {} to float", other.type_name()),
            }))
        }
    };
    Ok((Value::Float(f), false))
}

#[builtin(name = "to-string")]
pub fn to_string_fn(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::String(one(args, name)?.to_string()), false))
}

pub fn register_all(reg: &mut crate::registry::Registry) {
    register_is_null(reg);
    register_is_bool(reg);
    register_is_int(reg);
    register_is_float(reg);
    register_is_number(reg);
    register_is_string(reg);
    register_is_list(reg);
    register_is_map(reg);
    register_to_int(reg);
    register_to_float(reg);
    register_to_string_fn(reg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn ev() -> Evaluator {
        Evaluator::new(Value::Null, Registry::new())
    }

    #[test]
    fn predicates_match_their_own_variant_only() {
        assert_eq!(is_int(&mut ev(), &[Value::Int(1)], &[true], "int?").unwrap().0, Value::Bool(true));
        assert_eq!(is_int(&mut ev(), &[Value::Float(1.0)], &[true], "int?").unwrap().0, Value::Bool(false));
    }

    #[test]
    fn to_int_parses_numeric_strings() {
        let (v, _) = to_int(&mut ev(), &[Value::String(" 42 ".into())], &[true], "to-int").unwrap();
        assert_eq!(v, Value::Int(42));
    }
}
