//! String operations: `concat`, `upper`, `lower`, `trim`, `split`, `join`,
//! `S` (wrap as canonical JSON), `Sb` (wrap in back-quotes, inert to further
//! scanning).
//!
//! `S`/`Sb` are the two "stop processing, just give me the text" escapes
//! mentioned in the registry design (§4.4): `S` dumps a value as JSON text,
//! `Sb` marks its argument literal by wrapping it in back-quotes (see
//! `eval::strip_backquotes`).

use crate::error::{Error, ErrorKind, Result};
use crate::eval::Evaluator;
use crate::value::Value;
use ison_macros::builtin;

fn as_str<'a>(v: &'a Value, func: &str) -> Result<&'a str> {
    v.as_str().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: func.to_string(), message: format!("expected a string, got {}", v.type_name()) })
    })
}

#[builtin(name = "concat")]
pub fn concat(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], _name: &str) -> Result<(Value, bool)> {
    let mut out = String::new();
    for a in args {
        out.push_str(&a.to_string());
    }
    Ok((Value::String(out), false))
}

#[builtin(name = "upper")]
pub fn upper(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::String(as_str(args.first().unwrap_or(&Value::Null), name)?.to_uppercase()), false))
}

#[builtin(name = "lower")]
pub fn lower(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::String(as_str(args.first().unwrap_or(&Value::Null), name)?.to_lowercase()), false))
}

#[builtin(name = "trim")]
pub fn trim(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    Ok((Value::String(as_str(args.first().unwrap_or(&Value::Null), name)?.trim().to_string()), false))
}

#[builtin(name = "split")]
pub fn split(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    let text = as_str(&args[0], name)?;
    let sep = as_str(&args[1], name)?;
    let parts = if sep.is_empty() {
        text.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        text.split(sep).map(|p| Value::String(p.to_string())).collect()
    };
    Ok((Value::List(parts), false))
}

#[builtin(name = "join")]
pub fn join(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    let Value::List(items) = &args[0] else {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "first argument must be a list".into() }));
    };
    let sep = as_str(&args[1], name)?;
    let joined = items.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(sep);
    Ok((Value::String(joined), false))
}

#[builtin(name = "S")]
pub fn s_wrap(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let v = args.first().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 1 argument".into() })
    })?;
    Ok((Value::String(v.to_json_string(None)), true))
}

#[builtin(name = "Sb")]
pub fn sb_wrap(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let v = args.first().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 1 argument".into() })
    })?;
    Ok((Value::String(format!("`{v}`")), true))
}

pub fn register_all(reg: &mut crate::registry::Registry) {
    register_concat(reg);
    register_upper(reg);
    register_lower(reg);
    register_trim(reg);
    register_split(reg);
    register_join(reg);
    register_s_wrap(reg);
    register_sb_wrap(reg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn ev() -> Evaluator {
        Evaluator::new(Value::Null, Registry::new())
    }

    #[test]
    fn join_stringifies_non_string_elements() {
        let l = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let (v, _) = join(&mut ev(), &[l, Value::String("-".into())], &[true, true], "join").unwrap();
        assert_eq!(v, Value::String("1-2".into()));
    }

    #[test]
    fn split_on_empty_separator_yields_characters() {
        let (v, _) = split(&mut ev(), &[Value::String("ab".into()), Value::String(String::new())], &[true, true], "split").unwrap();
        assert_eq!(v, Value::List(vec![Value::String("a".into()), Value::String("b".into())]));
    }
}
