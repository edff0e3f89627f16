//! Arithmetic primitives: `+`, `-`, `*`, `/`, `%`.
//!
//! All are variadic over ints and floats; mixing the two promotes the whole
//! call to float. `-` and `/` negate/invert a lone argument instead of
//! erroring, matching the usual reduce-with-identity reading of a unary call.

use crate::error::{Error, ErrorKind, Result};
use crate::eval::Evaluator;
use crate::value::Value;
use ison_macros::builtin;

enum Num {
    Int(i64),
    Float(f64),
}

/// A plain argument slot with no `$`-expressions inside it reduces to a
/// string even when a document author wrote a bare numeric literal (there is
/// no grammar position that coerces it), so number-shaped strings are
/// accepted here the same way `Value::as_int`/`as_f64` accept them elsewhere.
fn num(v: &Value, func: &str) -> Result<Num> {
    match v {
        Value::Int(i) => Ok(Num::Int(*i)),
        Value::Float(f) => Ok(Num::Float(*f)),
        Value::String(s) => {
            if let Some(i) = v.as_int() {
                Ok(Num::Int(i))
            } else if let Some(f) = v.as_f64() {
                Ok(Num::Float(f))
            } else {
                Err(Error::fatal(ErrorKind::FunctionMessage {
                    func: func.to_string(),
                    message: format!("expected a number, got string '{s}'"),
                }))
            }
        }
        other => Err(Error::fatal(ErrorKind::FunctionMessage {
            func: func.to_string(),
            message: format!("expected a number, got {}", other.type_name()),
        })),
    }
}

fn to_value(is_float: bool, i: i64, f: f64) -> Value {
    if is_float {
        Value::Float(f)
    } else {
        Value::Int(i)
    }
}

#[builtin(name = "+")]
pub fn add(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let mut sum_i: i64 = 0;
    let mut sum_f: f64 = 0.0;
    let mut is_float = false;
    for a in args {
        match num(a, name)? {
            Num::Int(i) => {
                sum_i += i;
                sum_f += i as f64;
            }
            Num::Float(f) => {
                is_float = true;
                sum_f += f;
            }
        }
    }
    Ok((to_value(is_float, sum_i, sum_f), false))
}

#[builtin(name = "-")]
pub fn sub(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.is_empty() {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "needs at least one argument".into() }));
    }
    let first = num(&args[0], name)?;
    if args.len() == 1 {
        return Ok(match first {
            Num::Int(i) => (Value::Int(-i), false),
            Num::Float(f) => (Value::Float(-f), false),
        });
    }
    let mut is_float = matches!(first, Num::Float(_));
    let (mut acc_i, mut acc_f) = match first {
        Num::Int(i) => (i, i as f64),
        Num::Float(f) => (0, f),
    };
    for a in &args[1..] {
        match num(a, name)? {
            Num::Int(i) => {
                acc_i -= i;
                acc_f -= i as f64;
            }
            Num::Float(f) => {
                is_float = true;
                acc_f -= f;
            }
        }
    }
    Ok((to_value(is_float, acc_i, acc_f), false))
}

#[builtin(name = "*")]
pub fn mul(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let mut prod_i: i64 = 1;
    let mut prod_f: f64 = 1.0;
    let mut is_float = false;
    for a in args {
        match num(a, name)? {
            Num::Int(i) => {
                prod_i *= i;
                prod_f *= i as f64;
            }
            Num::Float(f) => {
                is_float = true;
                prod_f *= f;
            }
        }
    }
    Ok((to_value(is_float, prod_i, prod_f), false))
}

#[builtin(name = "/")]
pub fn div(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.is_empty() {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "needs at least one argument".into() }));
    }
    let mut acc = match num(&args[0], name)? {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    };
    if args.len() == 1 {
        if acc == 0.0 {
            return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "division by zero".into() }));
        }
        return Ok((Value::Float(1.0 / acc), false));
    }
    for a in &args[1..] {
        let d = match num(a, name)? {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        };
        if d == 0.0 {
            return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "division by zero".into() }));
        }
        acc /= d;
    }
    Ok((Value::Float(acc), false))
}

#[builtin(name = "%")]
pub fn rem(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    match (num(&args[0], name)?, num(&args[1], name)?) {
        (Num::Int(a), Num::Int(b)) => {
            if b == 0 {
                return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "division by zero".into() }));
            }
            Ok((Value::Int(a % b), false))
        }
        (a, b) => {
            let a = match a { Num::Int(i) => i as f64, Num::Float(f) => f };
            let b = match b { Num::Int(i) => i as f64, Num::Float(f) => f };
            if b == 0.0 {
                return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "division by zero".into() }));
            }
            Ok((Value::Float(a % b), false))
        }
    }
}

pub fn register_all(reg: &mut crate::registry::Registry) {
    register_add(reg);
    register_sub(reg);
    register_mul(reg);
    register_div(reg);
    register_rem(reg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn ev() -> Evaluator {
        Evaluator::new(Value::Null, Registry::new())
    }

    #[test]
    fn add_promotes_to_float_on_mixed_input() {
        let (v, _) = add(&mut ev(), &[Value::Int(1), Value::Float(2.5)], &[true, true], "+").unwrap();
        assert_eq!(v, Value::Float(3.5));
    }

    #[test]
    fn sub_negates_lone_argument() {
        let (v, _) = sub(&mut ev(), &[Value::Int(5)], &[true], "-").unwrap();
        assert_eq!(v, Value::Int(-5));
    }

    #[test]
    fn div_by_zero_is_fatal() {
        assert!(div(&mut ev(), &[Value::Int(1), Value::Int(0)], &[true, true], "/").is_err());
    }

    #[test]
    fn add_coerces_numeric_strings() {
        let (v, _) = add(&mut ev(), &[Value::String("1".into()), Value::String("2".into()), Value::Int(3)], &[true, true, true], "+").unwrap();
        assert_eq!(v, Value::Int(6));
    }

    #[test]
    fn add_rejects_non_numeric_strings() {
        assert!(add(&mut ev(), &[Value::String("abc".into())], &[true], "+").is_err());
    }
}
