//! Sandboxed filesystem access: `file.read`, `file.write`, `file.exists`,
//! `file.size`, `dir.list`. Every call goes through `Evaluator::sandbox`, so
//! a document that never had one configured gets a function-message error
//! rather than silently touching the real filesystem.

use crate::error::{Error, ErrorKind, Result};
use crate::eval::Evaluator;
use crate::sandbox::SandboxError;
use crate::value::Value;
use ison_macros::builtin;

fn as_str<'a>(v: &'a Value, func: &str) -> Result<&'a str> {
    v.as_str().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: func.to_string(), message: format!("expected a string, got {}", v.type_name()) })
    })
}

fn map_err(name: &str, e: SandboxError) -> Error {
    Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: e.to_string() })
}

#[builtin(name = "file.read")]
pub fn read(ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let path = as_str(args.first().unwrap_or(&Value::Null), name)?;
    let contents = ev.sandbox()?.read_to_string(path).map_err(|e| map_err(name, e))?;
    Ok((Value::String(contents), false))
}

#[builtin(name = "file.write")]
pub fn write(ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    if args.len() != 2 {
        return Err(Error::fatal(ErrorKind::FunctionMessage { func: name.to_string(), message: "expects exactly 2 arguments".into() }));
    }
    let path = as_str(&args[0], name)?;
    let contents = as_str(&args[1], name)?;
    ev.sandbox()?.write(path, contents).map_err(|e| map_err(name, e))?;
    Ok((Value::Null, false))
}

#[builtin(name = "file.exists")]
pub fn exists(ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let path = as_str(args.first().unwrap_or(&Value::Null), name)?;
    let exists = ev.sandbox()?.exists(path).map_err(|e| map_err(name, e))?;
    Ok((Value::Bool(exists), false))
}

#[builtin(name = "file.size")]
pub fn size(ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let path = as_str(args.first().unwrap_or(&Value::Null), name)?;
    let size = ev.sandbox()?.size(path).map_err(|e| map_err(name, e))?;
    Ok((Value::Int(size as i64), false))
}

#[builtin(name = "dir.list")]
pub fn list(ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    let path = as_str(args.first().unwrap_or(&Value::Null), name)?;
    let entries = ev.sandbox()?.list(path).map_err(|e| map_err(name, e))?;
    Ok((Value::List(entries.into_iter().map(Value::String).collect()), false))
}

pub fn register_all(reg: &mut crate::registry::Registry) {
    register_read(reg);
    register_write(reg);
    register_exists(reg);
    register_size(reg);
    register_list(reg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::sandbox::Sandbox;

    fn ev_with_sandbox() -> (Evaluator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut ev = Evaluator::new(Value::Null, Registry::new());
        ev.set_sandbox(Sandbox::new(dir.path(), 1024).unwrap());
        (ev, dir)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (mut ev, _dir) = ev_with_sandbox();
        write(&mut ev, &[Value::String("a.txt".into()), Value::String("hi".into())], &[true, true], "file.write").unwrap();
        let (v, _) = read(&mut ev, &[Value::String("a.txt".into())], &[true], "file.read").unwrap();
        assert_eq!(v, Value::String("hi".into()));
    }

    #[test]
    fn missing_sandbox_is_a_fatal_function_error() {
        let mut ev = Evaluator::new(Value::Null, Registry::new());
        assert!(read(&mut ev, &[Value::String("a.txt".into())], &[true], "file.read").is_err());
    }
}
