//! Path-inspection namespace, registered as a single dispatcher under
//! `path.*`: `path.name`, `path.parent`, `path.ext`, `path.join`.
//!
//! All operations are pure string/`Path` manipulation; they never touch the
//! sandboxed filesystem (see `fs.rs` for that).

use crate::error::{Error, ErrorKind, Result};
use crate::eval::Evaluator;
use crate::value::Value;
use ison_macros::builtin;
use std::path::Path;

fn as_str<'a>(v: &'a Value, func: &str) -> Result<&'a str> {
    v.as_str().ok_or_else(|| {
        Error::fatal(ErrorKind::FunctionMessage { func: func.to_string(), message: format!("expected a string, got {}", v.type_name()) })
    })
}

#[builtin(name = "path.*")]
pub fn dispatch(_ev: &mut Evaluator, args: &[Value], _flags: &[bool], name: &str) -> Result<(Value, bool)> {
    match name {
        "path.name" => {
            let p = as_str(args.first().unwrap_or(&Value::Null), name)?;
            let n = Path::new(p).file_name().and_then(|s| s.to_str()).unwrap_or("").to_string();
            Ok((Value::String(n), false))
        }
        "path.parent" => {
            let p = as_str(args.first().unwrap_or(&Value::Null), name)?;
            let parent = Path::new(p).parent().and_then(|s| s.to_str()).unwrap_or("").to_string();
            Ok((Value::String(parent), false))
        }
        "path.ext" => {
            let p = as_str(args.first().unwrap_or(&Value::Null), name)?;
            let ext = Path::new(p).extension().and_then(|s| s.to_str()).unwrap_or("").to_string();
            Ok((Value::String(ext), false))
        }
        "path.join" => {
            let mut out = std::path::PathBuf::new();
            for a in args {
                out.push(as_str(a, name)?);
            }
            Ok((Value::String(out.to_string_lossy().into_owned()), false))
        }
        other => Err(Error::fatal(ErrorKind::FunctionMessage { func: other.to_string(), message: "unknown path function".into() })),
    }
}

pub fn register_all(reg: &mut crate::registry::Registry) {
    register_dispatch(reg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn ev() -> Evaluator {
        Evaluator::new(Value::Null, Registry::new())
    }

    #[test]
    fn name_and_ext_split_a_file_path() {
        let p = Value::String("/a/b/report.json".into());
        let (v, _) = dispatch(&mut ev(), &[p.clone()], &[true], "path.name").unwrap();
        assert_eq!(v, Value::String("report.json".into()));
        let (v, _) = dispatch(&mut ev(), &[p], &[true], "path.ext").unwrap();
        assert_eq!(v, Value::String("json".into()));
    }

    #[test]
    fn join_concatenates_segments() {
        let args = vec![Value::String("a".into()), Value::String("b.txt".into())];
        let (v, _) = dispatch(&mut ev(), &args, &[true, true], "path.join").unwrap();
        assert_eq!(v, Value::String("a/b.txt".into()));
    }
}
