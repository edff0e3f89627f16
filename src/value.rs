// Value model: the tagged union every ison document node reduces to.

use indexmap::IndexMap;
use std::fmt;

/// Reserved document keys that carry evaluator state instead of user data.
pub const KEY_RUNTIME_VARS: &str = "__runtime_vars__";
pub const KEY_GLOBALS: &str = "__globals__";
pub const KEY_LOCALS: &str = "__locals__";
pub const KEY_FUNC_GLOBALS: &str = "__func_globals__";
pub const KEY_FUNC_LOCALS: &str = "__func_locals__";
pub const KEY_INCLUDES: &str = "__includes__";
pub const KEY_PLATFORM: &str = "__platform__";
pub const KEY_PRE: &str = "__pre__";
pub const KEY_LAMBDA: &str = "__lambda__";

pub fn is_reserved_key(key: &str) -> bool {
    matches!(
        key,
        KEY_RUNTIME_VARS
            | KEY_GLOBALS
            | KEY_LOCALS
            | KEY_FUNC_GLOBALS
            | KEY_FUNC_LOCALS
            | KEY_INCLUDES
            | KEY_PLATFORM
            | KEY_PRE
            | KEY_LAMBDA
    )
}

/// All five variable-definition block keys, in the order in which they are
/// collected and installed when the evaluator enters a map node.
pub const VAR_BLOCK_KEYS: [&str; 5] = [
    KEY_RUNTIME_VARS,
    KEY_GLOBALS,
    KEY_LOCALS,
    KEY_FUNC_GLOBALS,
    KEY_FUNC_LOCALS,
];

/// A document value. Maps preserve insertion order since key order drives
/// evaluation order for variable-definition blocks and ordinary children.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// A `name=value` argument slot that survived evaluation without being
    /// consumed by a named-argument-aware callee. Only ever appears as a
    /// transient argument value, never nested in a document tree.
    NamedArg(String, Box<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::NamedArg(..) => "named-arg",
        }
    }

    /// Truthiness used by conditional builtins: null, false, 0, 0.0, "" and
    /// empty lists/maps are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::NamedArg(_, v) => v.is_truthy(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// A plain call-argument slot with no `$`-expressions reduces to a string
    /// even for a bare numeric literal, so number-shaped strings coerce here
    /// rather than forcing every caller to re-parse them.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::List(l) => Some(l.len()),
            Value::Map(m) => Some(m.len()),
            Value::String(s) => Some(s.chars().count()),
            _ => None,
        }
    }

    /// Negative-index wraparound as used throughout reference resolution and
    /// list slicing: -1 is the last element, -len is the first.
    pub fn norm_index(idx: i64, len: usize) -> Option<usize> {
        let len = len as i64;
        let norm = if idx < 0 { idx + len } else { idx };
        if norm < 0 || norm >= len {
            None
        } else {
            Some(norm as usize)
        }
    }

    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(o) => {
                let mut m = IndexMap::with_capacity(o.len());
                for (k, v) in o {
                    m.insert(k, Value::from_json(v));
                }
                Value::Map(m)
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Value::Map(m) => {
                let mut o = serde_json::Map::with_capacity(m.len());
                for (k, v) in m {
                    o.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(o)
            }
            Value::NamedArg(_, v) => v.to_json(),
        }
    }

    /// Canonical JSON text as used by `ToString` and compact lambda-body
    /// serialization. `indent` of `None` means compact.
    pub fn to_json_string(&self, indent: Option<usize>) -> String {
        let j = self.to_json();
        match indent {
            Some(n) => {
                let buf = Vec::new();
                let indent_bytes = vec![b' '; n];
                let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent_bytes);
                let mut ser = serde_json::Serializer::with_formatter(buf, formatter);
                use serde::Serialize;
                j.serialize(&mut ser).expect("json serialization cannot fail");
                String::from_utf8(ser.into_inner()).expect("json output is utf8")
            }
            None => j.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(fl) => write!(f, "{fl}"),
            _ => write!(f, "{}", self.to_json_string(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_empty_collections() {
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::List(vec![Value::Int(0)]).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::Int(0).is_truthy());
    }

    #[test]
    fn norm_index_wraps_negative() {
        assert_eq!(Value::norm_index(-1, 5), Some(4));
        assert_eq!(Value::norm_index(-5, 5), Some(0));
        assert_eq!(Value::norm_index(-6, 5), None);
        assert_eq!(Value::norm_index(5, 5), None);
    }

    #[test]
    fn json_roundtrip_preserves_map_order() {
        let j: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let v = Value::from_json(j);
        if let Value::Map(m) = &v {
            assert_eq!(m.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        } else {
            panic!("expected map");
        }
    }

    #[test]
    fn as_int_coerces_a_numeric_string() {
        assert_eq!(Value::String("42".into()).as_int(), Some(42));
        assert_eq!(Value::String("not a number".into()).as_int(), None);
    }

    #[test]
    fn as_f64_coerces_a_numeric_string() {
        assert_eq!(Value::String("3.5".into()).as_f64(), Some(3.5));
        assert_eq!(Value::String("nope".into()).as_f64(), None);
    }
}
