// Reference path descent: a single `:`-separated segment stepping into a
// map, list, or string, including Python-style negative indices and
// `first~last+step` slicing. Path splitting and head-variable lookup (which
// need access to the evaluator to resolve `$`-expressions embedded in a
// segment) live in `eval.rs::resolve_reference`; this module only does the
// per-segment descent once the head value is already in hand.

use crate::error::{Error, ErrorKind};
use crate::value::Value;

pub fn descend(value: &Value, seg: &str) -> Result<Value, Error> {
    match value {
        Value::Map(m) => m
            .get(seg)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::DictSelection { key: seg.to_string() })),
        Value::List(l) => descend_sequence(l.len(), seg, |indices| {
            if indices.len() == 1 {
                l[indices[0]].clone()
            } else {
                Value::List(indices.iter().map(|&i| l[i].clone()).collect())
            }
        }),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            descend_sequence(chars.len(), seg, |indices| {
                if indices.len() == 1 {
                    Value::String(chars[indices[0]].to_string())
                } else {
                    Value::String(indices.iter().map(|&i| chars[i]).collect())
                }
            })
        }
        other => Err(Error::new(ErrorKind::Message(format!(
            "cannot select key '{seg}' in a {}",
            other.type_name()
        )))),
    }
}

fn descend_sequence(len: usize, seg: &str, build: impl Fn(&[usize]) -> Value) -> Result<Value, Error> {
    if let Some(indices) = parse_slice(seg, len) {
        return Ok(build(&indices));
    }
    let idx: i64 = seg
        .parse()
        .map_err(|_| Error::new(ErrorKind::Message(format!("invalid index '{seg}'"))))?;
    let norm = Value::norm_index(idx, len)
        .ok_or_else(|| Error::new(ErrorKind::ListSelection { index: idx, len }))?;
    Ok(build(&[norm]))
}

/// Parse `first~last+step` / `first~last-step` / `~last` / `first~` etc.
/// Returns `None` if `seg` doesn't contain a `~` (i.e. it's a plain index).
fn parse_slice(seg: &str, len: usize) -> Option<Vec<usize>> {
    let tilde = seg.find('~')?;
    let first_str = &seg[..tilde];
    let rest = &seg[tilde + 1..];

    // A sign at position >= 1 in `rest` separates the last-index digits from
    // an explicit step; a sign at position 0 belongs to the last index itself.
    let mut split_at = None;
    for (i, c) in rest.char_indices() {
        if i > 0 && (c == '+' || c == '-') {
            split_at = Some(i);
            break;
        }
    }
    let (last_str, step_str) = match split_at {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };

    let len_i = len as i64;
    let norm = |i: i64| -> i64 { if i < 0 { i + len_i } else { i } };

    let first = parse_opt_i64(first_str).map(norm);
    let last = parse_opt_i64(last_str).map(norm);
    let step: i64 = if step_str.is_empty() {
        match (first, last) {
            (Some(f), Some(l)) if l < f => -1,
            _ => 1,
        }
    } else {
        step_str.parse().ok()?
    };
    if step == 0 {
        return Some(Vec::new());
    }

    let first = first.unwrap_or(if step >= 0 { 0 } else { len_i - 1 });
    let last = last.unwrap_or(if step >= 0 { len_i - 1 } else { 0 });

    let mut out = Vec::new();
    let mut i = first;
    if step > 0 {
        while i <= last {
            if i >= 0 && i < len_i {
                out.push(i as usize);
            }
            i += step;
        }
    } else {
        while i >= last {
            if i >= 0 && i < len_i {
                out.push(i as usize);
            }
            i += step;
        }
    }
    Some(out)
}

fn parse_opt_i64(s: &str) -> Option<i64> {
    if s.is_empty() {
        None
    } else {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descends_into_map_and_list() {
        let mut m = indexmap::IndexMap::new();
        m.insert("items".to_string(), Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]));
        let doc = Value::Map(m);
        let items = descend(&doc, "items").unwrap();
        assert_eq!(descend(&items, "1").unwrap(), Value::Int(20));
        assert_eq!(descend(&items, "-1").unwrap(), Value::Int(30));
    }

    #[test]
    fn slice_with_reverse_step() {
        let l = Value::List((0..6).map(Value::Int).collect());
        // 5~1-2: from index 5 down to 1 stepping by -2 -> 5, 3, 1
        let r = descend(&l, "5~1-2").unwrap();
        assert_eq!(r, Value::List(vec![Value::Int(5), Value::Int(3), Value::Int(1)]));
    }

    #[test]
    fn missing_dict_key_errors() {
        let mut m = indexmap::IndexMap::new();
        m.insert("a".to_string(), Value::Int(1));
        let doc = Value::Map(m);
        assert!(descend(&doc, "b").is_err());
    }
}
