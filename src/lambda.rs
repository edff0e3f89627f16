// Lambda engine: `$L{BODY}` values are JSON fragments containing `%N` /
// `%name%` placeholders, carried around as plain text so that a placeholder
// can sit in the middle of a string literal (`"hello %0!"`) and not just at
// a whole-value position. Application rewrites the text and only re-parses
// it into a `Value` once all the substitution for this round is done.
//
// This operates on a textual "lambda string" form rather than walking the
// parsed `Value` tree directly, because placeholder substitution is a
// string-splice operation at heart: the alternative (an AST with holes)
// can't represent a placeholder embedded inside a string literal without
// effectively re-deriving the same text representation internally.

use crate::error::{Error, ErrorKind};
use crate::tokenizer::find_balanced;
use crate::value::Value;
use std::collections::{HashMap, HashSet};

pub const LAMBDA_MARKER: &str = "$L{";

/// Wrap a value as `$L{...}`, S-wrapping its string literals so the result
/// is safe to splice into other lambda-string text.
pub fn to_lambda_string(value: &Value) -> String {
    let json = value.to_json_string(None);
    swrap_encode(&json)
}

/// Parse a lambda-string fragment back into a `Value`, decoding `$S{...}`
/// markers back into proper JSON string literals first.
pub fn to_lambda_object(text: &str) -> Result<Value, Error> {
    let decoded = swrap_decode(text);
    let json: serde_json::Value = serde_json::from_str(&decoded).map_err(|e| {
        Error::new(ErrorKind::Message(format!("lambda body is not valid JSON after substitution: {e} in: {decoded}")))
    })?;
    Ok(Value::from_json(json))
}

/// Replace every JSON string literal in `json_text` with `$S{<raw content>}`.
fn swrap_encode(json_text: &str) -> String {
    let mut out = String::new();
    let mut chars = json_text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '"' {
            out.push(c);
            continue;
        }
        let mut content = String::new();
        let mut escaped = false;
        for c2 in chars.by_ref() {
            if escaped {
                // keep the JSON escape sequence verbatim; it gets
                // re-escaped correctly on decode along with everything else.
                content.push('\\');
                content.push(c2);
                escaped = false;
                continue;
            }
            if c2 == '\\' {
                escaped = true;
                continue;
            }
            if c2 == '"' {
                break;
            }
            content.push(c2);
        }
        out.push_str("$S{");
        out.push_str(&unescape_json_fragment(&content));
        out.push('}');
    }
    out
}

fn unescape_json_fragment(s: &str) -> String {
    // Best-effort unescape of common JSON escapes so the S-wrapped payload
    // holds the string's literal characters rather than its JSON spelling.
    let mut out = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Decode every top-level `$S{...}` span back into a properly escaped JSON
/// string literal. Content inside a span is taken verbatim, not recursively
/// decoded: a `$S{}` that shows up inside another `$S{}` belongs to a
/// not-yet-applied nested lambda and must survive untouched, exactly as
/// written, until that lambda is itself applied.
fn swrap_decode(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'S') && chars.get(i + 2) == Some(&'{') {
            let close = find_balanced(&chars, i + 2, '{', '}').unwrap_or(chars.len() - 1);
            let inner: String = chars[i + 3..close].iter().collect();
            out.push('"');
            out.push_str(&escape_json_string(&inner));
            out.push('"');
            i = close + 1;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn find_marker(chars: &[char], from: usize, marker: &str) -> Option<usize> {
    let m: Vec<char> = marker.chars().collect();
    if m.is_empty() || from + m.len() > chars.len() {
        return None;
    }
    let mut i = from;
    while i + m.len() <= chars.len() {
        if chars[i..i + m.len()] == m[..] {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Segments of `chars` that are NOT inside a nested `$L{...}` block. A
/// placeholder inside a nested block belongs to that inner lambda, not to
/// whichever outer `apply` call is currently running.
fn find_lambda_scope(chars: &[char]) -> Vec<(usize, usize)> {
    let mut scope = Vec::new();
    let mut start = 0;
    loop {
        match find_marker(chars, start, LAMBDA_MARKER) {
            Some(found) => {
                scope.push((start, found));
                let brace = found + 2;
                let close = find_balanced(chars, brace, '{', '}').unwrap_or(chars.len().saturating_sub(1));
                start = close + 1;
            }
            None => {
                scope.push((start, chars.len()));
                break;
            }
        }
    }
    scope
}

#[derive(Debug, Clone)]
struct Placeholder {
    is_null: bool,
    idx: Option<u32>,
    name: Option<String>,
    /// Byte-ish (char) span of just the digits that get rewritten during
    /// index renumbering: `None` when there's no index portion at all.
    idx_span: Option<(usize, usize)>,
    start: usize,
    end: usize,
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Match a `%...` placeholder starting at `at` (which must be `%`).
fn match_placeholder(chars: &[char], at: usize) -> Option<Placeholder> {
    if chars.get(at) != Some(&'%') {
        return None;
    }
    let mut i = at + 1;
    let is_null = chars.get(i) == Some(&'~');
    if is_null {
        i += 1;
    }

    let digit_start = i;
    while chars.get(i).map(|c| c.is_ascii_digit()).unwrap_or(false) {
        i += 1;
    }
    if i > digit_start {
        let idx: u32 = chars[digit_start..i].iter().collect::<String>().parse().ok()?;
        return Some(Placeholder {
            is_null,
            idx: Some(idx),
            name: None,
            idx_span: Some((digit_start, i)),
            start: at,
            end: i,
        });
    }

    if chars.get(i).map(|&c| is_name_start(c)).unwrap_or(false) {
        let name_start = i;
        i += 1;
        while chars.get(i).map(|&c| is_name_char(c)).unwrap_or(false) {
            i += 1;
        }
        let name: String = chars[name_start..i].iter().collect();

        let mut idx = None;
        let mut idx_span = None;
        if chars.get(i) == Some(&':') {
            let colon = i;
            let mut j = colon + 1;
            let num_start = j;
            while chars.get(j).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                j += 1;
            }
            if j > num_start {
                idx = chars[num_start..j].iter().collect::<String>().parse().ok();
                idx_span = Some((num_start, j));
                i = j;
            }
        }

        if chars.get(i) == Some(&'%') {
            let end = i + 1;
            return Some(Placeholder { is_null, idx, name: Some(name), idx_span, start: at, end });
        }
    }

    None
}

/// Renumber distinct positional indices within `chars`' scope gaps to a
/// dense 0..N range in ascending order, leaving nested-lambda blocks
/// untouched. Returns the rewritten text and whether any placeholder
/// (indexed or named) was found anywhere in the scope gaps.
fn norm_lambda_indices(chars: &[char], scope: &[(usize, usize)]) -> (String, bool) {
    let mut indices: Vec<(u32, usize, usize)> = Vec::new();
    let mut has_any = false;

    for &(s, e) in scope {
        let mut i = s;
        while i < e {
            if chars[i] == '%' {
                if let Some(p) = match_placeholder(chars, i) {
                    has_any = true;
                    if let Some((a, b)) = p.idx_span {
                        indices.push((p.idx.unwrap(), a, b));
                    }
                    i = p.end.max(i + 1);
                    continue;
                }
            }
            i += 1;
        }
    }

    if indices.is_empty() {
        return (chars.iter().collect(), has_any);
    }

    let mut distinct: Vec<u32> = indices.iter().map(|&(idx, _, _)| idx).collect();
    distinct.sort_unstable();
    distinct.dedup();

    let mut out = String::new();
    let mut cursor = 0;
    for &(idx, a, b) in &indices {
        out.extend(&chars[cursor..a]);
        let new_idx = distinct.iter().position(|&d| d == idx).unwrap();
        out.push_str(&new_idx.to_string());
        cursor = b;
    }
    out.extend(&chars[cursor..]);
    (out, has_any)
}

/// Substitute available positional/named args into `chars`' scope gaps,
/// leaving nested-lambda blocks untouched. Returns the rewritten text.
fn substitute(
    chars: &[char],
    scope: &[(usize, usize)],
    positional: &[Value],
    named: &HashMap<String, Value>,
    used_idx: &mut HashSet<usize>,
    used_name: &mut HashSet<String>,
) -> String {
    let mut out = String::new();
    let mut prev_end = 0;
    for &(s, e) in scope {
        // copy the nested-lambda-block text between the previous scope gap
        // and this one, verbatim.
        out.extend(&chars[prev_end..s]);

        let mut i = s;
        let mut seg_cursor = s;
        while i < e {
            if chars[i] == '%' {
                if let Some(p) = match_placeholder(chars, i) {
                    let replacement = if let Some(idx) = p.idx {
                        let idx = idx as usize;
                        if idx < positional.len() {
                            used_idx.insert(idx);
                            if p.is_null {
                                Some(String::new())
                            } else {
                                Some(arg_to_lambda_text(&positional[idx]))
                            }
                        } else {
                            None
                        }
                    } else if let Some(name) = &p.name {
                        if let Some(v) = named.get(name) {
                            used_name.insert(name.clone());
                            if p.is_null {
                                Some(String::new())
                            } else {
                                Some(arg_to_lambda_text(v))
                            }
                        } else {
                            None
                        }
                    } else {
                        None
                    };

                    if let Some(text) = replacement {
                        out.extend(&chars[seg_cursor..p.start]);
                        out.push_str(&text);
                        seg_cursor = p.end;
                    }
                    i = p.end.max(i + 1);
                    continue;
                }
            }
            i += 1;
        }
        out.extend(&chars[seg_cursor..e]);
        prev_end = e;
    }
    out.extend(&chars[prev_end..]);
    out
}

/// Lambda-string form of a value used as a substitution argument. Strings
/// splice their raw characters directly (so `%0` inside `"hello %0!"`
/// composes naturally); any other value splices as a literal-marked
/// unwrap call so it re-parses to the right type once the round completes.
fn arg_to_lambda_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format!("$*{{^{}}}", to_lambda_string(other)),
    }
}

fn has_any_placeholder_in_scope(chars: &[char], scope: &[(usize, usize)]) -> bool {
    for &(s, e) in scope {
        let mut i = s;
        while i < e {
            if chars[i] == '%' {
                if match_placeholder(chars, i).is_some() {
                    return true;
                }
            }
            i += 1;
        }
    }
    false
}

/// Apply a lambda body (the `Value` that sat between `$L{` and `}`) to a
/// list of arguments. Arguments that are `Value::NamedArg` are routed to the
/// named bucket; everything else is positional, in order. Returns the body
/// unchanged if no arguments were given (matching a no-op call).
///
/// The body is re-wrapped in a synthetic top-level `$L{...}` before the
/// substitution loop runs, so the same "find the next `$L{`, reduce it"
/// pass handles both this call's own placeholders and any lambda values
/// nested inside the body as data (partial application / currying).
pub fn apply(body: &Value, args: &[Value]) -> Result<Value, Error> {
    if args.is_empty() {
        return Ok(body.clone());
    }

    let mut positional: Vec<Value> = Vec::new();
    let mut named: HashMap<String, Value> = HashMap::new();
    for a in args {
        match a {
            Value::NamedArg(n, v) => {
                named.insert(n.clone(), (**v).clone());
            }
            other => positional.push(other.clone()),
        }
    }

    let mut call_body = format!("{LAMBDA_MARKER}{}}}", to_lambda_string(body));

    loop {
        let chars: Vec<char> = call_body.chars().collect();
        if positional.is_empty() && named.is_empty() {
            break;
        }
        if find_marker(&chars, 0, LAMBDA_MARKER).is_none() {
            break;
        }

        let mut out = String::new();
        let mut i = 0;
        let mut used_idx = HashSet::new();
        let mut used_name = HashSet::new();
        let mut changed = false;

        while let Some(marker) = find_marker(&chars, i, LAMBDA_MARKER) {
            out.extend(&chars[i..marker]);
            let brace = marker + 2;
            let close = find_balanced(&chars, brace, '{', '}')
                .ok_or_else(|| Error::fatal(ErrorKind::Lambda))?;
            i = close + 1;

            let inner: Vec<char> = chars[brace + 1..close].to_vec();
            let scope1 = find_lambda_scope(&inner);
            let (renumbered, _) = norm_lambda_indices(&inner, &scope1);
            let renumbered_chars: Vec<char> = renumbered.chars().collect();

            let scope2 = find_lambda_scope(&renumbered_chars);
            let substituted = substitute(&renumbered_chars, &scope2, &positional, &named, &mut used_idx, &mut used_name);
            if substituted != renumbered {
                changed = true;
            }

            let sub_chars: Vec<char> = substituted.chars().collect();
            let scope3 = find_lambda_scope(&sub_chars);
            let (final_body, _) = norm_lambda_indices(&sub_chars, &scope3);
            let final_chars: Vec<char> = final_body.chars().collect();
            let scope4 = find_lambda_scope(&final_chars);
            let still_has_pars = has_any_placeholder_in_scope(&final_chars, &scope4);

            if still_has_pars {
                out.push_str(LAMBDA_MARKER);
                out.push_str(&final_body);
                out.push('}');
            } else {
                out.push_str(&final_body);
            }
        }
        out.extend(&chars[i..]);
        call_body = out;

        positional = positional
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !used_idx.contains(idx))
            .map(|(_, v)| v)
            .collect();
        for k in used_name.drain() {
            named.remove(&k);
        }

        if !changed {
            break;
        }
    }

    if call_body.trim_start().starts_with(LAMBDA_MARKER) {
        // still has unresolved parameters: stays a lambda value.
        Ok(Value::String(call_body))
    } else {
        to_lambda_object(&call_body).map_err(|e| e.wrap(ErrorKind::Lambda))
    }
}

/// Used by the evaluator's `!lambda`/literal-body construction path: wrap a
/// fully-built value as a (possibly parameter-free) lambda value so it is
/// recognized by the document walker as callable data rather than plain
/// data. A body with no placeholders at any nesting level is returned as a
/// plain `$L{...}` wrapper regardless; whether to actually keep it wrapped
/// is a call the evaluator makes based on context (the `__lambda__` key).
pub fn wrap(body: &Value) -> Value {
    Value::String(format!("{LAMBDA_MARKER}{}}}", to_lambda_string(body)))
}

/// Returns `Some(inner_json_text)` if `s` is (only) a `$L{...}` wrapper.
pub fn unwrap_marker(s: &str) -> Option<&str> {
    let s = s.trim();
    let rest = s.strip_prefix(LAMBDA_MARKER)?;
    rest.strip_suffix('}')
}

/// Recover the `Value` body of a lambda value, for callers (`!`, `!foreach`,
/// `!where`) that need to apply it. Fails if `value` isn't a `$L{...}` string.
pub fn body_of(value: &Value) -> Result<Value, Error> {
    let Value::String(s) = value else {
        return Err(Error::fatal(ErrorKind::Message(format!("value is not callable: {}", value.type_name()))));
    };
    let inner = unwrap_marker(s).ok_or_else(|| Error::fatal(ErrorKind::Message(format!("value is not a lambda: {s}"))))?;
    to_lambda_object(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn swrap_roundtrips_plain_string() {
        let v = Value::String("hello world".into());
        let encoded = to_lambda_string(&v);
        assert_eq!(encoded, "$S{hello world}");
        let decoded = to_lambda_object(&encoded).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn swrap_roundtrips_list_and_map() {
        let mut m = indexmap::IndexMap::new();
        m.insert("a".to_string(), Value::Int(1));
        m.insert("b".to_string(), Value::List(vec![Value::String("x".into()), Value::Bool(true)]));
        let v = Value::Map(m);
        let encoded = to_lambda_string(&v);
        let decoded = to_lambda_object(&encoded).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn applies_positional_placeholder() {
        // body: ["%0", "%1"], applied to (1, 2). Each slot was a whole JSON
        // string, so the non-string args come back as `$*{^N}` splices: the
        // document evaluator resolves those to real ints on its next string
        // reduction pass, which is out of scope for `apply` alone.
        let body = Value::List(vec![Value::String("%0".into()), Value::String("%1".into())]);
        let result = apply(&body, &[Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(
            result,
            Value::List(vec![Value::String("$*{^1}".into()), Value::String("$*{^2}".into())])
        );
    }

    #[test]
    fn applies_named_placeholder() {
        let body = Value::String("hello %name%".into());
        let arg = Value::NamedArg("name".into(), Box::new(Value::String("world".into())));
        let result = apply(&body, &[arg]).unwrap();
        assert_eq!(result, Value::String("hello world".into()));
    }

    #[test]
    fn leaves_nested_lambda_untouched() {
        // body: [$L{"%0"}, "%1"] - the nested lambda's own %0 must survive
        // this outer application untouched; only the outer %1 substitutes.
        let nested = wrap(&Value::String("%0".into()));
        let body = Value::List(vec![nested, Value::String("%1".into())]);
        let result = apply(&body, &[Value::Int(7)]).unwrap();
        if let Value::List(items) = &result {
            assert_eq!(items[1], Value::String("$*{^7}".into()));
            assert_eq!(items[0], wrap(&Value::String("%0".into())));
        } else {
            panic!("expected list, got {result:?}");
        }
    }

    #[test]
    fn partial_application_keeps_lambda_wrapped() {
        let body = Value::List(vec![Value::String("%0".into()), Value::String("%1".into())]);
        let once = apply(&body, &[Value::Int(1)]).unwrap();
        // still has one unresolved parameter, so it's a lambda wrapper.
        if let Value::String(s) = &once {
            assert!(s.starts_with(LAMBDA_MARKER));
        } else {
            panic!("expected a still-wrapped lambda string, got {once:?}");
        }
    }
}
