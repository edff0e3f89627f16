// Argument splitter: bracket- and quote-aware comma (or colon) splitting,
// plus the six argument-slot classification rules used when evaluating a
// function call's or lambda's argument list.

use crate::error::Error;

/// Split `text` on top-level occurrences of `sep`, skipping over anything
/// nested inside `()`, `[]`, `{}` or a quoted run (`'`, `"`, `` ` ``).
/// Each returned slot is trimmed of surrounding whitespace.
pub fn split_args(text: &str, sep: char) -> Result<Vec<String>, Error> {
    let mut out = Vec::new();
    let mut depth = [0i32; 3]; // (), [], {}
    let opens = ['(', '[', '{'];
    let closes = [')', ']', '}'];
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    let chars: Vec<char> = text.chars().collect();
    let mut prev = '\0';

    for (i, &c) in chars.iter().enumerate() {
        if quote.is_none() && (c == '\'' || c == '"' || c == '`') {
            quote = Some(c);
        } else if quote == Some(c) && prev != '\\' {
            quote = None;
        }

        if quote.is_none() {
            if c == sep && depth.iter().all(|&d| d == 0) {
                out.push(chars[start..i].iter().collect::<String>().trim().to_string());
                start = i + 1;
            } else if let Some(idx) = opens.iter().position(|&o| o == c) {
                depth[idx] += 1;
            } else if let Some(idx) = closes.iter().position(|&o| o == c) {
                if depth[idx] == 0 {
                    return Err(Error::message(format!(
                        "unexpected close bracket '{}' in: {}",
                        closes[idx],
                        crate::error::highlight(text, i, i + 1)
                    )));
                }
                depth[idx] -= 1;
            }
        }
        prev = c;
    }

    if quote.is_some() {
        return Err(Error::message(format!("missing closing quote in: {text}")));
    }
    if let Some(idx) = depth.iter().position(|&d| d != 0) {
        return Err(Error::message(format!("missing closing '{}' in: {}", closes[idx], text)));
    }

    out.push(chars[start..].iter().collect::<String>().trim().to_string());
    Ok(out)
}

pub fn split_commas(text: &str) -> Result<Vec<String>, Error> {
    split_args(text, ',')
}

pub fn split_path(text: &str) -> Result<Vec<String>, Error> {
    split_args(text, ':')
}

/// The classification a single argument slot falls into. Checked in this
/// order: placeholder, literal, unroll, named, tuple, plain.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgKind {
    /// `%...` - passed through unevaluated, only meaningful inside a
    /// lambda body being assembled, not evaluated as document text.
    Placeholder(String),
    /// `^expr` - evaluate `expr` but mark the resulting value literal so it
    /// isn't re-tokenized on a later pass.
    Literal(String),
    /// `*$expr` - evaluate `expr` (expected to produce a list or map) and
    /// splice its elements into the surrounding argument list.
    Unroll(String),
    /// `name=value` - a named argument.
    Named(String, String),
    /// `(a, b, c)` - a parenthesized tuple, itself containing further
    /// comma-separated slots.
    Tuple(String),
    /// Anything else: plain text to evaluate as a nested document string.
    Plain(String),
}

pub fn classify(slot: &str) -> ArgKind {
    let trimmed = slot.trim();
    if let Some(rest) = trimmed.strip_prefix('%') {
        return ArgKind::Placeholder(rest.to_string());
    }
    if let Some(rest) = trimmed.strip_prefix('^') {
        return ArgKind::Literal(rest.to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("*$") {
        return ArgKind::Unroll(format!("${rest}"));
    }
    if let Some((name, value)) = split_named(trimmed) {
        return ArgKind::Named(name, value);
    }
    if trimmed.starts_with('(') && trimmed.ends_with(')') && trimmed.len() >= 2 {
        return ArgKind::Tuple(trimmed[1..trimmed.len() - 1].to_string());
    }
    ArgKind::Plain(trimmed.to_string())
}

fn split_named(s: &str) -> Option<(String, String)> {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let first = bytes[0] as char;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let mut i = 1;
    let chars: Vec<char> = s.chars().collect();
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
            i += 1;
        } else {
            break;
        }
    }
    let mut j = i;
    while j < chars.len() && chars[j].is_whitespace() {
        j += 1;
    }
    if j >= chars.len() || chars[j] != '=' {
        return None;
    }
    // reject `==` style comparisons leaking in, and named arg syntax is only
    // valid with a single `=`.
    if j + 1 < chars.len() && chars[j + 1] == '=' {
        return None;
    }
    let name: String = chars[..i].iter().collect();
    let value: String = chars[j + 1..].iter().collect::<String>().trim().to_string();
    Some((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_commas_only() {
        let parts = split_commas("a, (b, c), d").unwrap();
        assert_eq!(parts, vec!["a", "(b, c)", "d"]);
    }

    #[test]
    fn splits_path_on_colon_honoring_nested_funcs() {
        let parts = split_path("id:!ref(id:hello:name):value").unwrap();
        assert_eq!(parts, vec!["id", "!ref(id:hello:name)", "value"]);
    }

    #[test]
    fn quoted_separators_are_not_split_points() {
        let parts = split_commas("'a, b', c").unwrap();
        assert_eq!(parts, vec!["'a, b'", "c"]);
    }

    #[test]
    fn classify_named_arg() {
        assert_eq!(classify("count = 5"), ArgKind::Named("count".into(), "5".into()));
    }

    #[test]
    fn classify_literal_and_unroll_and_tuple() {
        assert_eq!(classify("^x"), ArgKind::Literal("x".into()));
        assert_eq!(classify("*$list"), ArgKind::Unroll("$list".into()));
        assert_eq!(classify("(1, 2)"), ArgKind::Tuple("1, 2".into()));
    }

    #[test]
    fn unbalanced_brackets_error() {
        assert!(split_commas("a, (b, c").is_err());
        assert!(split_commas("a), b").is_err());
    }
}
