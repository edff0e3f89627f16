//! Command-line front end: reads a document, evaluates it, writes the
//! result. A single-shot document transformer, not a REPL — `filename_in`
//! and `filename_out` name the two ends of the pipe, either of which may be
//! `-` for stdin/stdout.

use clap::Parser;
use indexmap::IndexMap;
use ison::sandbox::Sandbox;
use ison::value::{is_reserved_key, Value};
use ison::{default_registry, Evaluator};
use std::io::Read as _;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "ison", version, about = "Evaluate an ison document", long_about = None)]
struct CliArgs {
    /// Input document, or `-` for stdin.
    #[arg(default_value = "-")]
    filename_in: String,

    /// Output destination, or `-` for stdout.
    #[arg(default_value = "-")]
    filename_out: String,

    /// JSON indent on output; omit for the default pretty width.
    #[arg(short = 'i', long = "indent-output", value_name = "N")]
    indent_output: Option<usize>,

    /// Return only `result[K]` instead of the whole document.
    #[arg(short = 'r', long = "result-key", value_name = "K")]
    result_key: Option<String>,

    /// Strip every reserved variable-block key from the output.
    #[arg(long = "strip-vars")]
    strip_vars: bool,

    /// `key=value` pair injected into `run.kwargs`; `value` of `-` reads from
    /// stdin. Repeatable.
    #[arg(short = 'a', long = "args", value_name = "K=V", action = clap::ArgAction::Append)]
    args: Vec<String>,
}

const DEFAULT_INDENT: usize = 4;

fn main() {
    let cli = CliArgs::parse();
    if let Err(e) = run(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (run_args, kwargs) = parse_args(&cli.args, cli.filename_in == "-")?;

    let source = read_input(&cli.filename_in)?;
    let doc = parse_document(&source)?;

    let mut ev = Evaluator::new(doc.clone(), default_registry());
    ev.set_platform(std::env::consts::OS, std::env::var("HOSTNAME").unwrap_or_default());

    let cwd = std::env::current_dir()?;
    ev.set_sandbox(Sandbox::new(&cwd, 64 * 1024 * 1024)?);
    ev.set_include_loader(move |path: &str| {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ison::Error::message(format!("loading '{path}': {e}")))?;
        parse_document(&text).map_err(|e| ison::Error::message(e.to_string()))
    });

    ev.add_runtime_vars(run_const_vars(&cli.filename_in, &cwd, run_args, &kwargs), &Default::default());

    let mut result = ev.process(doc)?;

    if let Some(key) = &cli.result_key {
        result = select_result_key(result, key)?;
    }
    if cli.strip_vars {
        result = strip_vars(result);
    }

    let indent = cli.indent_output.unwrap_or(DEFAULT_INDENT);
    let text = Evaluator::to_string_canonical(&result, indent);
    write_output(&cli.filename_out, &text)?;

    if !ev.warnings.is_empty() {
        for w in ev.warnings.iter() {
            eprintln!("warning: {w}");
        }
    }
    Ok(())
}

fn read_input(filename_in: &str) -> Result<String, Box<dyn std::error::Error>> {
    if filename_in == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        Ok(s)
    } else {
        Ok(std::fs::read_to_string(resolve_input_path(filename_in)?)?)
    }
}

/// Tries `.json`, `.json5`, then `.ison` in turn when `path` has no suffix.
fn resolve_input_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    if p.extension().is_some() || p.exists() {
        return Ok(p.to_path_buf());
    }
    for ext in ["json", "json5", "ison"] {
        let candidate = p.with_extension(ext);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(format!("cannot find input file '{path}' (tried .json, .json5, .ison)").into())
}

fn parse_document(text: &str) -> ison::Result<Value> {
    let v: serde_json::Value = json5::from_str(text)
        .map_err(|e| ison::Error::message(format!("parsing document: {e}")))?;
    Ok(Value::from_json(v))
}

fn write_output(filename_out: &str, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    if filename_out == "-" {
        println!("{text}");
    } else {
        std::fs::write(filename_out, text)?;
    }
    Ok(())
}

/// Parses `-a` entries: a bare `value` (no `=`) appends to `run.args`; a
/// `key=value` entry sets `run.kwargs[key]`. A value of `-` reads from
/// stdin, which conflicts with reading the document itself from stdin since
/// both would drain the same stream.
fn parse_args(pairs: &[String], stdin_is_document: bool) -> Result<(Vec<Value>, IndexMap<String, Value>), Box<dyn std::error::Error>> {
    let mut args = Vec::new();
    let mut kwargs = IndexMap::new();
    for pair in pairs {
        let resolve = |raw: &str| -> Result<String, Box<dyn std::error::Error>> {
            if raw == "-" {
                if stdin_is_document {
                    return Err("-a value '-' conflicts with reading the document from stdin".into());
                }
                let mut s = String::new();
                std::io::stdin().read_to_string(&mut s)?;
                Ok(s.trim_end_matches('\n').to_string())
            } else {
                Ok(raw.to_string())
            }
        };
        match pair.split_once('=') {
            Some((k, v)) => {
                kwargs.insert(k.trim().to_string(), Value::String(resolve(v.trim())?));
            }
            None => args.push(Value::String(resolve(pair.trim())?)),
        }
    }
    Ok((args, kwargs))
}

fn run_const_vars(filename_in: &str, cwd: &Path, args: Vec<Value>, kwargs: &IndexMap<String, Value>) -> IndexMap<String, Value> {
    let mut run = IndexMap::new();
    run.insert("cwd".to_string(), Value::String(cwd.display().to_string()));
    run.insert("args".to_string(), Value::List(args));
    run.insert("kwargs".to_string(), Value::Map(kwargs.clone()));
    run.insert("file".to_string(), Value::Map(run_file_vars(filename_in)));

    let mut vars = IndexMap::new();
    vars.insert("run".to_string(), Value::Map(run));
    vars
}

fn run_file_vars(filename_in: &str) -> IndexMap<String, Value> {
    let mut file = IndexMap::new();
    let source = if filename_in == "-" { "stdin".to_string() } else { "local".to_string() };
    let path = Path::new(filename_in);
    let dir = path.parent().map(|p| p.display().to_string()).unwrap_or_default();
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("").to_string();
    let basename = path.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_string();

    file.insert("source".to_string(), Value::String(source));
    file.insert("path".to_string(), Value::String(filename_in.to_string()));
    file.insert("dir".to_string(), Value::String(dir.clone()));
    file.insert("folder".to_string(), Value::String(dir));
    file.insert("ext".to_string(), Value::String(ext));
    file.insert("name".to_string(), Value::String(name));
    file.insert("basename".to_string(), Value::String(basename));
    file
}

fn select_result_key(result: Value, key: &str) -> Result<Value, Box<dyn std::error::Error>> {
    match result {
        Value::Map(mut m) => m
            .shift_remove(key)
            .ok_or_else(|| format!("result key '{key}' not found in result map").into()),
        other => Err(format!("--result-key requires a map result, got {}", other.type_name()).into()),
    }
}

fn strip_vars(v: Value) -> Value {
    match v {
        Value::Map(m) => Value::Map(
            m.into_iter()
                .filter(|(k, _)| !is_reserved_key(k))
                .map(|(k, v)| (k, strip_vars(v)))
                .collect(),
        ),
        Value::List(items) => Value::List(items.into_iter().map(strip_vars).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_args_builds_a_kwargs_map_and_a_positional_list() {
        let (args, kwargs) = parse_args(&["name=ferris".to_string(), "loose".to_string()], false).unwrap();
        assert_eq!(kwargs.get("name"), Some(&Value::String("ferris".into())));
        assert_eq!(args, vec![Value::String("loose".into())]);
    }

    #[test]
    fn parse_args_rejects_stdin_value_when_document_is_stdin() {
        assert!(parse_args(&["x=-".to_string()], true).is_err());
    }

    #[test]
    fn run_file_vars_splits_name_and_extension() {
        let file = run_file_vars("configs/site.json");
        assert_eq!(file.get("name"), Some(&Value::String("site.json".into())));
        assert_eq!(file.get("basename"), Some(&Value::String("site".into())));
        assert_eq!(file.get("ext"), Some(&Value::String("json".into())));
        assert_eq!(file.get("dir"), Some(&Value::String("configs".into())));
    }

    #[test]
    fn select_result_key_extracts_a_single_entry() {
        let mut m = IndexMap::new();
        m.insert("a".to_string(), Value::Int(1));
        m.insert("b".to_string(), Value::Int(2));
        let extracted = select_result_key(Value::Map(m), "b").unwrap();
        assert_eq!(extracted, Value::Int(2));
    }

    #[test]
    fn select_result_key_errors_on_non_map() {
        assert!(select_result_key(Value::Int(1), "b").is_err());
    }

    #[test]
    fn strip_vars_removes_reserved_keys_recursively() {
        let mut inner = IndexMap::new();
        inner.insert("__globals__".to_string(), Value::Map(IndexMap::new()));
        inner.insert("x".to_string(), Value::Int(1));
        let mut outer = IndexMap::new();
        outer.insert("nested".to_string(), Value::Map(inner));
        let stripped = strip_vars(Value::Map(outer));
        if let Value::Map(m) = &stripped {
            if let Value::Map(nested) = &m["nested"] {
                assert!(!nested.contains_key("__globals__"));
                assert_eq!(nested.get("x"), Some(&Value::Int(1)));
                return;
            }
        }
        panic!("expected nested map");
    }
}
