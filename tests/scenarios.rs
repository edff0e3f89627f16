//! End-to-end coverage of the documented scenarios: one test per worked
//! example, driven through `Evaluator::process` with the full built-in
//! catalog installed, the way a real caller would use this crate.

use ison::value::{is_reserved_key, Value};
use ison::{default_registry, Evaluator};

fn parse(text: &str) -> Value {
    let j: serde_json::Value = serde_json::from_str(text).unwrap();
    Value::from_json(j)
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

fn process(doc: Value) -> (Evaluator, Value) {
    let mut ev = Evaluator::new(doc.clone(), default_registry());
    let result = ev.process(doc).unwrap();
    (ev, result)
}

#[test]
fn foreach_zips_two_named_lists_through_an_author_defined_lambda() {
    let doc = parse(
        r#"{
            "__func_globals__": {"F": "$L{%k%=%v%}"},
            "__globals__": {"K": ["a", "b"], "V": [1, 2]},
            "r": "$!foreach{$F, k=*$K, v=*$V}"
        }"#,
    );
    let (ev, result) = process(doc);
    assert!(ev.fully_processed);
    let result = strip_vars(result);
    if let Value::Map(m) = &result {
        assert_eq!(
            m.get("r"),
            Some(&Value::List(vec![Value::String("a=1".into()), Value::String("b=2".into())]))
        );
    } else {
        panic!("expected map, got {result:?}");
    }
}

#[test]
fn independently_seeded_generators_draw_identical_first_values() {
    let doc = parse(
        r#"{
            "__locals__": {"h": "$rand.new{42}"},
            "a": "$rand.int{${h}, 0, 1000000}"
        }"#,
    );
    let (ev_a, result_a) = process(doc.clone());
    let (ev_b, result_b) = process(doc);
    assert!(ev_a.fully_processed && ev_b.fully_processed);

    let a = strip_vars(result_a);
    let b = strip_vars(result_b);
    assert_eq!(a, b);
}

#[test]
fn process_is_idempotent_once_fully_processed_and_stripped() {
    let doc = parse(r#"{"__locals__": {"a": 1, "b": "${a}"}, "x": "${b}", "y": "$+{1, 2, 3}"}"#);
    let (ev1, first) = process(doc);
    assert!(ev1.fully_processed);
    let first_stripped = strip_vars(first);

    let (ev2, second) = process(first_stripped.clone());
    assert!(ev2.fully_processed);
    let second_stripped = strip_vars(second);

    assert_eq!(first_stripped, second_stripped);
}

#[test]
fn includes_merge_into_the_including_map_without_overwriting_local_keys() {
    let doc = parse(r#"{"__includes__": ["other.json"], "name": "local"}"#);
    let mut ev = Evaluator::new(doc.clone(), default_registry());
    ev.set_include_loader(|path: &str| {
        assert_eq!(path, "other.json");
        Ok(parse(r#"{"name": "included", "extra": 1}"#))
    });
    let result = strip_vars(ev.process(doc).unwrap());
    if let Value::Map(m) = &result {
        assert_eq!(m.get("name"), Some(&Value::String("local".into())));
        assert_eq!(m.get("extra"), Some(&Value::Int(1)));
    } else {
        panic!("expected map, got {result:?}");
    }
}

#[test]
fn cyclic_includes_are_rejected() {
    let doc = parse(r#"{"__includes__": ["a.json"]}"#);
    let mut ev = Evaluator::new(doc.clone(), default_registry());
    ev.set_include_loader(|path: &str| match path {
        "a.json" => Ok(parse(r#"{"__includes__": ["a.json"]}"#)),
        other => panic!("unexpected include path {other}"),
    });
    assert!(ev.process(doc).is_err());
}

#[test]
fn where_filters_a_list_through_a_predicate_lambda() {
    let doc = parse(
        r#"{
            "__func_globals__": {"positive": "$L{%0}"},
            "__globals__": {"nums": [0, 1, "", "x", [], [1]]},
            "r": "$!where{$positive, ${nums}}"
        }"#,
    );
    let (ev, result) = process(doc);
    assert!(ev.fully_processed);
    let result = strip_vars(result);
    if let Value::Map(m) = &result {
        assert_eq!(m.get("r"), Some(&Value::List(vec![Value::Int(1), Value::String("x".into()), Value::List(vec![Value::Int(1)])])));
    } else {
        panic!("expected map, got {result:?}");
    }
}
