//! `regexp.rs`'s matcher exercised through `RegExp.prototype.exec`/`test`
//! (`spec.md` §4.K, §8's `lastIndex` monotonicity property).

use esengine::{Config, Interpreter, SourceSpan, Value};

fn eval(src: &str) -> String {
    let mut interpreter = Interpreter::new(Config::default());
    let value = interpreter.eval_input(src, "regexp").unwrap_or_else(|d| panic!("{src}\n{d}"));
    render(&mut interpreter, &value)
}

fn render(ctx: &mut Interpreter, value: &Value) -> String {
    let rendered = esengine::value::to_string_value(ctx, value, SourceSpan::default()).expect("toString should not throw");
    String::from_utf8_lossy(rendered.string_bytes(ctx.heap_ref())).into_owned()
}

#[test]
fn exec_returns_null_on_no_match() {
    assert_eq!(eval("/xyz/.exec('abc');"), "null");
}

#[test]
fn exec_exposes_capture_groups_and_match_index() {
    assert_eq!(eval("/a(b+)c/.exec('xxabbbc')[0];"), "abbbc");
    assert_eq!(eval("/a(b+)c/.exec('xxabbbc')[1];"), "bbb");
    assert_eq!(eval("/a(b+)c/.exec('xxabbbc').index;"), "2");
}

#[test]
fn unmatched_optional_group_is_undefined() {
    assert_eq!(eval("/a(x)?b/.exec('ab')[1];"), "undefined");
}

#[test]
fn global_flag_advances_last_index_monotonically_across_calls() {
    assert_eq!(
        eval(
            "var r = /a/g; var hits = []; \
             while (true) { var m = r.exec('aXaXa'); if (m === null) { break; } hits.push(r.lastIndex); } \
             hits.join(',');"
        ),
        "1,3,5"
    );
}

#[test]
fn non_global_exec_never_advances_last_index() {
    assert_eq!(eval("var r = /a/; r.exec('aaa'); r.exec('aaa'); r.lastIndex;"), "0");
}

#[test]
fn test_method_mirrors_exec_boolean_outcome() {
    assert_eq!(eval("/\\d+/.test('room 42');"), "true");
    assert_eq!(eval("/\\d+/.test('no digits here');"), "false");
}

#[test]
fn character_class_alternation_and_anchors() {
    assert_eq!(eval("/^[a-c]+$/.test('abcabc');"), "true");
    assert_eq!(eval("/^[a-c]+$/.test('abcd');"), "false");
}
