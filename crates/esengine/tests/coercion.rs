//! `spec.md` §4.B abstract-operation coercions and §8's quantified
//! `toString`/`toBinary` round-trip property, exercised end to end through
//! script rather than by calling `value::to_number`/`to_string_value`
//! directly — the operators (`+`, `-`, `==`) are what actually drive
//! coercion in a real program.

use esengine::{Config, Interpreter, SourceSpan, Value};

fn eval(src: &str) -> String {
    let mut interpreter = Interpreter::new(Config::default());
    let value = interpreter.eval_input(src, "coercion").unwrap_or_else(|d| panic!("{src}\n{d}"));
    render(&mut interpreter, &value)
}

fn render(ctx: &mut Interpreter, value: &Value) -> String {
    let rendered = esengine::value::to_string_value(ctx, value, SourceSpan::default()).expect("toString should not throw");
    String::from_utf8_lossy(rendered.string_bytes(ctx.heap_ref())).into_owned()
}

#[test]
fn plus_prefers_string_concatenation_once_either_side_is_a_string() {
    assert_eq!(eval("1 + '2';"), "12");
    assert_eq!(eval("'2' + 1;"), "21");
}

#[test]
fn minus_coerces_both_sides_to_number() {
    assert_eq!(eval("'5' - 2;"), "3");
    assert_eq!(eval("'5' - '2';"), "3");
}

#[test]
fn to_primitive_prefers_valueof_over_tostring_for_number_hint() {
    assert_eq!(eval("var o = { valueOf: function(){ return 7; }, toString: function(){ return 'nope'; } }; o * 1;"), "7");
}

#[test]
fn to_primitive_prefers_tostring_over_valueof_for_string_hint() {
    assert_eq!(eval("var o = { valueOf: function(){ return 7; }, toString: function(){ return 'yep'; } }; '' + o;"), "yep");
}

#[test]
fn array_default_tostring_joins_elements_with_commas() {
    assert_eq!(eval("[1, 2, 3] + '';"), "1,2,3");
}

#[test]
fn plain_object_default_tostring_is_object_tag() {
    assert_eq!(eval("({}) + '';"), "[object Object]");
}

#[test]
fn null_and_undefined_stringify_distinctly() {
    assert_eq!(eval("String(null);"), "null");
    assert_eq!(eval("String(undefined);"), "undefined");
}

#[test]
fn boolean_to_number_is_zero_or_one() {
    assert_eq!(eval("true + true;"), "2");
    assert_eq!(eval("false + 1;"), "1");
}

#[test]
fn loose_equality_coerces_string_and_number() {
    assert_eq!(eval("'5' == 5;"), "true");
    assert_eq!(eval("null == undefined;"), "true");
    assert_eq!(eval("null === undefined;"), "false");
}

#[test]
fn number_tostring_round_trips_through_tobinary() {
    // spec.md §8: toString(toBinary(toString(v))) == toString(toBinary(v))
    // for finite numbers with no more than 17 significant digits.
    for n in ["0", "1", "-1", "3.5", "1000000", "0.125"] {
        assert_eq!(eval(&format!("({n}).toString();")), eval(&format!("Number('{n}').toString();")));
    }
}
