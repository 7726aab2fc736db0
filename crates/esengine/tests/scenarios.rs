//! The end-to-end "inputs → expected outputs" table from `spec.md` §8 —
//! whole-program behavior no single module's inline unit tests can exercise
//! alone.

use esengine::{Config, Interpreter, SourceSpan, Value};

fn eval(src: &str) -> String {
    let mut interpreter = Interpreter::new(Config::default());
    let value = interpreter.eval_input(src, "scenario").unwrap_or_else(|d| panic!("{src}\n{d}"));
    render(&mut interpreter, &value)
}

fn render(ctx: &mut Interpreter, value: &Value) -> String {
    let rendered = esengine::value::to_string_value(ctx, value, SourceSpan::default()).expect("toString should not throw");
    String::from_utf8_lossy(rendered.string_bytes(ctx.heap_ref())).into_owned()
}

// === 1. Array#concat joins through toString the same way `+` does ===

#[test]
fn array_concat_renders_comma_joined() {
    assert_eq!(eval("var a = [1,2,3]; a.concat([4,5]);"), "1,2,3,4,5");
}

// === 2. finally's own return overrides the catch block's return ===

#[test]
fn finally_return_overrides_catch_return() {
    assert_eq!(eval("(function(){ try { throw 'a' } catch(b){ return b + 'b' } finally { return 'c' } })();"), "c");
}

// === 3. object-literal accessors share one backing field through `this` ===

#[test]
fn object_literal_getter_setter_share_backing_field() {
    assert_eq!(eval("var o = { _x: 0, get x(){ return this._x }, set x(v){ this._x = v } }; o.x = 5; o.x + o._x;"), "10");
}

#[test]
fn object_literal_get_is_still_a_plain_key_without_parens() {
    // `get`/`set` are ordinary identifiers outside the accessor shape.
    assert_eq!(eval("var o = { get: 1, set: 2 }; o.get + o.set;"), "3");
}

// === 4. recursion through ordinary function calls ===

#[test]
fn recursive_fibonacci() {
    assert_eq!(eval("function f(n){ return n < 2 ? n : f(n-1) + f(n-2) } f(10);"), "55");
}

// === 5. string indexing/length counts code points, not bytes ===

#[test]
fn multibyte_aware_string_slice() {
    assert_eq!(eval("'abせd'.slice(1,2);"), "b");
}

#[test]
fn multibyte_aware_string_length() {
    assert_eq!(eval("'abせd'.length;"), "4");
}

// === 6. regexp exec returns a match array with the match start as `index` ===

#[test]
fn regexp_exec_capture_group_and_index() {
    assert_eq!(eval("var m = /a(b+)c/.exec('xxabbbc'); m[0] + '|' + m[1] + '|' + m.index;"), "abbbc|bbb|2");
}
