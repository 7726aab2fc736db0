//! Parse- and run-time error reporting (`spec.md` §4.L "Diagnostic output
//! format"): every case here is expected to fail, and the assertions pin
//! down `Diagnostic::kind`/`message` rather than just "it errored".

use esengine::{Config, Interpreter};

fn diagnose(src: &str) -> esengine::Diagnostic {
    let mut interpreter = Interpreter::new(Config::default());
    interpreter.eval_input(src, "parser_errors").expect_err("expected a diagnostic")
}

#[test]
fn unterminated_block_reports_a_syntax_error() {
    let d = diagnose("function f() { return 1;");
    assert_eq!(d.kind, "SyntaxError");
}

#[test]
fn missing_closing_paren_reports_a_syntax_error() {
    let d = diagnose("var x = (1 + 2;");
    assert_eq!(d.kind, "SyntaxError");
}

#[test]
fn try_without_catch_or_finally_is_rejected() {
    let d = diagnose("try { 1; }");
    assert_eq!(d.kind, "SyntaxError");
}

#[test]
fn uncaught_throw_surfaces_as_the_thrown_value() {
    let d = diagnose("throw new TypeError('boom');");
    assert_eq!(d.kind, "TypeError");
    assert!(d.message.contains("boom"), "message should carry the thrown text, got {:?}", d.message);
}

#[test]
fn reference_to_an_undeclared_name_is_a_reference_error() {
    let d = diagnose("thisNameWasNeverDeclared + 1;");
    assert_eq!(d.kind, "ReferenceError");
}

#[test]
fn calling_a_non_function_is_a_type_error() {
    let d = diagnose("var x = 1; x();");
    assert_eq!(d.kind, "TypeError");
}

#[test]
fn diagnostic_render_includes_a_caret_marker_line() {
    let d = diagnose("var x = ;");
    let rendered = d.render();
    assert!(rendered.contains('^'), "rendered diagnostic should carry a caret marker, got:\n{rendered}");
}

#[test]
fn valid_programs_do_not_error() {
    let mut interpreter = Interpreter::new(Config::default());
    assert!(interpreter.eval_input("1 + 1;", "ok").is_ok());
}
