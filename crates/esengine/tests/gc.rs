//! Mark-and-sweep collection (`spec.md` §5 "GC may run only when explicitly
//! requested", §8 "gc(); gc() has the same final heap state as gc()").

use esengine::{Config, Interpreter};

#[test]
fn forced_collection_is_idempotent() {
    let mut interpreter = Interpreter::new(Config::default());
    interpreter.eval_input("var keep = [1, 2, 3]; for (var i = 0; i < 50; i++) { var garbage = { n: i }; }", "gc").unwrap();
    interpreter.collect();
    let after_first = interpreter.heap_ref().live_counts();
    interpreter.collect();
    let after_second = interpreter.heap_ref().live_counts();
    assert_eq!(after_first, after_second);
}

#[test]
fn unreachable_objects_are_reclaimed() {
    let mut interpreter = Interpreter::new(Config::default());
    interpreter.eval_input("var garbage = []; for (var i = 0; i < 500; i++) { garbage.push({ n: i }); }", "gc").unwrap();
    let before = interpreter.heap_ref().live_counts();
    interpreter.eval_input("garbage = null;", "gc").unwrap();
    interpreter.collect();
    let after = interpreter.heap_ref().live_counts();
    assert!(after.0 < before.0, "collection should reclaim the dropped array and its elements ({before:?} -> {after:?})");
}

#[test]
fn reachable_objects_survive_collection() {
    let mut interpreter = Interpreter::new(Config::default());
    interpreter.eval_input("var kept = { marker: 'still here' };", "gc").unwrap();
    interpreter.collect();
    let value = interpreter.eval_input("kept.marker;", "gc").unwrap();
    let rendered = esengine::value::to_string_value(&mut interpreter, &value, esengine::SourceSpan::default()).unwrap();
    assert_eq!(String::from_utf8_lossy(rendered.string_bytes(interpreter.heap_ref())), "still here");
}

#[test]
fn host_callable_garbage_collect_runs_without_throwing() {
    let mut interpreter = Interpreter::new(Config::default());
    let result = interpreter.eval_input("garbageCollect(); 'ok';", "gc");
    assert!(result.is_ok(), "{:?}", result.err().map(|d| d.to_string()));
}

#[test]
fn automatic_collection_does_not_corrupt_live_state_across_the_threshold() {
    let mut interpreter = Interpreter::new(Config { gc_threshold: 8, ..Config::default() });
    let value = interpreter
        .eval_input("var total = 0; for (var i = 0; i < 200; i++) { var o = { n: i }; total += o.n; } total;", "gc")
        .unwrap_or_else(|d| panic!("{d}"));
    let rendered = esengine::value::to_string_value(&mut interpreter, &value, esengine::SourceSpan::default()).unwrap();
    assert_eq!(String::from_utf8_lossy(rendered.string_bytes(interpreter.heap_ref())), "19900");
}
