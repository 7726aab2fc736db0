//! The CLI driver (`spec.md` §6 "External interfaces"): a thin shell
//! around [`esengine::Interpreter`] that owns every script-visible side
//! effect — `alert`/`print`/`arguments` — so the library itself stays
//! free of I/O.

use esengine::{Capabilities, Config, Interpreter};
use std::{env, fs, process::ExitCode};

const USAGE: &str = "\
usage: esengine [--test | --test-verbose | --test-quiet] <file> [args...]
       esengine --help

Runs an ECMAScript-3 source file. Trailing arguments after <file> are
exposed to the script as the `arguments` array.

  --help           print this message and exit
  --test           run the bundled smoke-test scripts and report pass/fail
  --test-verbose   like --test, printing each script's completion value
  --test-quiet     like --test, printing only a final summary line
";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("--help") => {
            print!("{USAGE}");
            ExitCode::SUCCESS
        }
        Some("--test") => run_self_tests(Verbosity::Normal),
        Some("--test-verbose") => run_self_tests(Verbosity::Verbose),
        Some("--test-quiet") => run_self_tests(Verbosity::Quiet),
        Some(path) => run_file(path, &args[1..]),
        None => {
            eprint!("{USAGE}");
            ExitCode::FAILURE
        }
    }
}

fn run_file(path: &str, script_args: &[String]) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut interpreter = Interpreter::new(Config { capabilities: cli_capabilities(script_args), ..Config::default() });
    match interpreter.eval_input(&source, path) {
        Ok(_) => ExitCode::SUCCESS,
        Err(diagnostic) => {
            eprint!("{diagnostic}");
            ExitCode::FAILURE
        }
    }
}

/// Host-visible I/O (`spec.md` §6 "alert(...) (stderr), print(...)
/// (stdout)"): the library never touches a stream directly, so every CLI
/// run wires these two natives plus the trailing argv up front.
fn cli_capabilities(script_args: &[String]) -> Capabilities {
    Capabilities {
        alert: Some(std::rc::Rc::new(|ctx, _this, args| {
            let text = args.first().map(|v| render_arg(ctx, v)).unwrap_or_default();
            eprintln!("{text}");
            Ok(esengine::Value::Undefined)
        })),
        print: Some(std::rc::Rc::new(|ctx, _this, args| {
            let text = args.first().map(|v| render_arg(ctx, v)).unwrap_or_default();
            println!("{text}");
            Ok(esengine::Value::Undefined)
        })),
        arguments: script_args.to_vec(),
    }
}

fn render_arg(ctx: &mut Interpreter, value: &esengine::Value) -> String {
    match esengine::value::to_string_value(ctx, value, esengine::SourceSpan::default()) {
        Ok(s) => String::from_utf8_lossy(s.string_bytes(ctx.heap_ref())).into_owned(),
        Err(_) => String::new(),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

/// A script paired with the completion value it's expected to produce,
/// exercised by `--test*` — a quick sanity check that the binary built
/// against a working `esengine` without requiring a file on disk.
struct Smoke {
    name: &'static str,
    source: &'static str,
    expect: &'static str,
}

const SMOKE_TESTS: &[Smoke] = &[
    Smoke { name: "arithmetic", source: "1 + 2 * 3;", expect: "7" },
    Smoke { name: "closures", source: "function adder(n) { return function(x) { return x + n; }; } adder(10)(5);", expect: "15" },
    Smoke { name: "try-catch", source: "var seen; try { throw 'boom'; } catch (e) { seen = e; } seen;", expect: "boom" },
    Smoke { name: "array-join", source: "[1, 2, 3].join('-');", expect: "1-2-3" },
    Smoke { name: "regexp-exec", source: "/(\\w+)@(\\w+)/.exec('user@host')[1];", expect: "user" },
];

fn run_self_tests(verbosity: Verbosity) -> ExitCode {
    let mut failures = 0;
    for test in SMOKE_TESTS {
        let mut interpreter = Interpreter::new(Config::default());
        let outcome = interpreter.eval_input(test.source, test.name);
        let actual = match &outcome {
            Ok(value) => render_arg(&mut interpreter, value),
            Err(diagnostic) => diagnostic.to_string(),
        };
        let passed = outcome.is_ok() && actual == test.expect;
        if !passed {
            failures += 1;
        }
        match verbosity {
            Verbosity::Quiet => {}
            Verbosity::Normal => println!("{} ... {}", test.name, if passed { "ok" } else { "FAILED" }),
            Verbosity::Verbose => println!("{} ... {} (got {actual:?}, expected {:?})", test.name, if passed { "ok" } else { "FAILED" }, test.expect),
        }
    }
    println!("{} passed, {failures} failed", SMOKE_TESTS.len() - failures);
    if failures == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
