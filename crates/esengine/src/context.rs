//! The interpreter singleton: heap, intern table, prototype registry, and
//! the `evalInput` entry point (`spec.md` §4.L "Context & top-level").
//!
//! `spec.md` describes one process-wide context holding "a stack of
//! long-jump buffers ... the global function ... the last result value,
//! the source text of the most recently raised error". The long-jump stack
//! has no counterpart here (`bytecode/vm/exceptions.rs`'s `Handler` stack
//! lives on the per-frame `Vm` instead, per `op.rs`'s module doc on
//! `Flow`); everything else — globals, prototypes, the last top-level
//! result, the most recently raised error's span — is a plain field on
//! [`Interpreter`], one per embedder-visible instance rather than a
//! process singleton, matching `SPEC_FULL.md` §5.A's per-interpreter
//! intern-table decision.

use crate::exception::{EngineError, EngineResult, ErrorKind, HostError, Realm, SourceSpan};
use crate::function::HostFn;
use crate::heap::{Heap, HeapId};
use crate::intern::Interns;
use crate::object::{DescFlags, ObjectData, Prop};
use crate::op::OpList;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// Embedder-supplied globals `spec.md` §6 asks for: `alert`/`print` as
/// host routines (so all script-visible I/O stays inside `esengine-cli`,
/// never inside this library) and the trailing CLI `argv` as the
/// script-visible `arguments` array.
#[derive(Default, Clone)]
pub struct Capabilities {
    pub alert: Option<HostFn>,
    pub print: Option<HostFn>,
    pub arguments: Vec<String>,
}

/// Embedder configuration (`SPEC_FULL.md` §3.3): no environment variables,
/// no config files, just an explicit struct passed to [`Interpreter::new`].
#[derive(Clone)]
pub struct Config {
    /// `spec.md` §4.F "Call mechanism"'s recursion budget.
    pub max_call_depth: u32,
    /// Default strictness for top-level input parsed with no other
    /// indication (a `"use strict"` prologue always wins; see `parser.rs`).
    pub strict: bool,
    /// Allocations permitted between automatic mark-and-sweep passes
    /// (`spec.md` §5 "GC may run only when explicitly requested").
    pub gc_threshold: usize,
    pub capabilities: Capabilities,
}

impl Default for Config {
    fn default() -> Self {
        Config { max_call_depth: 1024, strict: false, gc_threshold: 4096, capabilities: Capabilities::default() }
    }
}

/// A rendered, host-facing report of an uncaught error (`spec.md` §4.L
/// "Backtrace", §6 "Diagnostic output format").
#[derive(Debug)]
pub struct Diagnostic {
    pub kind: String,
    pub message: String,
    span: SourceSpan,
    source: Rc<str>,
}

impl Diagnostic {
    /// `type text: message` followed by the offending source line and a
    /// `^~~~` marker under the faulting span.
    pub fn render(&self) -> String {
        let (line, col_start, col_end) = source_line(&self.source, self.span);
        let width = col_end.saturating_sub(col_start).max(1);
        let marker: String = std::iter::once('^').chain(std::iter::repeat('~').take(width - 1)).collect();
        let pad = " ".repeat(col_start);
        format!("{}: {}\n{line}\n{pad}{marker}\n", self.kind, self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

fn source_line(source: &str, span: SourceSpan) -> (&str, usize, usize) {
    let len = source.len();
    let start = (span.start as usize).min(len);
    let end = (span.end as usize).max(start + 1).min(len.max(start + 1));
    let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[start.min(len)..].find('\n').map(|i| start + i).unwrap_or(len);
    let line = &source[line_start..line_end.max(line_start)];
    let col_start = start - line_start;
    let col_end = end.min(line_end).saturating_sub(line_start).max(col_start);
    (line, col_start, col_end)
}

fn error_kind_index(kind: ErrorKind) -> usize {
    match kind {
        ErrorKind::Error => 0,
        ErrorKind::RangeError => 1,
        ErrorKind::ReferenceError => 2,
        ErrorKind::SyntaxError => 3,
        ErrorKind::TypeError => 4,
        ErrorKind::URIError => 5,
    }
}

/// The interpreter singleton (`spec.md` §4.L). One per embedder-visible
/// instance; two may run concurrently on separate threads provided they
/// share no [`Value`] (`spec.md` §5).
pub struct Interpreter {
    heap: Heap,
    interns: Interns,
    pub(crate) global: HeapId,
    pub(crate) object_prototype: HeapId,
    pub(crate) array_prototype: HeapId,
    pub(crate) function_prototype: HeapId,
    pub(crate) string_prototype: HeapId,
    pub(crate) number_prototype: HeapId,
    pub(crate) boolean_prototype: HeapId,
    pub(crate) regexp_prototype: HeapId,
    error_prototypes: [HeapId; 6],
    /// The function table of the program currently running: populated by
    /// `eval_input`/`bytecode::vm::call::eval` before `run_frame` walks the
    /// corresponding `OpList`, indexed by `Op::Function`'s operand.
    pub(crate) functions: Vec<Rc<OpList>>,
    pub(crate) call_depth: u32,
    pub(crate) config: Config,
    /// The value of the most recently completed top-level (or nested)
    /// expression statement (`spec.md` §4.L "the last result value").
    pub(crate) last_result: Value,
    /// The span of the most recently constructed error, consulted by
    /// [`Interpreter::eval_input`] when building a [`Diagnostic`]
    /// (`spec.md` §4.L "the source text of the most recently raised
    /// error").
    pub(crate) last_error_span: SourceSpan,
    allocated_since_gc: usize,
}

impl Interpreter {
    pub fn new(config: Config) -> Self {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let object_prototype = heap.alloc_object(ObjectData::new(None));
        let function_prototype = heap.alloc_object(ObjectData::with_class(Some(object_prototype), "Function"));
        let array_prototype = heap.alloc_object(ObjectData::with_class(Some(object_prototype), "Array"));
        let string_prototype = heap.alloc_object(ObjectData::with_class(Some(object_prototype), "String"));
        let number_prototype = heap.alloc_object(ObjectData::with_class(Some(object_prototype), "Number"));
        let boolean_prototype = heap.alloc_object(ObjectData::with_class(Some(object_prototype), "Boolean"));
        let regexp_prototype = heap.alloc_object(ObjectData::with_class(Some(object_prototype), "RegExp"));
        let error_prototypes = std::array::from_fn(|_| heap.alloc_object(ObjectData::with_class(Some(object_prototype), "Error")));
        let global = heap.alloc_object(ObjectData::with_class(Some(object_prototype), "global"));
        let _ = &mut interns;

        let mut ctx = Interpreter {
            heap,
            interns,
            global,
            object_prototype,
            array_prototype,
            function_prototype,
            string_prototype,
            number_prototype,
            boolean_prototype,
            regexp_prototype,
            error_prototypes,
            functions: Vec::new(),
            call_depth: 0,
            config,
            last_result: Value::Undefined,
            last_error_span: SourceSpan::default(),
            allocated_since_gc: 0,
        };
        crate::builtins::install(&mut ctx);
        ctx
    }

    pub fn heap_ref(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn interns_ref(&self) -> &Interns {
        &self.interns
    }

    pub(crate) fn heap_and_interns_mut(&mut self) -> (&mut Heap, &Interns) {
        (&mut self.heap, &self.interns)
    }

    pub fn interns_mut(&mut self) -> &mut Interns {
        &mut self.interns
    }

    pub fn heap_and_interns(&mut self) -> (&mut Heap, &mut Interns) {
        (&mut self.heap, &mut self.interns)
    }

    pub fn global(&self) -> HeapId {
        self.global
    }

    pub(crate) fn error_prototype(&self, kind: ErrorKind) -> HeapId {
        self.error_prototypes[error_kind_index(kind)]
    }

    /// Allocates a real `Error`-shaped object (`name`/`message` own
    /// properties, prototyped off the matching `ErrorKind`'s prototype) and
    /// wraps it as a [`EngineError::Thrown`] — every op that can fail calls
    /// this rather than building an ad hoc string, so `catch` always sees a
    /// genuine object and `name: message` stringification (`spec.md` §7)
    /// falls out of ordinary property lookup.
    pub fn throw(&mut self, kind: ErrorKind, message: &str, span: SourceSpan) -> EngineError {
        self.last_error_span = span;
        let proto = self.error_prototype(kind);
        let mut data = ObjectData::with_class(Some(proto), "Error");
        let name = Value::string(&mut self.heap, &kind.to_string());
        let message_value = Value::string(&mut self.heap, message);
        data.put_own_named(self.interns.well_known.name, Prop::data(name, DescFlags::hidden_data()));
        data.put_own_named(self.interns.well_known.message, Prop::data(message_value, DescFlags::hidden_data()));
        let id = self.heap.alloc_object(data);
        EngineError::Thrown(Value::Error(id))
    }

    /// Runs the full mark-and-sweep pass rooted at `global` once enough has
    /// been allocated since the last pass, and only between calls
    /// (`call_depth == 0`) — `spec.md` §5 "GC may run only when explicitly
    /// requested (by the top-level...)". Per-expression scoped collection
    /// (`Op::AutoreleaseExpression`) is a documented no-op instead; see
    /// `DESIGN.md`.
    pub(crate) fn maybe_collect(&mut self) {
        if self.call_depth != 0 {
            return;
        }
        self.allocated_since_gc += 1;
        if self.allocated_since_gc < self.config.gc_threshold {
            return;
        }
        self.allocated_since_gc = 0;
        self.collect();
    }

    /// Forces a full collection regardless of the threshold — the
    /// host-callable `garbageCollect` (`spec.md` §6 "request garbage
    /// collection").
    pub fn collect(&mut self) {
        self.heap.unmark_all();
        self.heap.mark(self.global);
        self.heap.mark(self.object_prototype);
        self.heap.mark(self.function_prototype);
        self.heap.mark(self.array_prototype);
        self.heap.mark(self.string_prototype);
        self.heap.mark(self.number_prototype);
        self.heap.mark(self.boolean_prototype);
        self.heap.mark(self.regexp_prototype);
        for proto in self.error_prototypes {
            self.heap.mark(proto);
        }
        for code in &self.functions {
            let _ = code;
        }
        self.heap.collect_unmarked();
    }

    /// Registers a named global as a plain `Value`, or as a native
    /// function when `param_count` is supplied through
    /// [`Interpreter::register_native`] — the host-callable surface
    /// `spec.md` §6 names ("register a named global as a Value or a
    /// native function").
    pub fn register_global(&mut self, name: &str, value: Value) {
        let key = self.interns.make(name);
        if let Some(id) = value.heap_id() {
            self.heap.retain(id);
        }
        self.heap.object_mut(self.global).put_own_named(key, Prop::data(value, DescFlags::hidden_data()));
    }

    pub fn register_native(&mut self, name: &str, param_count: u32, f: HostFn) {
        let key = self.interns.make(name);
        let proto = Some(self.function_prototype);
        let id = self.heap.alloc_function(crate::function::FunctionData::new_host(proto, key, param_count, f));
        self.register_global(name, Value::Function(id));
    }

    /// Parses and runs `source` as a top-level program (`spec.md` §4.L
    /// "evalInput"): installs its function table, runs it against the
    /// global object as both environment and `this`, and converts any
    /// uncaught error into a [`Diagnostic`] carrying the offending source
    /// line.
    pub fn eval_input(&mut self, source: &str, source_name: &str) -> Result<Value, Diagnostic> {
        let (heap, interns) = self.heap_and_interns();
        let parsed = crate::parser::parse_program(source, heap, interns, source_name);
        let program = match parsed {
            Ok(p) => p,
            Err(e) => {
                self.last_error_span = e.span;
                let thrown = self.throw_plain(ErrorKind::SyntaxError, &e.message);
                return Err(self.to_diagnostic(EngineError::Thrown(thrown), source));
            }
        };
        self.functions = program.functions;
        self.last_result = Value::Undefined;
        let outcome = crate::bytecode::vm::run_frame(self, program.top_level, self.global, Value::Object(self.global));
        self.maybe_collect();
        match outcome {
            Ok(_) => Ok(std::mem::replace(&mut self.last_result, Value::Undefined)),
            Err(e) => Err(self.to_diagnostic(e, source)),
        }
    }

    /// Builds an error `Value` without touching `last_error_span` (used
    /// only for a parse failure, whose span is already known precisely).
    fn throw_plain(&mut self, kind: ErrorKind, message: &str) -> Value {
        let proto = self.error_prototype(kind);
        let mut data = ObjectData::with_class(Some(proto), "Error");
        let name = Value::string(&mut self.heap, &kind.to_string());
        let message_value = Value::string(&mut self.heap, message);
        data.put_own_named(self.interns.well_known.name, Prop::data(name, DescFlags::hidden_data()));
        data.put_own_named(self.interns.well_known.message, Prop::data(message_value, DescFlags::hidden_data()));
        let id = self.heap.alloc_object(data);
        Value::Error(id)
    }

    fn to_diagnostic(&mut self, error: EngineError, source: &str) -> Diagnostic {
        let span = self.last_error_span;
        let (kind, message) = match error {
            EngineError::Host(HostError(msg)) => ("Error".to_string(), msg),
            EngineError::Thrown(value) => {
                let kind = match &value {
                    Value::Error(id) => self
                        .heap
                        .object(*id)
                        .get_own_named(self.interns.well_known.name)
                        .map(|p| String::from_utf8_lossy(p.value.string_bytes(&self.heap)).into_owned())
                        .unwrap_or_else(|| "Error".to_string()),
                    _ => "Error".to_string(),
                };
                let message = match &value {
                    Value::Error(id) => self
                        .heap
                        .object(*id)
                        .get_own_named(self.interns.well_known.message)
                        .map(|p| String::from_utf8_lossy(p.value.string_bytes(&self.heap)).into_owned())
                        .unwrap_or_default(),
                    other => {
                        let span = self.last_error_span;
                        crate::value::to_string_value(self, other, span)
                            .map(|v| String::from_utf8_lossy(v.string_bytes(&self.heap)).into_owned())
                            .unwrap_or_else(|_| "<unprintable thrown value>".to_string())
                    }
                };
                (kind, message)
            }
        };
        Diagnostic { kind, message, span, source: Rc::from(source) }
    }
}

impl Realm for Interpreter {
    fn heap(&mut self) -> &mut Heap {
        &mut self.heap
    }

    fn interns(&mut self) -> &mut Interns {
        &mut self.interns
    }

    fn heap_and_interns(&mut self) -> (&mut Heap, &mut Interns) {
        (&mut self.heap, &mut self.interns)
    }

    fn throw(&mut self, kind: ErrorKind, message: &str, span: SourceSpan) -> EngineError {
        self.throw(kind, message, span)
    }

    fn call(&mut self, callee: &Value, this: Value, args: &[Value]) -> EngineResult<Value> {
        crate::bytecode::vm::call::invoke(self, callee.clone(), this, args, self.last_error_span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_input_returns_last_expression_value() {
        let mut ctx = Interpreter::new(Config::default());
        let result = ctx.eval_input("1 + 2;", "test").unwrap();
        assert!(matches!(result, Value::Integer(3)));
    }

    #[test]
    fn uncaught_reference_error_becomes_a_diagnostic() {
        let mut ctx = Interpreter::new(Config::default());
        let err = ctx.eval_input("undeclaredName;", "test").unwrap_err();
        assert_eq!(err.kind, "ReferenceError");
        assert!(err.render().contains("undeclaredName"));
    }

    #[test]
    fn gc_is_idempotent_after_eval() {
        let mut ctx = Interpreter::new(Config::default());
        ctx.eval_input("var a = {x: 1};", "test").unwrap();
        ctx.collect();
        ctx.collect();
    }
}
