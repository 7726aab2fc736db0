//! Error kinds and the non-local unwind contract (`spec.md` §7).
//!
//! `original_source` threads a thrown value out through `setjmp`/`longjmp`
//! to the nearest `try` frame. `spec.md` §9 gives the idiomatic-Rust
//! translation directly: every op-dispatch function returns a `Flow`
//! outcome (`Value | Break | Continue | Return | Throw`) instead of
//! unwinding the native stack, and combinators short-circuit on anything
//! that isn't a plain `Value`. [`Flow`] lives in `bytecode/vm/mod.rs`
//! since it is the dispatcher's own control type; this module owns the
//! payload that travels with a `Flow::Throw` plus everything needed to
//! build one.

use crate::heap::Heap;
use crate::intern::Interns;
use crate::value::Value;
use std::fmt;

/// The engine-visible error kinds (`spec.md` §7), following the ancestor
/// codebase's plain-enum-with-hand-written-`Display` convention for
/// script-facing error taxonomies (`strum::Display`/`EnumString`) rather
/// than `thiserror`, since these names must match ECMAScript's own
/// `error.name` strings exactly, not a Rust-idiomatic rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum ErrorKind {
    Error,
    RangeError,
    ReferenceError,
    SyntaxError,
    TypeError,
    URIError,
}

/// A host-level failure that never reaches script code: bad configuration,
/// an `eval_input` call with no protected frame, or an internal invariant
/// violation that the embedder should treat as a bug report rather than a
/// script exception. Matches `spec.md` §7 "Fatal conditions" for the subset
/// that's recoverable enough to report instead of aborting the process
/// outright (true fatals — OOM, stack-smashing on the jump-buffer analogue
/// — use `unreachable!`/`panic!`, since `spec.md` says they are never
/// recoverable from script).
#[derive(Debug, Clone)]
pub struct HostError(pub String);

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Top-level result of trying to run an input (`spec.md` §6 "Context &
/// top-level"). A script `throw` that reaches the top level is reported as
/// [`EngineError::Thrown`]; anything else (I/O, bad UTF-8 handed to the
/// embedder API, recursion budget configured to zero) is
/// [`EngineError::Host`].
#[derive(Debug)]
pub enum EngineError {
    Thrown(Value),
    Host(HostError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<HostError> for EngineError {
    fn from(e: HostError) -> Self {
        EngineError::Host(e)
    }
}

/// The source location an error (or any op) is attached to for backtrace
/// rendering (`spec.md` §4.L "Backtrace").
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceSpan {
    pub start: u32,
    pub end: u32,
}

impl SourceSpan {
    pub fn new(start: u32, end: u32) -> Self {
        SourceSpan { start, end }
    }
}

/// The contract coercions and built-ins need from whatever is running
/// them: a place to allocate/construct error objects, and a way to invoke
/// a `Value` as a function (needed by `toPrimitive`'s `toString`/`valueOf`
/// fallback). Implemented by `crate::context::Interpreter` so that
/// `value.rs`'s coercion code never has to depend on the dispatcher
/// directly — it only needs *some* way to run `toString`, not the
/// dispatcher's internals.
pub trait Realm {
    fn heap(&mut self) -> &mut Heap;
    fn interns(&mut self) -> &mut Interns;
    fn heap_and_interns(&mut self) -> (&mut Heap, &mut Interns);

    /// Builds and returns (as a `Value::Error`, wrapped in the `Thrown`
    /// error) a new error object of `kind` with message text `message`,
    /// attached to `span` for backtrace rendering.
    fn throw(&mut self, kind: ErrorKind, message: &str, span: SourceSpan) -> EngineError;

    /// Invokes `callee` with the given `this` and arguments, as ordinary
    /// function application — used by `toPrimitive` to call `toString`/
    /// `valueOf`, and by built-ins that need to call back into script
    /// functions (`Array.prototype.sort`'s comparator, for instance).
    fn call(&mut self, callee: &Value, this: Value, args: &[Value]) -> EngineResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display_matches_ecmascript_names() {
        assert_eq!(ErrorKind::TypeError.to_string(), "TypeError");
        assert_eq!(ErrorKind::Error.to_string(), "Error");
    }
}
