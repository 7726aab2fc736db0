//! An ECMAScript-3 interpreter library (`spec.md` §1 OVERVIEW).
//!
//! The crate is organized the way the ancestor interpreter splits a
//! tree-walking evaluator into a lexer, a parser that emits a flat op
//! list, and a dispatcher that walks it — see each module's doc comment
//! for the piece of `spec.md` it implements. [`context::Interpreter`] is
//! the embedding surface: construct one with a [`context::Config`], feed
//! it source through [`context::Interpreter::eval_input`], and read back
//! either the completion [`value::Value`] or a rendered
//! [`context::Diagnostic`].
#![expect(clippy::too_many_arguments, reason = "call/bind plumbing needs the full argument set")]
#![expect(clippy::type_complexity, reason = "dispatcher closures carry rich but intentional signatures")]

mod args;
mod builtins;
pub mod bytecode;
pub mod chars;
pub mod context;
pub mod exception;
pub mod function;
pub mod heap;
pub mod intern;
pub mod lexer;
pub mod object;
pub mod op;
pub mod parser;
pub mod regexp;
pub mod text;
pub mod value;

pub use crate::{
    context::{Capabilities, Config, Diagnostic, Interpreter},
    exception::{EngineError, EngineResult, ErrorKind, HostError, Realm, SourceSpan},
    function::{FunctionData, HostFn},
    heap::{Heap, HeapId},
    intern::{Interns, Key},
    object::{DescFlags, ObjectData, Prop},
    value::Value,
};
