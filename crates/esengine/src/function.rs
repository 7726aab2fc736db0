//! Function objects: a compiled body plus captured environment, or a
//! host-language routine, uniformly callable (`spec.md` §3 "Function",
//! §4.F).

use crate::context::Interpreter;
use crate::exception::EngineResult;
use crate::heap::HeapId;
use crate::intern::Key;
use crate::object::ObjectData;
use crate::op::OpList;
use crate::value::Value;
use std::rc::Rc;

/// A call made through `bind`: prepends `bound_args` to whatever the
/// caller supplies and always invokes with `bound_this`
/// (`spec.md` §4.F "`bind` builds a new Function whose body is a thunk").
pub struct BoundThunk {
    pub target: Value,
    pub bound_this: Value,
    pub bound_args: Vec<Value>,
}

/// Host routines take the concrete [`Interpreter`] rather than `&mut dyn
/// Realm`: every built-in (`builtins.rs`) needs interpreter-only state
/// (prototype ids, the compiled-function table for `eval`) that the
/// `Realm` trait deliberately doesn't expose to `value.rs`'s
/// coercion/equality machinery. `Realm` stays the abstraction boundary for
/// that generic code; native functions are always interpreter-specific.
pub type HostFn = Rc<dyn Fn(&mut Interpreter, Value, &[Value]) -> EngineResult<Value>>;

pub enum Body {
    /// A user-defined function: its compiled ops and the environment it
    /// closes over (`None` for a function created with no enclosing
    /// scope, i.e. the top-level program's implicit functions).
    Script { code: Rc<OpList>, captured_env: Option<HeapId> },
    Host(HostFn),
    Bound(Box<BoundThunk>),
}

/// The struct backing every `Value::Function` heap reference. Embeds an
/// [`ObjectData`] so a Function is, structurally, also an Object (it has
/// a `prototype` property, can carry extra own properties, participates
/// in GC marking the same way) — mirrors `spec.md` §3's "A Function wraps
/// an OpList and a template environment object" sitting inside the same
/// object-shaped allocation as everything else.
pub struct FunctionData {
    pub object: ObjectData,
    pub name: Key,
    pub param_count: u32,
    pub body: Body,
}

impl FunctionData {
    pub fn new_script(prototype: Option<HeapId>, name: Key, code: Rc<OpList>, captured_env: Option<HeapId>) -> Self {
        let param_count = code.params.len() as u32;
        FunctionData {
            object: ObjectData::with_class(prototype, "Function"),
            name,
            param_count,
            body: Body::Script { code, captured_env },
        }
    }

    pub fn new_host(prototype: Option<HeapId>, name: Key, param_count: u32, f: HostFn) -> Self {
        FunctionData { object: ObjectData::with_class(prototype, "Function"), name, param_count, body: Body::Host(f) }
    }

    pub fn new_bound(prototype: Option<HeapId>, name: Key, thunk: BoundThunk) -> Self {
        FunctionData {
            object: ObjectData::with_class(prototype, "Function"),
            name,
            param_count: 0,
            body: Body::Bound(Box::new(thunk)),
        }
    }

    /// Every `HeapId` this function keeps alive beyond what its embedded
    /// `ObjectData` already reports: the closed-over environment (Script)
    /// or the bound target/this (Bound).
    pub fn children(&self) -> Vec<HeapId> {
        let mut out = self.object.children();
        match &self.body {
            Body::Script { captured_env: Some(env), .. } => out.push(*env),
            Body::Script { .. } | Body::Host(_) => {}
            Body::Bound(thunk) => {
                if let Some(id) = thunk.target.heap_id() {
                    out.push(id);
                }
                if let Some(id) = thunk.bound_this.heap_id() {
                    out.push(id);
                }
                for a in &thunk.bound_args {
                    if let Some(id) = a.heap_id() {
                        out.push(id);
                    }
                }
            }
        }
        out
    }
}
