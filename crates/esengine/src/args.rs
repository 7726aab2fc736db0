//! Parameter binding and the synthetic `arguments` object
//! (`spec.md` §3 "arguments", §4.F, §9 "Argument vector aliasing
//! parameter slots").
//!
//! Environments are plain property-bag objects (see `op.rs`'s module doc
//! for why the slot-array fast path isn't implemented), so binding a call
//! is just: populate named properties on the new environment object for
//! `caller`/`this`/each parameter, then optionally attach an `arguments`
//! value whose indexed reads/writes are redirected to those same named
//! properties by `bytecode/vm/attr.rs` — giving true aliasing without a
//! slot array.

use crate::heap::{Heap, HeapId};
use crate::intern::{Interns, Key};
use crate::object::{DescFlags, Internal, ObjectData, Prop};
use crate::value::Value;

/// Creates a fresh environment object for a call, binds `this` and each
/// parameter (extra arguments beyond `params.len()` are dropped from the
/// named bindings — they remain visible only through `arguments`; missing
/// ones are bound to `undefined`), and returns its `HeapId`.
///
/// `caller_env` becomes the environment's prototype, giving the
/// dispatcher's name lookups a single chain to walk outward through
/// enclosing scopes to globals (`spec.md` §4.H "parent-scope slot
/// access", redesigned here as ordinary prototype-chain lookup).
pub fn bind_environment(
    heap: &mut Heap,
    interns: &Interns,
    caller_env: Option<HeapId>,
    this: Value,
    params: &[Key],
    args: &[Value],
) -> HeapId {
    let mut env = ObjectData::with_class(caller_env, "Environment");
    env.put_own_named(interns.well_known.this, Prop::data(this, DescFlags::empty()));
    for (i, &name) in params.iter().enumerate() {
        let value = args.get(i).cloned().unwrap_or(Value::Undefined);
        retain_if_heap(heap, &value);
        env.put_own_named(name, Prop::data(value, DescFlags::data_default()));
    }
    heap.alloc_object(env)
}

/// Declares `var`/function-hoisted names in `env` as `undefined` if not
/// already bound (parameters and earlier function hoisting win).
pub fn hoist_locals(env: &mut ObjectData, var_names: &[Key]) {
    for &name in var_names {
        if env.get_own_named(name).is_none() {
            env.put_own_named(name, Prop::data(Value::Undefined, DescFlags::data_default()));
        }
    }
}

/// Builds the `arguments` object for a call: an `Arguments`-internal
/// object whose elements are a snapshot used only for `arguments.length`
/// bookkeeping and iteration; actual element reads/writes are
/// intercepted by `bytecode/vm/attr.rs` before they'd ever touch
/// `elements` directly, per the aliasing contract above.
pub fn build_arguments(
    heap: &mut Heap,
    interns: &Interns,
    object_prototype: Option<HeapId>,
    env: HeapId,
    params: &[Key],
    callee: Value,
    args: &[Value],
) -> HeapId {
    let param_keys: Box<[Key]> = params.iter().copied().collect();
    let mut data = ObjectData::with_class(object_prototype, "Object");
    data.internal = Internal::Arguments { env, param_keys };
    data.resize_elements(args.len() as u32);
    for (i, a) in args.iter().enumerate() {
        data.put_element(i as u32, a.clone());
    }
    data.put_own_named(
        interns.well_known.length,
        Prop::data(Value::Integer(args.len() as i32), DescFlags::hidden_data()),
    );
    data.put_own_named(interns.well_known.callee, Prop::data(callee, DescFlags::hidden_data()));
    heap.alloc_object(data)
}

fn retain_if_heap(heap: &mut Heap, value: &Value) {
    if let Some(id) = value.heap_id() {
        heap.retain(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interns;

    #[test]
    fn bind_environment_fills_missing_params_with_undefined() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let a = interns.make("a");
        let b = interns.make("b");
        let env_id = bind_environment(&mut heap, &interns, None, Value::Undefined, &[a, b], &[Value::Integer(1)]);
        let env = heap.object(env_id);
        assert!(matches!(env.get_own_named(a).unwrap().value, Value::Integer(1)));
        assert!(matches!(env.get_own_named(b).unwrap().value, Value::Undefined));
    }

    #[test]
    fn build_arguments_reports_length() {
        let mut heap = Heap::new();
        let interns = Interns::new();
        let env_id = heap.alloc_object(ObjectData::new(None));
        let args_id = build_arguments(
            &mut heap,
            &interns,
            None,
            env_id,
            &[],
            Value::Undefined,
            &[Value::Integer(1), Value::Integer(2)],
        );
        let obj = heap.object(args_id);
        assert!(matches!(obj.get_own_named(interns.well_known.length).unwrap().value, Value::Integer(2)));
    }
}
