//! Object/array literal construction and `for-in` key enumeration
//! (`spec.md` §4.E/§4.H "ForInEnter"/"ForInNext").

use crate::context::Interpreter;
use crate::intern::Key;
use crate::object::{DescFlags, ObjectData, Prop};
use crate::op::PropEntryKind;
use crate::value::Value;
use std::collections::HashSet;

fn retain_if_heap(ctx: &mut Interpreter, value: &Value) {
    if let Some(id) = value.heap_id() {
        ctx.heap_mut().retain(id);
    }
}

/// `Op::Object(kinds)`: pairs are `(key, value)` in source order, already
/// popped off the operand stack by the dispatcher (`parser.rs`'s
/// `object_literal` emits the value expr then a `Key` literal per entry).
/// `kinds[i]` tags pair `i`; a `Getter`/`Setter` entry is merged into
/// whatever accessor property already exists under that key rather than
/// overwriting it, so `{ get x(){}, set x(v){} }` ends up as one property
/// carrying both halves instead of the setter clobbering the getter.
pub fn build_object(ctx: &mut Interpreter, pairs: Vec<(Value, Value)>, kinds: &[PropEntryKind]) -> Value {
    let proto = Some(ctx.object_prototype);
    let id = ctx.heap_mut().alloc_object(ObjectData::new(proto));
    for ((key, value), kind) in pairs.into_iter().zip(kinds) {
        let Value::Key(k) = key else { continue };
        retain_if_heap(ctx, &value);
        match kind {
            PropEntryKind::Data => {
                ctx.heap_mut().object_mut(id).put_own_named(k, Prop::data(value, DescFlags::data_default()));
            }
            PropEntryKind::Getter | PropEntryKind::Setter => {
                let existing = ctx.heap_mut().object_mut(id).get_own_named(k).cloned();
                let (mut get, mut set) = match &existing {
                    Some(prop) if prop.flags.is_accessor() => (prop.getter().cloned(), prop.setter().cloned()),
                    _ => (None, None),
                };
                if *kind == PropEntryKind::Getter {
                    get = Some(value);
                } else {
                    set = Some(value);
                }
                let mut flags = DescFlags::accessor_default();
                if get.is_some() {
                    flags = flags.with(DescFlags::GETTER);
                }
                if set.is_some() {
                    flags = flags.with(DescFlags::SETTER);
                }
                ctx.heap_mut().object_mut(id).put_own_named(k, Prop::accessor(get, set, flags));
            }
        }
    }
    Value::Object(id)
}

/// `Op::Array(count)`: elements are in source order, with a synced
/// `length` own property.
pub fn build_array(ctx: &mut Interpreter, elements: Vec<Value>) -> Value {
    let proto = Some(ctx.array_prototype);
    let mut data = ObjectData::with_class(proto, "Array");
    let length_key = ctx.interns_ref().well_known.length;
    data.resize_elements(elements.len() as u32);
    for (i, v) in elements.into_iter().enumerate() {
        if let Some(id) = v.heap_id() {
            ctx.heap_mut().retain(id);
        }
        data.put_element(i as u32, v);
    }
    let len = data.elements.len() as i32;
    data.put_own_named(length_key, Prop::data(Value::Integer(len), DescFlags::hidden_data()));
    let id = ctx.heap_mut().alloc_object(data);
    Value::Object(id)
}

/// Collects every own-enumerable key reachable from `object`'s prototype
/// chain, de-duplicated so a shadowed inherited name is visited once:
/// dense elements (as their decimal string form) first, then named
/// properties, at each level outward — ES3 `for-in` order.
pub fn enumerate_keys(ctx: &mut Interpreter, object: &Value) -> Vec<Key> {
    let Some(start) = object.heap_id() else { return Vec::new() };
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut current = Some(start);
    while let Some(id) = current {
        let elem_count = ctx.heap_ref().object(id).elements.len() as u32;
        for i in 0..elem_count {
            if ctx.heap_ref().object(id).get_element(i).is_some() {
                let k = ctx.interns_mut().make(&i.to_string());
                if seen.insert(k) {
                    out.push(k);
                }
            }
        }
        for key in ctx.heap_ref().object(id).own_enumerable_named_keys() {
            if seen.insert(key) {
                out.push(key);
            }
        }
        current = ctx.heap_ref().object(id).prototype;
    }
    out
}
