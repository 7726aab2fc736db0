//! Name resolution and property access that may invoke script code
//! (getters/setters, the `arguments`/parameter-slot aliasing) — the
//! dynamic counterpart to `object.rs`'s purely structural storage
//! (`spec.md` §4.E/§4.G).

use super::call::invoke;
use super::Vm;
use crate::context::Interpreter;
use crate::exception::{EngineResult, ErrorKind, SourceSpan};
use crate::heap::HeapId;
use crate::intern::Key;
use crate::object::{lookup_named, DescFlags, Internal, Prop, PropKey};
use crate::value::Value;

fn scope_chain_root(ctx: &Interpreter, mut id: HeapId) -> HeapId {
    while let Some(parent) = ctx.heap_ref().object(id).prototype {
        id = parent;
    }
    id
}

fn retain_if_heap(ctx: &mut Interpreter, value: &Value) {
    if let Some(id) = value.heap_id() {
        ctx.heap_mut().retain(id);
    }
}

/// Resolves an identifier, consulting any active `with` objects before the
/// ordinary scope chain (`spec.md` §4.H "with: refObject consulted first").
pub fn get_local(ctx: &mut Interpreter, vm: &Vm, key: Key, span: SourceSpan) -> EngineResult<Value> {
    for &with_obj in vm.with_stack.iter().rev() {
        if let Some((owner, _)) = lookup_named(ctx.heap_ref(), with_obj, key) {
            return read_named(ctx, owner, key, with_obj, span);
        }
    }
    if let Some((owner, _)) = lookup_named(ctx.heap_ref(), vm.env, key) {
        return read_named(ctx, owner, key, vm.env, span);
    }
    let name = ctx.interns_ref().str_of(key).to_string();
    Err(ctx.throw(ErrorKind::ReferenceError, &format!("{name} is not defined"), span))
}

/// Reads through an explicit environment id rather than a full `Vm`, used
/// by `get_member`/`set_member` to redirect `arguments[i]` into the call's
/// own parameter binding without constructing a throwaway frame.
pub fn get_local_in(ctx: &mut Interpreter, env: HeapId, key: Key, span: SourceSpan) -> EngineResult<Value> {
    if let Some((owner, _)) = lookup_named(ctx.heap_ref(), env, key) {
        return read_named(ctx, owner, key, env, span);
    }
    Ok(Value::Undefined)
}

pub fn set_local_in(ctx: &mut Interpreter, env: HeapId, key: Key, value: Value, span: SourceSpan) -> EngineResult<()> {
    if let Some((owner, _)) = lookup_named(ctx.heap_ref(), env, key) {
        return write_named(ctx, owner, key, value, span);
    }
    retain_if_heap(ctx, &value);
    ctx.heap_mut().object_mut(env).put_own_named(key, Prop::data(value, DescFlags::data_default()));
    Ok(())
}

pub fn set_local(ctx: &mut Interpreter, vm: &Vm, key: Key, value: Value, span: SourceSpan) -> EngineResult<()> {
    for &with_obj in vm.with_stack.iter().rev() {
        if lookup_named(ctx.heap_ref(), with_obj, key).is_some() {
            return write_named(ctx, with_obj, key, value, span);
        }
    }
    if let Some((owner, _)) = lookup_named(ctx.heap_ref(), vm.env, key) {
        return write_named(ctx, owner, key, value, span);
    }
    // Undeclared assignment creates an implicit global (ES3 sloppy mode).
    let root = scope_chain_root(ctx, vm.env);
    retain_if_heap(ctx, &value);
    ctx.heap_mut().object_mut(root).put_own_named(key, Prop::data(value, DescFlags::data_default()));
    Ok(())
}

pub fn delete_local(ctx: &mut Interpreter, vm: &Vm, key: Key) -> Value {
    if let Some((owner, _)) = lookup_named(ctx.heap_ref(), vm.env, key) {
        return Value::Boolean(ctx.heap_mut().object_mut(owner).delete_own_named(key).unwrap_or(false));
    }
    Value::Boolean(true)
}

/// Reads a property already located at `owner`, invoking its getter (with
/// `this` bound to `receiver`) if it is an accessor.
fn read_named(ctx: &mut Interpreter, owner: HeapId, key: Key, receiver: HeapId, span: SourceSpan) -> EngineResult<Value> {
    let prop = ctx.heap_ref().object(owner).get_own_named(key).cloned();
    let Some(prop) = prop else { return Ok(Value::Undefined) };
    if prop.flags.is_accessor() {
        return match prop.getter() {
            Some(getter) => invoke(ctx, getter.clone(), Value::Object(receiver), &[], span),
            None => Ok(Value::Undefined),
        };
    }
    Ok(prop.value)
}

fn write_named(ctx: &mut Interpreter, owner: HeapId, key: Key, value: Value, span: SourceSpan) -> EngineResult<()> {
    let existing = ctx.heap_ref().object(owner).get_own_named(key).cloned();
    if let Some(prop) = &existing {
        if prop.flags.is_accessor() {
            if let Some(setter) = prop.setter() {
                invoke(ctx, setter.clone(), Value::Object(owner), &[value], span)?;
            }
            return Ok(());
        }
    }
    retain_if_heap(ctx, &value);
    ctx.heap_mut().object_mut(owner).put_own_named(key, Prop::data(value, DescFlags::data_default()));
    Ok(())
}

fn prototype_for(ctx: &Interpreter, object: &Value) -> Option<HeapId> {
    if object.is_string() {
        return Some(ctx.string_prototype);
    }
    if object.is_number() {
        return Some(ctx.number_prototype);
    }
    if object.is_boolean() {
        return Some(ctx.boolean_prototype);
    }
    object.heap_id()
}

/// `object.key` / `Op::GetProperty`.
pub fn get_property(ctx: &mut Interpreter, object: &Value, key: Key, span: SourceSpan) -> EngineResult<Value> {
    if matches!(object, Value::Undefined | Value::Null) {
        return Err(ctx.throw(ErrorKind::TypeError, "cannot read property of undefined or null", span));
    }
    if object.is_string() && key == ctx.interns_ref().well_known.length {
        let n = crate::text::Text::new(object.string_bytes(ctx.heap_ref())).to_str_lossy().chars().count();
        return Ok(Value::Integer(n as i32));
    }
    let Some(start) = prototype_for(ctx, object) else {
        return Ok(Value::Undefined);
    };
    let Some((owner, _)) = lookup_named(ctx.heap_ref(), start, key) else {
        return Ok(Value::Undefined);
    };
    let receiver = object.heap_id().unwrap_or(owner);
    read_named(ctx, owner, key, receiver, span)
}

pub fn set_property(ctx: &mut Interpreter, object: &Value, key: Key, value: Value, span: SourceSpan) -> EngineResult<Value> {
    let Some(id) = object.heap_id() else {
        return Ok(value);
    };
    write_named(ctx, id, key, value.clone(), span)?;
    Ok(value)
}

pub fn delete_property(ctx: &mut Interpreter, object: &Value, key: Key) -> Value {
    let Some(id) = object.heap_id() else {
        return Value::Boolean(true);
    };
    Value::Boolean(ctx.heap_mut().object_mut(id).delete_own_named(key).unwrap_or(false))
}

fn classify(ctx: &mut Interpreter, key: &Value, span: SourceSpan) -> EngineResult<PropKey> {
    match key {
        Value::Integer(n) if *n >= 0 => Ok(PropKey::Index(*n as u32)),
        Value::Key(k) => Ok(PropKey::Named(*k)),
        _ => {
            let s = crate::value::to_string_value(ctx, key, span)?;
            let text = String::from_utf8_lossy(s.string_bytes(ctx.heap_ref())).into_owned();
            Ok(PropKey::classify(&text, |s| ctx.interns_mut().make(s)))
        }
    }
}

fn string_char_at(object: &Value, ctx: &Interpreter, index: u32) -> Value {
    let s = crate::text::Text::new(object.string_bytes(ctx.heap_ref())).to_str_lossy();
    match s.chars().nth(index as usize) {
        Some(c) => Value::short_str(&c.to_string()),
        None => Value::Undefined,
    }
}

/// `object[key]` / `Op::GetMember`, including the `arguments[i]` ⟷
/// parameter-slot alias (`object.rs`'s `Internal::Arguments`).
pub fn get_member(ctx: &mut Interpreter, object: &Value, key: &Value, span: SourceSpan) -> EngineResult<Value> {
    if matches!(object, Value::Undefined | Value::Null) {
        return Err(ctx.throw(ErrorKind::TypeError, "cannot read property of undefined or null", span));
    }
    let prop_key = classify(ctx, key, span)?;
    let PropKey::Index(index) = prop_key else {
        let PropKey::Named(k) = prop_key else { unreachable!() };
        return get_property(ctx, object, k, span);
    };
    if object.is_string() {
        return Ok(string_char_at(object, ctx, index));
    }
    let Some(id) = object.heap_id() else {
        return Ok(Value::Undefined);
    };
    if let Internal::Arguments { env, param_keys } = &ctx.heap_ref().object(id).internal {
        if let Some(&name) = param_keys.get(index as usize) {
            let env = *env;
            return get_local_in(ctx, env, name, span);
        }
    }
    if let Some(v) = ctx.heap_ref().object(id).get_element(index) {
        return Ok(v.clone());
    }
    let key_text = index.to_string();
    let key = ctx.interns_mut().make(&key_text);
    get_property(ctx, object, key, span)
}

pub fn set_member(ctx: &mut Interpreter, object: &Value, key: &Value, value: Value, span: SourceSpan) -> EngineResult<Value> {
    let prop_key = classify(ctx, key, span)?;
    let PropKey::Index(index) = prop_key else {
        let PropKey::Named(k) = prop_key else { unreachable!() };
        return set_property(ctx, object, k, value, span);
    };
    let Some(id) = object.heap_id() else {
        return Ok(value);
    };
    if let Internal::Arguments { env, param_keys } = &ctx.heap_ref().object(id).internal {
        if let Some(&name) = param_keys.get(index as usize) {
            let env = *env;
            set_local_in(ctx, env, name, value.clone(), span)?;
            return Ok(value);
        }
    }
    retain_if_heap(ctx, &value);
    ctx.heap_mut().object_mut(id).put_element(index, value.clone());
    if ctx.heap_ref().object(id).class_name == "Array" {
        let length_key = ctx.interns_ref().well_known.length;
        let current = match ctx.heap_ref().object(id).get_own_named(length_key) {
            Some(Prop { value: Value::Integer(n), .. }) => *n,
            _ => 0,
        };
        if i64::from(index) + 1 > i64::from(current) {
            ctx.heap_mut().object_mut(id).put_own_named(
                length_key,
                Prop::data(Value::Integer(index as i32 + 1), DescFlags::hidden_data()),
            );
        }
    }
    Ok(value)
}

pub fn delete_member(ctx: &mut Interpreter, object: &Value, key: &Value, span: SourceSpan) -> EngineResult<Value> {
    let prop_key = classify(ctx, key, span)?;
    let Some(id) = object.heap_id() else {
        return Ok(Value::Boolean(true));
    };
    Ok(match prop_key {
        PropKey::Named(k) => Value::Boolean(ctx.heap_mut().object_mut(id).delete_own_named(k).unwrap_or(false)),
        PropKey::Index(i) => Value::Boolean(ctx.heap_mut().object_mut(id).delete_element(i)),
    })
}
