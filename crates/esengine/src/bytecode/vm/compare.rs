//! Equality, relational ordering, `instanceof`, and `in`
//! (`spec.md` §4.B "Ordering", §4.E).

use crate::context::Interpreter;
use crate::exception::{EngineResult, ErrorKind, SourceSpan};
use crate::object::{lookup_named, PropKey};
use crate::op::BinOp;
use crate::value::{self, Value};
use std::cmp::Ordering;

pub fn apply_compare(ctx: &mut Interpreter, op: BinOp, a: &Value, b: &Value, span: SourceSpan) -> EngineResult<Value> {
    Ok(match op {
        BinOp::Equal => Value::Boolean(value::loose_equals(ctx, a, b, span)?),
        BinOp::NotEqual => Value::Boolean(!value::loose_equals(ctx, a, b, span)?),
        BinOp::StrictEqual => Value::Boolean(value::strict_equals(ctx.heap_ref(), a, b)),
        BinOp::StrictNotEqual => Value::Boolean(!value::strict_equals(ctx.heap_ref(), a, b)),
        BinOp::Less => Value::Boolean(matches!(value::compare(ctx, a, b, span)?, Some(Ordering::Less))),
        BinOp::LessOrEqual => {
            Value::Boolean(matches!(value::compare(ctx, a, b, span)?, Some(Ordering::Less | Ordering::Equal)))
        }
        BinOp::More => Value::Boolean(matches!(value::compare(ctx, a, b, span)?, Some(Ordering::Greater))),
        BinOp::MoreOrEqual => {
            Value::Boolean(matches!(value::compare(ctx, a, b, span)?, Some(Ordering::Greater | Ordering::Equal)))
        }
        BinOp::InstanceOf => instance_of(ctx, a, b, span)?,
        BinOp::In => in_operator(ctx, a, b, span)?,
        other => unreachable!("apply_compare called with non-comparison op {other:?}"),
    })
}

fn instance_of(ctx: &mut Interpreter, value: &Value, constructor: &Value, span: SourceSpan) -> EngineResult<Value> {
    let Value::Function(ctor_id) = constructor else {
        return Err(ctx.throw(ErrorKind::TypeError, "right-hand side of instanceof is not callable", span));
    };
    let proto_key = ctx.interns_ref().well_known.prototype;
    let target_proto = ctx.heap_ref().object(*ctor_id).get_own_named(proto_key).map(|p| p.value.clone());
    let Some(target_proto) = target_proto.and_then(|v| v.heap_id()) else {
        return Ok(Value::Boolean(false));
    };
    let Some(mut current) = value.heap_id().and_then(|id| ctx.heap_ref().object(id).prototype) else {
        return Ok(Value::Boolean(false));
    };
    loop {
        if current == target_proto {
            return Ok(Value::Boolean(true));
        }
        match ctx.heap_ref().object(current).prototype {
            Some(next) => current = next,
            None => return Ok(Value::Boolean(false)),
        }
    }
}

fn in_operator(ctx: &mut Interpreter, key: &Value, object: &Value, span: SourceSpan) -> EngineResult<Value> {
    let Some(id) = object.heap_id() else {
        return Err(ctx.throw(ErrorKind::TypeError, "'in' requires an object right-hand side", span));
    };
    let s = value::to_string_value(ctx, key, span)?;
    let text = String::from_utf8_lossy(s.string_bytes(ctx.heap_ref())).into_owned();
    let found = match PropKey::classify(&text, |t| ctx.interns_mut().make(t)) {
        PropKey::Index(i) => ctx.heap_ref().object(id).get_element(i).is_some(),
        PropKey::Named(k) => lookup_named(ctx.heap_ref(), id, k).is_some(),
    };
    Ok(Value::Boolean(found))
}
