//! Arithmetic, bitwise, and unary operators (`spec.md` §4.B/§4.H).
//!
//! Delegates coercions to `value.rs`; this module only owns the dispatch
//! from [`crate::op::BinOp`]/[`crate::op::UnOp`] to the right coercion and
//! the bitwise/shift operators `value.rs` doesn't itself define (those
//! need `ToInt32`/`ToUint32`, not the general numeric-binop machinery).

use crate::context::Interpreter;
use crate::exception::{EngineResult, SourceSpan};
use crate::op::{BinOp, UnOp};
use crate::value::{self, make_number, Value};

pub fn apply_binary(ctx: &mut Interpreter, op: BinOp, a: &Value, b: &Value, span: SourceSpan) -> EngineResult<Value> {
    Ok(match op {
        BinOp::Add => value::add(ctx, a, b, span)?,
        BinOp::Sub => value::subtract(ctx, a, b, span)?,
        BinOp::Mul => value::multiply(ctx, a, b, span)?,
        BinOp::Div => value::divide(ctx, a, b, span)?,
        BinOp::Mod => value::modulo(ctx, a, b, span)?,
        BinOp::BitAnd => make_number(f64::from(value::to_int32(ctx, a, span)? & value::to_int32(ctx, b, span)?)),
        BinOp::BitOr => make_number(f64::from(value::to_int32(ctx, a, span)? | value::to_int32(ctx, b, span)?)),
        BinOp::BitXor => make_number(f64::from(value::to_int32(ctx, a, span)? ^ value::to_int32(ctx, b, span)?)),
        BinOp::ShiftLeft => {
            let left = value::to_int32(ctx, a, span)?;
            let shift = value::to_uint32(ctx, b, span)? & 0x1F;
            make_number(f64::from(left.wrapping_shl(shift)))
        }
        BinOp::ShiftRight => {
            let left = value::to_int32(ctx, a, span)?;
            let shift = value::to_uint32(ctx, b, span)? & 0x1F;
            make_number(f64::from(left.wrapping_shr(shift)))
        }
        BinOp::ShiftRightUnsigned => {
            let left = value::to_uint32(ctx, a, span)?;
            let shift = value::to_uint32(ctx, b, span)? & 0x1F;
            make_number(f64::from(left.wrapping_shr(shift)))
        }
        // Equality/ordering/`in`/`instanceof` are handled by `compare.rs`;
        // `apply_binary` is never called with those variants (the
        // dispatcher routes them directly).
        BinOp::Less | BinOp::LessOrEqual | BinOp::More | BinOp::MoreOrEqual | BinOp::Equal | BinOp::NotEqual
        | BinOp::StrictEqual | BinOp::StrictNotEqual | BinOp::InstanceOf | BinOp::In => {
            super::compare::apply_compare(ctx, op, a, b, span)?
        }
    })
}

pub fn apply_unary(ctx: &mut Interpreter, op: UnOp, v: &Value, span: SourceSpan) -> EngineResult<Value> {
    Ok(match op {
        UnOp::Negate => make_number(-value::to_number(ctx, v, span)?),
        UnOp::Plus => make_number(value::to_number(ctx, v, span)?),
        UnOp::Not => Value::Boolean(!v.is_true(ctx.heap_ref())),
        UnOp::BitNot => make_number(f64::from(!value::to_int32(ctx, v, span)?)),
        UnOp::TypeOf => Value::string(ctx.heap_mut(), typeof_str(v)),
        UnOp::Void => Value::Undefined,
    })
}

pub fn typeof_str(v: &Value) -> &'static str {
    match v {
        Value::Undefined => "undefined",
        Value::Null => "object",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) | Value::Float(_) => "number",
        Value::Short(..) | Value::Chars(_) => "string",
        Value::Function(_) => "function",
        Value::Key(_) | Value::Reference(_) => unreachable!("internal-only Value observed by typeof"),
        _ => "object",
    }
}
