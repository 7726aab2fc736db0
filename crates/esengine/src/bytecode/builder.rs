//! Builder for emitting ops during parsing.
//!
//! `Builder` wraps an [`OpList`] under construction, handling forward
//! jumps that need patching once their target is known and tracking the
//! source span of each emitted op for backtrace rendering.
//!
//! # Usage
//!
//! ```ignore
//! let mut b = Builder::new(source_name);
//! b.emit(Op::This, span);
//! let j = b.emit_jump_if_false(span);
//! // ... emit more ops ...
//! b.patch_jump(j);
//! let code = b.build();
//! ```

use crate::exception::SourceSpan;
use crate::op::{Op, OpList};
use std::rc::Rc;

/// A forward-jump placeholder returned by `emit_jump*`; pass it to
/// [`Builder::patch_jump`] once the target position is known.
#[derive(Clone, Copy)]
pub struct JumpHandle(usize);

pub struct Builder {
    list: OpList,
}

impl Builder {
    pub fn new(source_name: Rc<str>) -> Self {
        Builder { list: OpList::new(source_name) }
    }

    pub fn position(&self) -> u32 {
        self.list.ops.len() as u32
    }

    /// Removes and returns the most recently emitted op and its span.
    /// Used by the parser to convert an already-emitted *read* (e.g.
    /// `Op::GetProperty`) into the corresponding *write* once it turns
    /// out to be an assignment target.
    pub fn pop_last(&mut self) -> Option<(Op, SourceSpan)> {
        let op = self.list.ops.pop()?;
        let span = self.list.spans.pop().unwrap_or_default();
        Some((op, span))
    }

    pub fn ops_mut(&mut self) -> &mut Vec<Op> {
        &mut self.list.ops
    }

    pub fn emit(&mut self, op: Op, span: SourceSpan) -> u32 {
        let pos = self.list.ops.len() as u32;
        self.list.ops.push(op);
        self.list.spans.push(span);
        pos
    }

    pub fn emit_jump(&mut self, span: SourceSpan) -> JumpHandle {
        JumpHandle(self.emit(Op::Jump(u32::MAX), span) as usize)
    }

    pub fn emit_jump_if_false(&mut self, span: SourceSpan) -> JumpHandle {
        JumpHandle(self.emit(Op::JumpIfFalse(u32::MAX), span) as usize)
    }

    pub fn emit_jump_if_true(&mut self, span: SourceSpan) -> JumpHandle {
        JumpHandle(self.emit(Op::JumpIfTrue(u32::MAX), span) as usize)
    }

    pub fn emit_logical_jump(&mut self, want_true: bool, span: SourceSpan) -> JumpHandle {
        JumpHandle(self.emit(Op::LogicalJump { want_true, target: u32::MAX }, span) as usize)
    }

    pub fn emit_for_in_next(&mut self, span: SourceSpan) -> JumpHandle {
        JumpHandle(self.emit(Op::ForInNext { exit: u32::MAX }, span) as usize)
    }

    /// Patches a previously emitted jump to target the current position.
    pub fn patch_jump(&mut self, handle: JumpHandle) {
        self.patch_jump_to(handle, self.position());
    }

    pub fn patch_jump_to(&mut self, handle: JumpHandle, target: u32) {
        match &mut self.list.ops[handle.0] {
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfTrue(t) => *t = target,
            Op::LogicalJump { target: t, .. } => *t = target,
            Op::ForInNext { exit: t } => *t = target,
            other => unreachable!("patch_jump called on a non-jump op: {other:?}"),
        }
    }

    pub fn set_params(&mut self, params: Vec<crate::intern::Key>) {
        self.list.params = params;
    }

    pub fn add_var_name(&mut self, name: crate::intern::Key) {
        if !self.list.var_names.contains(&name) {
            self.list.var_names.push(name);
        }
    }

    pub fn add_function_name(&mut self, name: crate::intern::Key) {
        if !self.list.function_names.contains(&name) {
            self.list.function_names.push(name);
        }
    }

    pub fn set_name(&mut self, name: Option<crate::intern::Key>) {
        self.list.name = name;
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.list.is_strict = strict;
    }

    pub fn build(self) -> OpList {
        self.list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn patches_forward_jump_to_current_position() {
        let mut b = Builder::new(Rc::from("test"));
        let j = b.emit_jump_if_false(SourceSpan::default());
        b.emit(Op::Value(Value::Undefined), SourceSpan::default());
        b.patch_jump(j);
        let code = b.build();
        assert!(matches!(code.ops[0], Op::JumpIfFalse(1)));
    }
}
