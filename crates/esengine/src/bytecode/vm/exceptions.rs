//! The handler stack and `try`/`catch`/`finally` unwind (`spec.md` §4.H
//! "breaker"/long-jump-buffer-stack model, §7).
//!
//! `original_source` threads a thrown value out through `setjmp`/`longjmp`
//! to the nearest protected frame. Here a `throw` (or a `return` that must
//! still run enclosing `finally` blocks first) calls [`unwind`], which walks
//! [`Vm::handlers`] from the innermost outward: a live `catch` takes the
//! value and resumes at its target; otherwise a `finally` is entered with
//! the outcome parked on [`Vm::pending_finally`] for `Op::EndFinally` to
//! resume once the `finally` body completes normally. A `finally` body that
//! itself throws or returns simply runs that new outcome through ordinary
//! dispatch, discarding whatever was parked — exactly the override
//! `spec.md` §8's scenario 2 requires (`finally { return 'c' }` wins over
//! the `catch` block's own `return`).

use super::Vm;
use crate::context::Interpreter;
use crate::intern::Key;
use crate::object::{DescFlags, Prop};
use crate::value::Value;

/// One outstanding `try` region: `Op::Try`'s three targets, the state to
/// restore before entering either handler, and whether this handler's
/// `catch` has already fired (ECMAScript's `catch` applies once per
/// protected region; a throw from inside the `catch` body itself skips
/// straight to `finally`).
pub struct Handler {
    pub catch_target: u32,
    pub catch_name: Option<Key>,
    pub finally_target: u32,
    pub saved_env: crate::heap::HeapId,
    pub stack_depth: usize,
    pub used_catch: bool,
}

/// The non-local control-flow value being threaded through a `finally`.
#[derive(Clone, Debug)]
pub enum Pending {
    Throw(Value),
    Return(Value),
}

pub enum UnwindResult {
    /// Resume dispatch at this op index; the handler stack and `Vm` state
    /// have already been adjusted.
    Jump(u32),
    /// No handler remains; the dispatcher must surface `pending` as the
    /// function's own outcome.
    Exhausted(Pending),
}

/// Walks `vm.handlers` outward from the top, looking for a `catch` (only
/// for [`Pending::Throw`], and only once per handler) or a `finally`.
pub fn unwind(ctx: &mut Interpreter, vm: &mut Vm, pending: Pending) -> UnwindResult {
    loop {
        let Some(handler) = vm.handlers.last_mut() else {
            return UnwindResult::Exhausted(pending);
        };
        vm.stack.truncate(handler.stack_depth);
        vm.env = handler.saved_env;

        if let Pending::Throw(value) = &pending {
            if !handler.used_catch && handler.catch_target != u32::MAX {
                let target = handler.catch_target;
                let catch_name = handler.catch_name;
                handler.used_catch = true;
                let value = value.clone();
                if let Some(name) = catch_name {
                    if let Some(id) = value.heap_id() {
                        ctx.heap_mut().retain(id);
                    }
                    let env = vm.env;
                    ctx.heap_mut().object_mut(env).put_own_named(name, Prop::data(value, DescFlags::data_default()));
                }
                return UnwindResult::Jump(target);
            }
        }

        if handler.finally_target != u32::MAX {
            let target = handler.finally_target;
            vm.handlers.pop();
            vm.pending_finally.push(pending);
            return UnwindResult::Jump(target);
        }

        vm.handlers.pop();
    }
}
