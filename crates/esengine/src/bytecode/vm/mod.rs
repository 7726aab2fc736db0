//! The op dispatcher: walks an [`crate::op::OpList`] against an explicit
//! value stack, delegating to the sibling modules by concern the way the
//! ancestor crate splits its own bytecode interpreter loop (`spec.md`
//! §4.H/§4.J).

pub mod attr;
pub mod binary;
pub mod call;
pub mod collections;
pub mod compare;
pub mod exceptions;

use crate::context::Interpreter;
use crate::exception::{EngineError, EngineResult, ErrorKind, SourceSpan};
use crate::heap::HeapId;
use crate::intern::Key;
use crate::object::{DescFlags, Internal, ObjectData, Prop};
use crate::op::{Op, OpList};
use crate::value::Value;
use exceptions::{unwind, Handler, Pending, UnwindResult};
use smallvec::SmallVec;
use std::rc::Rc;

/// Call/construct/eval argument lists are almost always small (`spec.md`
/// §4.F param tables rarely exceed a handful of names); inlining the
/// first three elements avoids a heap allocation for the common case,
/// matching the ancestor crate's own argument-buffer idiom in `value.rs`.
type ArgBuf = SmallVec<[Value; 3]>;

/// The three ways a statement or function body can complete. Unlike
/// `spec.md` §3.4's literal `Value | Break(depth) | Continue(depth) |
/// Return(Value) | Throw(Value)`, there are no `Break`/`Continue`
/// variants: `parser.rs` resolves every `break`/`continue` to a plain
/// `Jump` at parse time (see `op.rs`'s module doc), so the dispatcher
/// never needs to represent one as a runtime control-flow value.
pub enum Flow {
    Value(Value),
    Return(Value),
    Throw(Value),
}

struct ForInFrame {
    keys: Vec<Key>,
    pos: usize,
}

/// Per-call-frame dispatcher state. A fresh `Vm` is created for every
/// [`run_frame`] invocation (ordinary call, `eval`, or the top-level
/// script), so nothing here survives a return.
pub struct Vm {
    stack: Vec<Value>,
    handlers: Vec<Handler>,
    for_in_stack: Vec<ForInFrame>,
    pending_finally: Vec<Pending>,
    env: HeapId,
    this: Value,
    with_stack: Vec<HeapId>,
}

impl Vm {
    fn new(env: HeapId, this: Value) -> Vm {
        Vm { stack: Vec::new(), handlers: Vec::new(), for_in_stack: Vec::new(), pending_finally: Vec::new(), env, this, with_stack: Vec::new() }
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }
}

/// What to do after a `Return`/`Throw`/`EndFinally` has gone through
/// [`exceptions::unwind`]: either a handler redirected control to a
/// `catch`/`finally` body (`Resume`, dispatch continues at the patched
/// `pc`), or the frame itself is done (`Halt`).
enum Settled {
    Resume,
    Halt(EngineResult<Value>),
}

fn settle(ctx: &mut Interpreter, vm: &mut Vm, pending: Pending, pc: &mut u32) -> Settled {
    match unwind(ctx, vm, pending) {
        UnwindResult::Jump(target) => {
            *pc = target;
            Settled::Resume
        }
        UnwindResult::Exhausted(Pending::Throw(value)) => Settled::Halt(Err(EngineError::Thrown(value))),
        UnwindResult::Exhausted(Pending::Return(value)) => Settled::Halt(Ok(value)),
    }
}

/// Runs `code` to completion against a fresh operand stack, starting at
/// `env`/`this`. Used for every function call, `eval`'d source, and the
/// top-level script (`context.rs::eval_input`).
pub(crate) fn run_frame(ctx: &mut Interpreter, code: Rc<OpList>, env: HeapId, this: Value) -> EngineResult<Value> {
    let mut vm = Vm::new(env, this);
    let mut pc: u32 = 0;
    let mut last_value = Value::Undefined;

    loop {
        let idx = pc as usize;
        if idx >= code.ops.len() {
            return Ok(last_value);
        }
        let span = code.spans[idx];

        match &code.ops[idx] {
            Op::Value(v) => {
                vm.push(v.clone());
                pc += 1;
            }
            Op::This => {
                vm.push(vm.this.clone());
                pc += 1;
            }
            Op::Function(index) => {
                let f = call::materialize_function(ctx, vm.env, *index);
                vm.push(f);
                pc += 1;
            }
            Op::Object(kinds) => {
                let mut pairs = Vec::with_capacity(kinds.len());
                for _ in 0..kinds.len() {
                    let value = vm.pop();
                    let key = vm.pop();
                    pairs.push((key, value));
                }
                pairs.reverse();
                let obj = collections::build_object(ctx, pairs, kinds);
                vm.push(obj);
                pc += 1;
            }
            Op::Array(count) => {
                let mut elements = Vec::with_capacity(*count as usize);
                for _ in 0..*count {
                    elements.push(vm.pop());
                }
                elements.reverse();
                let arr = collections::build_array(ctx, elements);
                vm.push(arr);
                pc += 1;
            }
            Op::RegExp { source, flags } => {
                let re = build_regexp_value(ctx, source, flags, span)?;
                vm.push(re);
                pc += 1;
            }

            Op::CreateLocal(key) => {
                attr::set_local_in(ctx, vm.env, *key, Value::Undefined, span)?;
                pc += 1;
            }
            Op::GetLocal(key) => {
                let v = attr::get_local(ctx, &vm, *key, span)?;
                vm.push(v);
                pc += 1;
            }
            Op::SetLocal(key) => {
                let value = vm.pop();
                attr::set_local(ctx, &vm, *key, value.clone(), span)?;
                vm.push(value);
                pc += 1;
            }
            Op::DeleteLocal(key) => {
                let v = attr::delete_local(ctx, &vm, *key);
                vm.push(v);
                pc += 1;
            }

            Op::GetMember => {
                let key = vm.pop();
                let object = vm.pop();
                let v = attr::get_member(ctx, &object, &key, span)?;
                vm.push(v);
                pc += 1;
            }
            Op::SetMember => {
                let value = vm.pop();
                let key = vm.pop();
                let object = vm.pop();
                let v = attr::set_member(ctx, &object, &key, value, span)?;
                vm.push(v);
                pc += 1;
            }
            Op::DeleteMember => {
                let key = vm.pop();
                let object = vm.pop();
                let v = attr::delete_member(ctx, &object, &key, span)?;
                vm.push(v);
                pc += 1;
            }
            Op::GetProperty(key) => {
                let object = vm.pop();
                let v = attr::get_property(ctx, &object, *key, span)?;
                vm.push(v);
                pc += 1;
            }
            Op::SetProperty(key) => {
                let value = vm.pop();
                let object = vm.pop();
                let v = attr::set_property(ctx, &object, *key, value, span)?;
                vm.push(v);
                pc += 1;
            }
            Op::DeleteProperty(key) => {
                let object = vm.pop();
                let v = attr::delete_property(ctx, &object, *key);
                vm.push(v);
                pc += 1;
            }

            Op::Binary(op) => {
                let b = vm.pop();
                let a = vm.pop();
                let v = binary::apply_binary(ctx, *op, &a, &b, span)?;
                vm.push(v);
                pc += 1;
            }
            Op::Unary(op) => {
                let v = vm.pop();
                let r = binary::apply_unary(ctx, *op, &v, span)?;
                vm.push(r);
                pc += 1;
            }
            Op::Typeof => {
                let v = vm.pop();
                let s = binary::typeof_str(&v);
                let v = Value::string(ctx.heap_mut(), s);
                vm.push(v);
                pc += 1;
            }

            Op::Pop => {
                vm.pop();
                pc += 1;
            }
            Op::Dup => {
                let top = vm.stack.last().expect("Dup with empty stack").clone();
                vm.push(top);
                pc += 1;
            }
            Op::Dup2 => {
                let len = vm.stack.len();
                let a = vm.stack[len - 2].clone();
                let b = vm.stack[len - 1].clone();
                vm.push(a);
                vm.push(b);
                pc += 1;
            }
            Op::Jump(target) => pc = *target,
            Op::JumpIfFalse(target) => {
                let v = vm.pop();
                pc = if v.is_true(ctx.heap_ref()) { pc + 1 } else { *target };
            }
            Op::JumpIfTrue(target) => {
                let v = vm.pop();
                pc = if v.is_true(ctx.heap_ref()) { *target } else { pc + 1 };
            }
            Op::LogicalJump { want_true, target } => {
                let top = vm.stack.last().expect("LogicalJump with empty stack").clone();
                if top.is_true(ctx.heap_ref()) == *want_true {
                    pc = *target;
                } else {
                    vm.pop();
                    pc += 1;
                }
            }

            Op::ExpressionStatement => {
                last_value = vm.pop();
                ctx.last_result = last_value.clone();
                pc += 1;
            }
            Op::AutoreleaseExpression => {
                // Per-expression scoped collection (`spec.md` §4.D) is not
                // implemented; the heap is only swept between top-level
                // statements (`context.rs::eval_input`). See `DESIGN.md`.
                pc += 1;
            }
            Op::Return => {
                let value = vm.pop();
                match settle(ctx, &mut vm, Pending::Return(value), &mut pc) {
                    Settled::Resume => {}
                    Settled::Halt(r) => return r,
                }
            }
            Op::ReturnUndefined => match settle(ctx, &mut vm, Pending::Return(Value::Undefined), &mut pc) {
                Settled::Resume => {}
                Settled::Halt(r) => return r,
            },
            Op::Throw => {
                let value = vm.pop();
                ctx.last_error_span = span;
                match settle(ctx, &mut vm, Pending::Throw(value), &mut pc) {
                    Settled::Resume => {}
                    Settled::Halt(r) => return r,
                }
            }
            Op::Try { catch_target, catch_name, finally_target } => {
                vm.handlers.push(Handler {
                    catch_target: *catch_target,
                    catch_name: *catch_name,
                    finally_target: *finally_target,
                    saved_env: vm.env,
                    stack_depth: vm.stack.len(),
                    used_catch: false,
                });
                pc += 1;
            }
            Op::PopHandler => {
                vm.handlers.pop();
                pc += 1;
            }
            Op::EndFinally => {
                let pending = vm.pending_finally.pop().expect("EndFinally with no pending outcome");
                match settle(ctx, &mut vm, pending, &mut pc) {
                    Settled::Resume => {}
                    Settled::Halt(r) => return r,
                }
            }
            Op::With => {
                let object = vm.pop();
                let Some(id) = object.heap_id() else {
                    return Err(ctx.throw(ErrorKind::TypeError, "with statement requires an object", span));
                };
                vm.with_stack.push(id);
                pc += 1;
            }
            Op::PopWith => {
                vm.with_stack.pop();
                pc += 1;
            }
            Op::Debugger => {
                pc += 1;
            }

            Op::ForInEnter => {
                let object = vm.pop();
                let keys = collections::enumerate_keys(ctx, &object);
                vm.for_in_stack.push(ForInFrame { keys, pos: 0 });
                pc += 1;
            }
            Op::ForInNext { exit } => {
                let frame = vm.for_in_stack.last_mut().expect("ForInNext with no active for-in frame");
                if frame.pos < frame.keys.len() {
                    let key = frame.keys[frame.pos];
                    frame.pos += 1;
                    let text = ctx.interns_ref().str_of(key).to_string();
                    let v = Value::string(ctx.heap_mut(), &text);
                    vm.push(v);
                    pc += 1;
                } else {
                    vm.for_in_stack.pop();
                    pc = *exit;
                }
            }

            Op::Call(argc) => {
                let mut args = ArgBuf::with_capacity(*argc as usize);
                for _ in 0..*argc {
                    args.push(vm.pop());
                }
                args.reverse();
                let callee = vm.pop();
                let result = call::invoke(ctx, callee, Value::Object(ctx.global), &args, span)?;
                vm.push(result);
                pc += 1;
            }
            Op::CallMember(argc) => {
                let mut args = ArgBuf::with_capacity(*argc as usize);
                for _ in 0..*argc {
                    args.push(vm.pop());
                }
                args.reverse();
                let key = vm.pop();
                let object = vm.pop();
                let callee = attr::get_member(ctx, &object, &key, span)?;
                let result = call::invoke(ctx, callee, object, &args, span)?;
                vm.push(result);
                pc += 1;
            }
            Op::CallProperty { key, argc } => {
                let mut args = ArgBuf::with_capacity(*argc as usize);
                for _ in 0..*argc {
                    args.push(vm.pop());
                }
                args.reverse();
                let object = vm.pop();
                let callee = attr::get_property(ctx, &object, *key, span)?;
                let result = call::invoke(ctx, callee, object, &args, span)?;
                vm.push(result);
                pc += 1;
            }
            Op::Construct(argc) => {
                let mut args = ArgBuf::with_capacity(*argc as usize);
                for _ in 0..*argc {
                    args.push(vm.pop());
                }
                args.reverse();
                let callee = vm.pop();
                let result = call::construct(ctx, callee, &args, span)?;
                vm.push(result);
                pc += 1;
            }
            Op::Eval(argc) => {
                let mut args = ArgBuf::with_capacity(*argc as usize);
                for _ in 0..*argc {
                    args.push(vm.pop());
                }
                args.reverse();
                let _callee = vm.pop();
                let source = args.first().cloned().unwrap_or(Value::Undefined);
                let result = call::eval(ctx, vm.env, vm.this.clone(), &source, true, span)?;
                vm.push(result);
                pc += 1;
            }
        }
    }
}

pub(crate) fn build_regexp_value(ctx: &mut Interpreter, source: &str, flags: &str, span: SourceSpan) -> EngineResult<Value> {
    let internal = crate::regexp::RegExpInternal::compile(source, flags)
        .map_err(|e| ctx.throw(ErrorKind::SyntaxError, &e.0, span))?;
    let global = internal.global;
    let ignore_case = internal.ignore_case;
    let multiline = internal.multiline;
    let data = ObjectData::with_class(Some(ctx.regexp_prototype), "RegExp");
    let id = ctx.heap_mut().alloc_object(data);
    ctx.heap_mut().object_mut(id).internal = Internal::RegExp(internal);
    let source_value = Value::string(ctx.heap_mut(), source);
    let key = ctx.interns_ref().well_known.source;
    ctx.heap_mut().object_mut(id).put_own_named(key, Prop::data(source_value, DescFlags::hidden_data()));
    let key = ctx.interns_ref().well_known.global;
    ctx.heap_mut().object_mut(id).put_own_named(key, Prop::data(Value::Boolean(global), DescFlags::hidden_data()));
    let key = ctx.interns_ref().well_known.ignore_case;
    ctx.heap_mut().object_mut(id).put_own_named(key, Prop::data(Value::Boolean(ignore_case), DescFlags::hidden_data()));
    let key = ctx.interns_ref().well_known.multiline;
    ctx.heap_mut().object_mut(id).put_own_named(key, Prop::data(Value::Boolean(multiline), DescFlags::hidden_data()));
    let key = ctx.interns_ref().well_known.last_index;
    ctx.heap_mut().object_mut(id).put_own_named(key, Prop::data(Value::Integer(0), DescFlags::data_default()));
    Ok(Value::RegExp(id))
}
