//! The single call path: ordinary calls, `new`, `bind` thunks, and
//! `eval` (`spec.md` §4.F/§4.H "Call mechanism", §4.L "eval").

use super::run_frame;
use crate::context::Interpreter;
use crate::exception::{EngineResult, ErrorKind, SourceSpan};
use crate::function::{Body, FunctionData};
use crate::heap::HeapId;
use crate::intern::Key;
use crate::object::{DescFlags, ObjectData, Prop};
use crate::value::Value;

/// Materializes a function literal (`Op::Function(index)`), capturing
/// `env` as its closure.
pub fn materialize_function(ctx: &mut Interpreter, env: HeapId, index: u32) -> Value {
    let code = ctx.functions[index as usize].clone();
    let name = code.name.unwrap_or(Key::NONE);
    let proto = Some(ctx.function_prototype);
    let id = ctx.heap_mut().alloc_function(FunctionData::new_script(proto, name, code, Some(env)));
    Value::Function(id)
}

/// Invokes `callee` with `this` and `args`, recursing into the callee's
/// own `run_frame` for script bodies, checking the recursion budget the
/// way `spec.md` §4.H's call mechanism requires (`context.depth + 1` vs
/// `maximumCallDepth`).
pub fn invoke(ctx: &mut Interpreter, callee: Value, this: Value, args: &[Value], span: SourceSpan) -> EngineResult<Value> {
    let Value::Function(id) = callee else {
        return Err(ctx.throw(ErrorKind::TypeError, "value is not a function", span));
    };
    if ctx.call_depth >= ctx.config.max_call_depth {
        return Err(ctx.throw(ErrorKind::RangeError, "maximum call stack size exceeded", span));
    }
    ctx.call_depth += 1;
    let result = invoke_function(ctx, id, this, args, span);
    ctx.call_depth -= 1;
    ctx.maybe_collect();
    result
}

enum Callable {
    Script { code: std::rc::Rc<crate::op::OpList>, captured_env: Option<HeapId> },
    Host(crate::function::HostFn),
    Bound { target: Value, bound_this: Value, bound_args: Vec<Value> },
}

fn invoke_function(ctx: &mut Interpreter, id: HeapId, this: Value, args: &[Value], span: SourceSpan) -> EngineResult<Value> {
    let callable = match &ctx.heap_ref().function(id).body {
        Body::Script { code, captured_env } => Callable::Script { code: code.clone(), captured_env: *captured_env },
        Body::Host(f) => Callable::Host(f.clone()),
        Body::Bound(thunk) => {
            Callable::Bound { target: thunk.target.clone(), bound_this: thunk.bound_this.clone(), bound_args: thunk.bound_args.clone() }
        }
    };
    match callable {
        Callable::Host(f) => f(ctx, this, args),
        Callable::Bound { target, bound_this, bound_args } => {
            let mut full_args = bound_args;
            full_args.extend_from_slice(args);
            invoke(ctx, target, bound_this, &full_args, span)
        }
        Callable::Script { code, captured_env } => {
            let params = code.params.clone();
            let (heap, interns) = ctx.heap_and_interns_mut();
            let env = crate::args::bind_environment(heap, interns, captured_env, this.clone(), &params, args);
            let object_prototype = Some(ctx.object_prototype);
            let (heap, interns) = ctx.heap_and_interns_mut();
            let args_obj = crate::args::build_arguments(
                heap,
                interns,
                object_prototype,
                env,
                &params,
                Value::Function(id),
                args,
            );
            let arguments_key = ctx.interns_ref().well_known.arguments;
            ctx.heap_mut().object_mut(env).put_own_named(
                arguments_key,
                Prop::data(Value::Object(args_obj), DescFlags::data_default()),
            );
            let var_names = code.var_names.clone();
            crate::args::hoist_locals(ctx.heap_mut().object_mut(env), &var_names);
            run_frame(ctx, code, env, this)
        }
    }
}

/// `new callee(args)`: per `spec.md` §4.H, a function's own `prototype`
/// property is created lazily the first time it is used as a
/// constructor, since most functions in a typical program never are.
pub fn construct(ctx: &mut Interpreter, callee: Value, args: &[Value], span: SourceSpan) -> EngineResult<Value> {
    let Value::Function(id) = callee.clone() else {
        return Err(ctx.throw(ErrorKind::TypeError, "value is not a constructor", span));
    };
    let proto_key = ctx.interns_ref().well_known.prototype;
    let existing = ctx.heap_ref().object(id).get_own_named(proto_key).map(|p| p.value.clone());
    let proto_id = match existing.and_then(|v| v.heap_id()) {
        Some(p) => p,
        None => {
            let object_prototype = ctx.object_prototype;
            let new_proto = ctx.heap_mut().alloc_object(ObjectData::with_class(Some(object_prototype), "Object"));
            let ctor_key = ctx.interns_ref().well_known.constructor;
            ctx.heap_mut().object_mut(new_proto).put_own_named(
                ctor_key,
                Prop::data(callee.clone(), DescFlags::hidden_data()),
            );
            ctx.heap_mut().object_mut(id).put_own_named(
                proto_key,
                Prop::data(Value::Object(new_proto), DescFlags::hidden_data()),
            );
            new_proto
        }
    };
    let instance = ctx.heap_mut().alloc_object(ObjectData::with_class(Some(proto_id), "Object"));
    let this = Value::Object(instance);
    let result = invoke(ctx, callee, this.clone(), args, span)?;
    Ok(if result.is_object() { result } else { this })
}

/// `eval(source)`. Called directly as the identifier `eval`, the source
/// runs with the caller's own scope injected as its environment
/// (`spec.md` §4.L); called any other way (`(0, eval)(...)`, `f = eval;
/// f(...)`), it runs with no access to the caller's locals, same as an
/// ordinary function call against the global scope.
pub fn eval(ctx: &mut Interpreter, caller_env: HeapId, this: Value, source: &Value, direct: bool, span: SourceSpan) -> EngineResult<Value> {
    if !source.is_string() {
        return Ok(source.clone());
    }
    let text = String::from_utf8_lossy(source.string_bytes(ctx.heap_ref())).into_owned();
    let (heap, interns) = ctx.heap_and_interns();
    let parsed = crate::parser::parse_program(&text, heap, interns, "eval");
    let program = match parsed {
        Ok(p) => p,
        Err(e) => return Err(ctx.throw(ErrorKind::SyntaxError, &e.message, span)),
    };
    let saved = std::mem::replace(&mut ctx.functions, program.functions);
    let (env, eval_this) = if direct { (caller_env, this) } else { (ctx.global, Value::Object(ctx.global)) };
    let result = run_frame(ctx, program.top_level, env, eval_this);
    ctx.functions = saved;
    result
}
