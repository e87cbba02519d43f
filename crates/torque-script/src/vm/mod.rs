//! Stack-based dispatch loop (spec.md §4.5).
//!
//! One [`ExecState`] is threaded through an entire `execute`/`evaluate` call,
//! shared by every recursive script-function invocation and exposed to
//! native callbacks. Per-call state (the operand stack, the local "register
//! file", the pending object-instantiation-descriptor stack) lives on the
//! Rust call stack instead, in `run`'s own locals, recursing once per script
//! call — mirroring the original engine's per-call `CodeBlock::execute`
//! frame discipline without a hand-rolled frame-pool allocator.

use std::rc::Rc;

use ahash::AHashMap;

use crate::bytecode::{Instruction, InstructionSequence};
use crate::error::BytecodeError;
use crate::function::{Function, ScriptFunction};
use crate::intern::{Interner, StringId};
use crate::object::{ObjectId, ObjectInstantiationDescriptor, ObjectRegistry, ResolvedField};
use crate::platform::PlatformContext;
use crate::registry::FunctionRegistry;
use crate::value::{RefTarget, Value};

/// Everything an executing or native function needs to reach outside its
/// own call frame: the string table, global scope, function/object
/// registries, and the platform's log/file sinks.
pub struct ExecState<'a> {
    pub interner: &'a mut Interner,
    pub globals: &'a mut AHashMap<StringId, Value>,
    pub functions: &'a mut FunctionRegistry,
    pub objects: &'a mut ObjectRegistry,
    pub platform: &'a mut dyn PlatformContext,
    pub max_recursion_depth: usize,
    pub call_depth: usize,
}

/// The identity of the function body currently executing, carried so a
/// `parent::` call inside it knows what to search for and where to start
/// (spec.md §4.6).
#[derive(Clone)]
struct FrameIdentity {
    package_index: usize,
    namespace: String,
    name: String,
}

/// Runs a top-level program body (no enclosing function; `parent::` calls
/// made directly in it are an error).
pub fn execute(state: &mut ExecState, functions: &[ScriptFunction], body: &InstructionSequence) -> Result<Value, BytecodeError> {
    run(state, functions, body, AHashMap::new(), None)
}

/// Binds `args` positionally to `function`'s declared parameters and runs its
/// body, honouring the recursion-depth guard (spec.md §4.5 "Recursion
/// guard"). `this` is `Some` for a bound invocation, whose first parameter
/// receives the object's integer ID (spec.md §4.6).
fn invoke(state: &mut ExecState, functions: &[ScriptFunction], owning_package: usize, function: &Function, args: &[Value], this: Option<ObjectId>) -> Value {
    if state.max_recursion_depth != 0 && state.call_depth >= state.max_recursion_depth {
        state.platform.log_error("recursion depth exceeded");
        return Value::Integer(0);
    }
    match function {
        Function::Native(native) => {
            state.call_depth += 1;
            let result = (native.callback)(this, state, args);
            state.call_depth -= 1;
            result
        }
        Function::Script(script) => {
            let mut locals = AHashMap::new();
            let mut params = script.params.iter();
            if let Some(id) = this {
                if let Some(this_param) = params.next() {
                    let pid = state.interner.intern(this_param);
                    locals.insert(pid, Value::Integer(id.as_u32() as i32));
                }
            }
            for (param, arg) in params.zip(args.iter()) {
                let pid = state.interner.intern(param);
                locals.insert(pid, arg.clone());
            }
            let identity = FrameIdentity {
                package_index: owning_package,
                namespace: script.namespace.clone(),
                name: script.name.clone(),
            };
            state.call_depth += 1;
            let result = run(state, functions, &script.body, locals, Some(identity)).unwrap_or_else(|_| Value::Integer(0));
            state.call_depth -= 1;
            result
        }
    }
}

/// The single dispatch loop. `locals` is the "register file" for this call:
/// a map keyed by interned variable name rather than a positional index (see
/// `value::RefTarget::Local`'s doc comment for why).
fn run(
    state: &mut ExecState,
    functions: &[ScriptFunction],
    body: &InstructionSequence,
    mut locals: AHashMap<StringId, Value>,
    identity: Option<FrameIdentity>,
) -> Result<Value, BytecodeError> {
    let mut stack: Vec<Value> = Vec::new();
    let mut descriptors: Vec<ObjectInstantiationDescriptor> = Vec::new();
    let mut ip: isize = 0;

    loop {
        let Some(instr) = usize::try_from(ip).ok().and_then(|i| body.get(i)) else {
            return Err(BytecodeError::InvalidJumpTarget(ip));
        };
        let mut delta: isize = 1;

        match instr {
            Instruction::PushInteger(n) => stack.push(Value::Integer(*n)),
            Instruction::PushFloat(f) => stack.push(Value::Float(*f)),
            Instruction::PushString(id) => stack.push(Value::string(state.interner.resolve(*id).to_string())),
            Instruction::PushLocalReference(id) => stack.push(Value::Ref(RefTarget::Local(*id))),
            Instruction::PushGlobalReference(id) => stack.push(Value::Ref(RefTarget::Global(*id))),

            Instruction::Pop => {
                stack.pop().ok_or(BytecodeError::StackUnderflow)?;
            }

            Instruction::Assignment => {
                let rhs = pop_value(&mut stack)?;
                let lhs = pop_value(&mut stack)?;
                let rhs_value = deref(&rhs, &locals, state);
                write_through(&lhs, rhs_value.clone(), &mut locals, state);
                stack.push(rhs_value);
            }
            Instruction::AddAssignment => {
                let rhs = pop_value(&mut stack)?;
                let lhs = pop_value(&mut stack)?;
                let current = deref(&lhs, &locals, state).to_float();
                let added = deref(&rhs, &locals, state).to_float();
                let result = Value::Float(current + added);
                write_through(&lhs, result.clone(), &mut locals, state);
                stack.push(result);
            }

            Instruction::Add => binary_float(&mut stack, &locals, state, |a, b| a + b)?,
            Instruction::Minus => binary_float(&mut stack, &locals, state, |a, b| a - b)?,
            Instruction::Multiply => binary_float(&mut stack, &locals, state, |a, b| a * b)?,
            Instruction::Divide => binary_float(&mut stack, &locals, state, |a, b| a / b)?,
            Instruction::Modulus => {
                let b = pop_num(&mut stack, &locals, state)?.to_integer();
                let a = pop_num(&mut stack, &locals, state)?.to_integer();
                stack.push(Value::Integer(if b == 0 { 0 } else { a % b }));
            }
            Instruction::LessThan => binary_cmp(&mut stack, &locals, state, |a, b| a < b)?,
            Instruction::GreaterThan => binary_cmp(&mut stack, &locals, state, |a, b| a > b)?,
            Instruction::GreaterThanOrEqual => binary_cmp(&mut stack, &locals, state, |a, b| a >= b)?,
            Instruction::Equals => binary_cmp(&mut stack, &locals, state, |a, b| a == b)?,
            Instruction::NotEquals => binary_cmp(&mut stack, &locals, state, |a, b| a != b)?,
            Instruction::StringEquals => {
                let b = pop_num(&mut stack, &locals, state)?.to_torque_string();
                let a = pop_num(&mut stack, &locals, state)?.to_torque_string();
                stack.push(Value::Integer(i32::from(a == b)));
            }
            Instruction::StringNotEquals => {
                let b = pop_num(&mut stack, &locals, state)?.to_torque_string();
                let a = pop_num(&mut stack, &locals, state)?.to_torque_string();
                stack.push(Value::Integer(i32::from(a != b)));
            }
            Instruction::LogicalAnd => {
                let b = pop_num(&mut stack, &locals, state)?.to_bool();
                let a = pop_num(&mut stack, &locals, state)?.to_bool();
                stack.push(Value::Integer(i32::from(a && b)));
            }
            Instruction::LogicalOr => {
                let b = pop_num(&mut stack, &locals, state)?.to_bool();
                let a = pop_num(&mut stack, &locals, state)?.to_bool();
                stack.push(Value::Integer(i32::from(a || b)));
            }
            Instruction::BitwiseAnd => {
                let b = pop_num(&mut stack, &locals, state)?.to_integer();
                let a = pop_num(&mut stack, &locals, state)?.to_integer();
                stack.push(Value::Integer(a & b));
            }
            Instruction::BitwiseOr => {
                let b = pop_num(&mut stack, &locals, state)?.to_integer();
                let a = pop_num(&mut stack, &locals, state)?.to_integer();
                stack.push(Value::Integer(a | b));
            }
            Instruction::Concat(sep) => {
                let b = pop_num(&mut stack, &locals, state)?.to_torque_string();
                let a = pop_num(&mut stack, &locals, state)?.to_torque_string();
                stack.push(Value::string(format!("{a}{}{b}", sep.as_str())));
            }
            Instruction::Negate => {
                let a = pop_num(&mut stack, &locals, state)?.to_float();
                stack.push(Value::Float(-a));
            }
            Instruction::Not => {
                let a = pop_num(&mut stack, &locals, state)?.to_bool();
                stack.push(Value::Integer(i32::from(!a)));
            }

            Instruction::Jump(offset) => delta = *offset,
            Instruction::JumpTrue(offset) => {
                let cond = pop_num(&mut stack, &locals, state)?.to_bool();
                delta = if cond { *offset } else { 1 };
            }
            Instruction::JumpFalse(offset) => {
                let cond = pop_num(&mut stack, &locals, state)?.to_bool();
                delta = if cond { 1 } else { *offset };
            }
            Instruction::NOP => {}

            Instruction::Return => {
                let a = pop_value(&mut stack)?;
                return Ok(deref(&a, &locals, state));
            }
            Instruction::Break | Instruction::Continue => {
                return Err(BytecodeError::InvalidJumpTarget(ip));
            }

            Instruction::RegisterFunction(idx) => {
                let script = functions.get(*idx).ok_or(BytecodeError::InvalidRegister(*idx))?;
                state.functions.register(
                    &script.package,
                    &script.namespace,
                    &script.name,
                    Rc::new(Function::Script(Rc::new(script.clone()))),
                );
            }

            Instruction::AccessArray { base, index_count, is_global } => {
                let indices = pop_n(&mut stack, usize::from(*index_count))?;
                let resolved: Vec<Value> = indices.iter().map(|v| deref(v, &locals, state)).collect();
                let base_name = state.interner.resolve(*base).to_string();
                let folded = fold_name(&base_name, &resolved);
                let id = state.interner.intern(&folded);
                stack.push(Value::Ref(if *is_global { RefTarget::Global(id) } else { RefTarget::Local(id) }));
            }

            Instruction::Subreference { name, index_count } => {
                let indices = pop_n(&mut stack, usize::from(*index_count))?;
                let resolved: Vec<Value> = indices.iter().map(|v| deref(v, &locals, state)).collect();
                let target = pop_value(&mut stack)?;
                let target_value = deref(&target, &locals, state);
                let object = ObjectId::from_raw(target_value.to_integer().max(0) as u32);
                let field_id = if resolved.is_empty() {
                    *name
                } else {
                    let base_name = state.interner.resolve(*name).to_string();
                    let folded = fold_name(&base_name, &resolved);
                    state.interner.intern(&folded)
                };
                stack.push(Value::Ref(RefTarget::Field { object, field: field_id }));
            }

            Instruction::CallFunction { namespace, name, argc } => {
                let args = pop_args(&mut stack, usize::from(*argc), &locals, state)?;
                let name_str = state.interner.resolve(*name).to_string();
                let ns_str = namespace.map(|id| state.interner.resolve(id).to_string()).unwrap_or_default();

                let resolved = if ns_str.eq_ignore_ascii_case("parent") {
                    match &identity {
                        Some(id) => state.functions.lookup_parent(id.package_index, &id.namespace, &id.name),
                        None => {
                            state.platform.log_error("parent:: called with no enclosing function");
                            None
                        }
                    }
                } else {
                    state.functions.lookup(&ns_str, &name_str)
                };

                match resolved {
                    Some((pkg_idx, function)) => {
                        let result = invoke(state, functions, pkg_idx, &function, &args, None);
                        stack.push(result);
                    }
                    None => {
                        state.platform.log_warning(&format!("unknown function '{name_str}'"));
                        stack.push(Value::Integer(0));
                    }
                }
            }

            Instruction::CallBoundFunction { name, argc } => {
                let args = pop_args(&mut stack, usize::from(*argc), &locals, state)?;
                let target = pop_value(&mut stack)?;
                let target_value = deref(&target, &locals, state);
                let object_id = ObjectId::from_raw(target_value.to_integer().max(0) as u32);
                let name_str = state.interner.resolve(*name).to_string();

                let class_name = state.objects.get(object_id).map(|o| o.class_name().to_string());
                let mut result = None;
                if let Some(class_name) = class_name {
                    for ancestor in state.objects.class_hierarchy(&class_name).to_vec() {
                        if let Some((pkg_idx, function)) = state.functions.lookup(&ancestor.to_ascii_lowercase(), &name_str) {
                            result = Some(invoke(state, functions, pkg_idx, &function, &args, Some(object_id)));
                            break;
                        }
                    }
                }
                match result {
                    Some(v) => stack.push(v),
                    None => {
                        state.platform.log_warning(&format!("unknown method '{name_str}'"));
                        stack.push(Value::Integer(0));
                    }
                }
            }

            Instruction::PushObjectInstantiation => {
                let name = pop_value(&mut stack)?;
                let type_expr = pop_value(&mut stack)?;
                let name_str = deref(&name, &locals, state).to_torque_string();
                let type_str = deref(&type_expr, &locals, state).to_torque_string();
                descriptors.push(ObjectInstantiationDescriptor {
                    type_name: type_str,
                    name: name_str,
                    fields: Vec::new(),
                    children: Vec::new(),
                });
            }
            Instruction::PushObjectField { index_count } => {
                let value = pop_value(&mut stack)?;
                let resolved_value = deref(&value, &locals, state);
                let indices = pop_n(&mut stack, usize::from(*index_count))?;
                let resolved_indices: Vec<Value> = indices.iter().map(|v| deref(v, &locals, state)).collect();
                let base = pop_value(&mut stack)?;
                let base_str = deref(&base, &locals, state).to_torque_string();
                let folded = if resolved_indices.is_empty() {
                    base_str
                } else {
                    fold_name(&base_str, &resolved_indices)
                };
                let field_id = state.interner.intern(&folded);
                let top = descriptors.last_mut().expect("PushObjectField with no open object instantiation");
                top.fields.push(ResolvedField { name: field_id, value: resolved_value });
            }
            Instruction::PopObjectInstantiation { child_count: _ } => {
                let completed = descriptors.pop().expect("PopObjectInstantiation with no open object instantiation");
                if let Some(parent) = descriptors.last_mut() {
                    parent.children.push(completed);
                } else {
                    match state.objects.materialize(&completed) {
                        Some(id) => stack.push(Value::Integer(id.as_u32() as i32)),
                        None => {
                            state.platform.log_error(&format!("unknown object type '{}'", completed.type_name));
                            stack.push(Value::Integer(0));
                        }
                    }
                }
            }
            Instruction::PopObjectField => {}
        }

        ip += delta;
    }
}

fn fold_name(base: &str, indices: &[Value]) -> String {
    let joined: Vec<String> = indices.iter().map(Value::to_torque_string).collect();
    format!("{base}_{}", joined.join("_"))
}

fn pop_value(stack: &mut Vec<Value>) -> Result<Value, BytecodeError> {
    stack.pop().ok_or(BytecodeError::StackUnderflow)
}

/// Pops the last `count` values off the stack, returned in the order they
/// were originally pushed (left-to-right evaluation order). `Vec::split_off`
/// preserves relative order, so no separate reversal step is needed.
fn pop_n(stack: &mut Vec<Value>, count: usize) -> Result<Vec<Value>, BytecodeError> {
    if stack.len() < count {
        return Err(BytecodeError::StackUnderflow);
    }
    Ok(stack.split_off(stack.len() - count))
}

fn pop_args(stack: &mut Vec<Value>, count: usize, locals: &AHashMap<StringId, Value>, state: &mut ExecState) -> Result<Vec<Value>, BytecodeError> {
    let raw = pop_n(stack, count)?;
    Ok(raw.iter().map(|v| deref(v, locals, state)).collect())
}

fn pop_num(stack: &mut Vec<Value>, locals: &AHashMap<StringId, Value>, state: &mut ExecState) -> Result<Value, BytecodeError> {
    let raw = pop_value(stack)?;
    Ok(deref(&raw, locals, state))
}

fn binary_float(
    stack: &mut Vec<Value>,
    locals: &AHashMap<StringId, Value>,
    state: &mut ExecState,
    op: impl Fn(f32, f32) -> f32,
) -> Result<(), BytecodeError> {
    let b = pop_num(stack, locals, state)?.to_float();
    let a = pop_num(stack, locals, state)?.to_float();
    stack.push(Value::Float(op(a, b)));
    Ok(())
}

fn binary_cmp(
    stack: &mut Vec<Value>,
    locals: &AHashMap<StringId, Value>,
    state: &mut ExecState,
    op: impl Fn(f32, f32) -> bool,
) -> Result<(), BytecodeError> {
    let b = pop_num(stack, locals, state)?.to_float();
    let a = pop_num(stack, locals, state)?.to_float();
    stack.push(Value::Integer(i32::from(op(a, b))));
    Ok(())
}

/// Resolves a `Ref`/`MemoryRef` to its current concrete value; a non-ref
/// value passes through unchanged.
fn deref(value: &Value, locals: &AHashMap<StringId, Value>, state: &ExecState) -> Value {
    match value {
        Value::Ref(RefTarget::Local(id)) => locals.get(id).cloned().unwrap_or(Value::Integer(0)),
        Value::Ref(RefTarget::Global(id)) => state.globals.get(id).cloned().unwrap_or(Value::Integer(0)),
        Value::Ref(RefTarget::Field { object, field }) => state
            .objects
            .get(*object)
            .and_then(|o| o.get_field(*field))
            .unwrap_or(Value::Integer(0)),
        Value::MemoryRef(..) => value.materialize_memory(),
        other => other.clone(),
    }
}

/// Writes `new_value` through an lvalue handle. Anything that isn't a
/// writable `Ref`/`MemoryRef` is a compiler bug (only `compile_lvalue`
/// produces values meant to reach here) — logged rather than panicking, so a
/// malformed-bytecode input degrades to a no-op instead of crashing the host.
fn write_through(target: &Value, new_value: Value, locals: &mut AHashMap<StringId, Value>, state: &mut ExecState) {
    match target {
        Value::Ref(RefTarget::Local(id)) => {
            locals.insert(*id, new_value);
        }
        Value::Ref(RefTarget::Global(id)) => {
            state.globals.insert(*id, new_value);
        }
        Value::Ref(RefTarget::Field { object, field }) => {
            if let Some(obj) = state.objects.get_mut(*object) {
                obj.set_field(*field, new_value);
            } else {
                state.platform.log_error("assignment to a field on an unknown object");
            }
        }
        Value::MemoryRef(cell, _) => cell.write(new_value),
        _ => state.platform.log_error("assignment to a non-writable temporary"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile_program;
    use crate::object::ObjectRegistry;
    use crate::parser::parse;
    use crate::platform::NullPlatformContext;

    fn run_source(src: &str) -> Value {
        let program = parse(src).unwrap();
        let mut interner = Interner::new(false);
        let code = compile_program(&program, &mut interner).unwrap();
        let mut globals = AHashMap::new();
        let mut functions = FunctionRegistry::new();
        let mut objects = ObjectRegistry::new();
        let mut platform = NullPlatformContext;
        let mut state = ExecState {
            interner: &mut interner,
            globals: &mut globals,
            functions: &mut functions,
            objects: &mut objects,
            platform: &mut platform,
            max_recursion_depth: 0,
            call_depth: 0,
        };
        execute(&mut state, &code.functions, &code.top_level).unwrap()
    }

    #[test]
    fn for_loop_sums_to_fifty_five() {
        let result = run_source("$total = 0; for (%i = 1; %i < 11; %i++) { $total = $total + %i; } return $total;");
        assert_eq!(result.to_integer(), 55);
    }

    #[test]
    fn while_loop_sums_until_threshold() {
        let result = run_source("%i = 0; $total = 0; while (%i < 10) { $total = $total + %i; %i = %i + 1; } return $total;");
        assert_eq!(result.to_integer(), 45);
    }

    #[test]
    fn array_name_folding_is_equivalent_to_flat_name() {
        let result = run_source("$a[1,2,3] = 7; return $a_1_2_3;");
        assert_eq!(result.to_integer(), 7);
    }

    #[test]
    fn switch_with_multi_case_and_default() {
        let via_case2 = run_source("$x = 2; switch ($x) { case 1: $r = 10; case 2 or 3: $r = 20; default: $r = -1; } return $r;");
        assert_eq!(via_case2.to_integer(), 20);
        let via_default = run_source("$x = 9; switch ($x) { case 1: $r = 10; case 2 or 3: $r = 20; default: $r = -1; } return $r;");
        assert_eq!(via_default.to_integer(), -1);
    }

    #[test]
    fn unknown_function_call_logs_and_yields_zero() {
        let program = parse("return doesNotExist();").unwrap();
        let mut interner = Interner::new(false);
        let code = compile_program(&program, &mut interner).unwrap();
        let mut globals = AHashMap::new();
        let mut functions = FunctionRegistry::new();
        let mut objects = ObjectRegistry::new();
        let mut platform = crate::platform::CollectingPlatformContext::default();
        let mut state = ExecState {
            interner: &mut interner,
            globals: &mut globals,
            functions: &mut functions,
            objects: &mut objects,
            platform: &mut platform,
            max_recursion_depth: 0,
            call_depth: 0,
        };
        let result = execute(&mut state, &code.functions, &code.top_level).unwrap();
        assert_eq!(result.to_integer(), 0);
        assert_eq!(platform.warnings.len(), 1);
    }
}
