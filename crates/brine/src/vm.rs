//! The stackless interpreter loop.
//!
//! All control flow lives in a single double-ended work queue of
//! instructions; language-level calls never recurse on the host stack.
//! Calling a code value with a closure schedules `MakeScope(closure)`, the
//! body, then `PopScope`; a `ParentScope` code (or one with no closure)
//! splices only its body, which is what keeps tail recursion from growing
//! the queue.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use enumflags2::BitFlags;

use crate::{
    error::{RunError, RunResult},
    retain::{ScopeRefs, ScopeRetain, SharedScopeRefs},
    state::{ScopeId, State},
    trace::{Middleware, NoopMiddleware},
    value::{Code, Instruction, Value, render_source},
};

/// Calls a code or native value against a state.
pub fn call(state: State, function: &Value) -> RunResult<State> {
    call_with_middleware(state, function, &mut NoopMiddleware)
}

/// Like [`call`], but invokes `middleware` on every executed instruction.
pub fn call_with_middleware<M: Middleware>(
    mut state: State,
    function: &Value,
    middleware: &mut M,
) -> RunResult<State> {
    let refs: SharedScopeRefs = Arc::new(Mutex::new(ScopeRefs::new(
        state.builtin_scope_id(),
        state.global_scope_id(),
    )));
    let mut pipe: VecDeque<Instruction> = VecDeque::new();

    load_value(&mut pipe, function)?;

    loop {
        lock_refs(&refs).tick();

        let Some(instruction) = pipe.pop_back() else {
            break;
        };
        let before = state.stack().clone();

        match &instruction {
            Instruction::CallByName(name) => {
                // rewrite in place: push the looked-up value, then call it
                let value = state.look_up_name(name)?;
                pipe.push_back(Instruction::CallByValue);
                pipe.push_back(Instruction::Put(value));
            }
            Instruction::CallByValue => {
                let (function, rest) = state.pop()?;
                state = rest;
                match function {
                    Value::Code(code) => load_code(&mut pipe, &code),
                    Value::Native(native) => state = native.call(state)?,
                    other => {
                        return Err(RunError::type_error(format!(
                            "{} is not a function",
                            render_source(&other)
                        )));
                    }
                }
            }
            _ => state = execute(state, &instruction, &refs)?,
        }

        state = collect_dead_scopes(&refs, state);
        middleware.on_instruction(&instruction, &before, state.stack());
    }

    // the program is done: outstanding releases fire now. Killing a scope
    // can drop code values whose guards schedule further releases, so keep
    // flushing until the map is quiet.
    loop {
        lock_refs(&refs).flush();
        state = collect_dead_scopes(&refs, state);
        if !lock_refs(&refs).has_pending() {
            break;
        }
    }
    Ok(state)
}

/// Executes one non-call instruction.
fn execute(state: State, instruction: &Instruction, refs: &SharedScopeRefs) -> RunResult<State> {
    match instruction {
        Instruction::Put(value) => Ok(state.push(value.clone())),

        Instruction::PutCode { body, source } => {
            let closure = state.current_scope_id()?;
            let retain = ScopeRetain::new(state.scope_chain(closure), refs);
            let code = Code {
                instructions: Arc::clone(body),
                closure: Some(closure),
                flags: BitFlags::empty(),
                name: Arc::from("λ"),
                source: source.clone(),
                retain: Some(Arc::new(retain)),
            };
            Ok(state.push(Value::code(code)))
        }

        Instruction::MakeVec(size) => {
            let mut values = Vec::with_capacity(*size);
            let mut state = state;
            for _ in 0..*size {
                let (value, rest) = state.pop().map_err(|_| {
                    RunError::arity_error(format!("the stack is too shallow to collect a tuple of {size}"))
                })?;
                values.push(value);
                state = rest;
            }
            // preserve the order the elements were originally pushed
            values.reverse();
            Ok(state.push(Value::Vec(values.into())))
        }

        Instruction::MakeScope(parent) => {
            let id = ScopeId::fresh();
            let state = state.make_scope(*parent, id);
            let mut refs = lock_refs(refs);
            refs.mark_created(id);
            refs.retain_chain(&state.scope_chain(id));
            Ok(state)
        }

        Instruction::PopScope => {
            let (id, state) = state.pop_scope()?;
            let chain = state.scope_chain(id);
            lock_refs(refs).defer_release(chain);
            Ok(state)
        }

        Instruction::CallByName(_) | Instruction::CallByValue => {
            Err(RunError::internal_error("call instructions are handled by the loop"))
        }
    }
}

/// Schedules a code value's execution by prepending in reverse, so its first
/// instruction is the next one popped.
fn load_code(pipe: &mut VecDeque<Instruction>, code: &Arc<Code>) {
    match code.closure {
        Some(closure) if !code.is_parent_scope() => {
            pipe.push_back(Instruction::PopScope);
            for instruction in code.instructions.iter().rev() {
                pipe.push_back(instruction.clone());
            }
            pipe.push_back(Instruction::MakeScope(closure));
        }
        // parent-scope splice: no new scope, no pop
        _ => {
            for instruction in code.instructions.iter().rev() {
                pipe.push_back(instruction.clone());
            }
        }
    }
}

fn load_value(pipe: &mut VecDeque<Instruction>, function: &Value) -> RunResult<()> {
    match function {
        Value::Code(code) => {
            load_code(pipe, code);
            Ok(())
        }
        Value::Native(_) => {
            pipe.push_back(Instruction::CallByValue);
            pipe.push_back(Instruction::Put(function.clone()));
            Ok(())
        }
        other => Err(RunError::type_error(format!(
            "{} is not a function",
            render_source(other)
        ))),
    }
}

/// Removes dead scopes from the table. Killing a scope drops the values it
/// held, which can release further scopes, so this loops until quiet.
fn collect_dead_scopes(refs: &SharedScopeRefs, mut state: State) -> State {
    loop {
        let dead = lock_refs(refs).take_dead();
        if dead.is_empty() {
            return state;
        }
        for id in dead {
            state = state.kill_scope(id);
        }
    }
}

fn lock_refs(refs: &SharedScopeRefs) -> std::sync::MutexGuard<'_, ScopeRefs> {
    refs.lock().expect("scope refcounts poisoned")
}
