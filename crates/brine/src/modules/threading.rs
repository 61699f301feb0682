//! Host-thread concurrency bridge.
//!
//! `run-concurrently` spawns one OS thread per (function, initial stack)
//! pair, each executing an independent interpreter instance with its own
//! state. There is no shared mutable state between the instances; the only
//! process-global structure they touch is the atom intern table, which is
//! mutex-guarded. Results come back in positional correspondence with the
//! inputs once every thread has finished.

use std::{sync::Arc, thread};

use enumflags2::BitFlags;

use crate::{
    error::{RunError, RunResult},
    natives::{ModuleBuilder, list_vec_to_stack, stack_to_list_vec},
    runner,
    stack::Stack,
    state::State,
    value::{Code, Value, render_source},
    vm,
};

pub(crate) fn module() -> ModuleBuilder {
    let mut m = ModuleBuilder::new("threading");
    m.register("run-concurrently", run_concurrently);
    m
}

/// `(functions) (initial-stacks) run-concurrently` — resulting stacks, as
/// cons-pair lists, in positional correspondence with the inputs.
fn run_concurrently(state: State) -> RunResult<State> {
    let (stacks, functions, state) = state.pop2()?;
    let Value::Vec(stacks) = &stacks else {
        return Err(RunError::type_error(format!(
            "{} is not a vec of initial stacks",
            render_source(&stacks)
        )));
    };
    let Value::Vec(functions) = &functions else {
        return Err(RunError::type_error(format!(
            "{} is not a vec of functions",
            render_source(&functions)
        )));
    };
    if stacks.len() != functions.len() {
        return Err(RunError::type_error(format!(
            "expected as many initial stacks as functions, got {} and {}",
            stacks.len(),
            functions.len()
        )));
    }

    let mut handles = Vec::with_capacity(functions.len());
    for (function, encoded) in functions.iter().zip(stacks.iter()) {
        let initial = list_vec_to_stack(encoded)?;
        let function = detach(function)?;
        handles.push(thread::spawn(move || run_one(function, initial)));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let stack = handle
            .join()
            .map_err(|_| RunError::internal_error("a concurrent interpreter thread panicked"))??;
        results.push(stack_to_list_vec(&stack));
    }
    Ok(state.push(Value::vec(results)))
}

/// Rebuilds a function for an independent interpreter: code values lose
/// their closure, since the scope table it points into stays behind.
fn detach(function: &Value) -> RunResult<Value> {
    match function {
        Value::Code(code) => Ok(Value::code(Code {
            instructions: Arc::clone(&code.instructions),
            closure: None,
            flags: BitFlags::empty(),
            name: Arc::clone(&code.name),
            source: code.source.clone(),
            retain: None,
        })),
        Value::Native(_) => Ok(function.clone()),
        other => Err(RunError::type_error(format!(
            "{} is not a function",
            render_source(other)
        ))),
    }
}

fn run_one(function: Value, initial: Stack) -> RunResult<Stack> {
    let state = runner::boot_state().with_stack(initial);
    let state = vm::call(state, &function)?;
    Ok(state.stack().clone())
}
