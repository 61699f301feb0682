//! Top-level entry points: boot a state, run instructions or source.

use std::sync::Arc;

use crate::{
    error::RunResult,
    prelude,
    state::{Scope, ScopeId, State},
    trace::{Middleware, NoopMiddleware},
    value::{Code, Instruction, Value},
    vm,
};

/// Boots a fresh interpreter state: a builtin scope holding the prelude and
/// a global scope parented on it. Both live forever.
pub fn boot_state() -> State {
    let builtin_id = ScopeId::fresh();
    let global_id = ScopeId::fresh();
    let builtin = prelude::prelude().into_scope(None, builtin_id);
    let global = Scope::persistent(Some(builtin_id), global_id);
    State::make(builtin, global)
}

/// Wraps a program in the entry-point code value. Entry code runs in the
/// caller's scope: top-level definitions land in the global scope.
pub(crate) fn entry_code(instructions: Vec<Instruction>, name: &str, source: Option<&str>) -> Value {
    let mut code = Code::raw(instructions, name);
    code.source = source.map(Arc::from);
    Value::code(code)
}

/// Runs a program against a fresh state.
pub fn run(instructions: Vec<Instruction>) -> RunResult<State> {
    run_with_middleware(instructions, &mut NoopMiddleware)
}

/// Like [`run`], with a middleware hook observing every instruction.
pub fn run_with_middleware<M: Middleware>(
    instructions: Vec<Instruction>,
    middleware: &mut M,
) -> RunResult<State> {
    let entry = entry_code(instructions, "<entry-point>", None);
    vm::call_with_middleware(boot_state(), &entry, middleware)
}

/// Parses and runs source text against a fresh state.
pub fn run_source(source: &str) -> RunResult<State> {
    run_source_with_middleware(source, &mut NoopMiddleware)
}

/// Like [`run_source`], with a middleware hook observing every instruction.
pub fn run_source_with_middleware<M: Middleware>(source: &str, middleware: &mut M) -> RunResult<State> {
    let instructions = crate::parse::parse(source)?;
    let entry = entry_code(instructions, "<entry-point>", Some(source));
    vm::call_with_middleware(boot_state(), &entry, middleware)
}
