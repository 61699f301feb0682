//! Utilities for building native functions and builtin modules.

use std::sync::Arc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    error::{RunError, RunResult},
    stack::Stack,
    state::{Scope, ScopeId, State},
    value::{Code, Instruction, NativeFunction, Value, render_source},
};

/// An ordered collection of named members making up a builtin module (or the
/// prelude). Member order is the order names were registered, which is the
/// order `:all` and `:prefix` imports bind them.
#[derive(Debug, Clone)]
pub(crate) struct ModuleBuilder {
    name: &'static str,
    members: IndexMap<Arc<str>, Value>,
}

impl ModuleBuilder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            members: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add(&mut self, name: &str, value: Value) {
        self.members.insert(Arc::from(name), value);
    }

    /// Registers a native `State → State` member and returns the value, so
    /// glue code can embed it in raw instruction sequences.
    pub fn register(
        &mut self,
        name: &str,
        run: impl Fn(State) -> RunResult<State> + Send + Sync + 'static,
    ) -> Value {
        let value = native(name, run);
        self.add(name, value.clone());
        value
    }

    /// Registers a stack-only native; sugar over [`ModuleBuilder::register`]
    /// for the common case.
    pub fn register_simple(
        &mut self,
        name: &str,
        run: impl Fn(Stack) -> RunResult<Stack> + Send + Sync + 'static,
    ) -> Value {
        let value = simple(name, run);
        self.add(name, value.clone());
        value
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    pub fn members(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.members.iter()
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members.keys().map(|k| k.to_string()).collect()
    }

    /// Member table for qualified-import lookup helpers.
    pub fn members_map(&self) -> AHashMap<Arc<str>, Value> {
        self.members
            .iter()
            .map(|(name, value)| (Arc::clone(name), value.clone()))
            .collect()
    }

    /// Builds a persistent scope holding the members.
    pub fn into_scope(self, parent: Option<ScopeId>, id: ScopeId) -> Scope {
        let mut scope = Scope::persistent(parent, id);
        for (name, value) in self.members {
            scope.insert(name, value);
        }
        scope
    }
}

/// Wraps a `State → State` function as a native value.
pub(crate) fn native(
    name: &str,
    run: impl Fn(State) -> RunResult<State> + Send + Sync + 'static,
) -> Value {
    Value::Native(NativeFunction::new(name, run))
}

/// Wraps a stack-only function as a native value.
pub(crate) fn simple(
    name: &str,
    run: impl Fn(Stack) -> RunResult<Stack> + Send + Sync + 'static,
) -> Value {
    native(name, move |state: State| {
        let stack = run(state.stack().clone())?;
        Ok(state.with_stack(stack))
    })
}

/// A code value with no closure and `ParentScope` set — builtin glue.
pub(crate) fn raw_function(instructions: Vec<Instruction>, name: &str) -> Value {
    Value::code(Code::raw(instructions, name))
}

/// Like [`raw_function`], with source text attached for display.
pub(crate) fn raw_function_with_source(instructions: Vec<Instruction>, name: &str, source: &str) -> Value {
    let mut code = Code::raw(instructions, name);
    code.source = Some(Arc::from(source));
    Value::code(code)
}

// ----------------------------------------------------------------------
// Argument checking helpers
// ----------------------------------------------------------------------

/// Pops one value off a bare stack, failing with an arity error when empty.
pub(crate) fn pop1(stack: &Stack) -> RunResult<(Value, Stack)> {
    stack
        .pop()
        .ok_or_else(|| RunError::arity_error("the stack is empty"))
}

/// Pops two values; the first returned value was on top.
pub(crate) fn pop2(stack: &Stack) -> RunResult<(Value, Value, Stack)> {
    let (top, rest) = pop1(stack)?;
    let (below, rest) = pop1(&rest)?;
    Ok((top, below, rest))
}

/// Pops three values; the first returned value was on top.
pub(crate) fn pop3(stack: &Stack) -> RunResult<(Value, Value, Value, Stack)> {
    let (top, rest) = pop1(stack)?;
    let (mid, rest) = pop1(&rest)?;
    let (bottom, rest) = pop1(&rest)?;
    Ok((top, mid, bottom, rest))
}

pub(crate) fn expect_atom(value: &Value) -> RunResult<Arc<str>> {
    match value {
        Value::Atom(id) => Ok(crate::intern::atom_label(*id)),
        other => Err(RunError::type_error(format!("{} is not an atom", render_source(other)))),
    }
}

pub(crate) fn expect_str(value: &Value) -> RunResult<Arc<str>> {
    match value {
        Value::Str(s) => Ok(Arc::clone(s)),
        other => Err(RunError::type_error(format!(
            "{} is not a string",
            render_source(other)
        ))),
    }
}

pub(crate) fn expect_callable(value: &Value) -> RunResult<()> {
    if value.is_callable() {
        Ok(())
    } else {
        Err(RunError::type_error(format!(
            "{} is not a function",
            render_source(value)
        )))
    }
}

pub(crate) fn expect_box(value: &Value) -> RunResult<crate::state::BoxId> {
    match value {
        Value::Box(id) => Ok(*id),
        other => Err(RunError::type_error(format!("{} is not a box", render_source(other)))),
    }
}

// ----------------------------------------------------------------------
// Cons-pair list encoding
//
// Lists travel through the language as nested pairs: `(1 (2 ()))` is the
// list [1, 2]. These converters are shared by `run-concurrently` (initial
// stacks) and the string utilities.
// ----------------------------------------------------------------------

/// Decodes a nested-pair vec into a stack; the list head becomes the bottom.
pub(crate) fn list_vec_to_stack(value: &Value) -> RunResult<Stack> {
    let mut stack = Stack::empty();
    let mut current = value.clone();
    loop {
        let Value::Vec(values) = &current else {
            return Err(RunError::type_error(format!(
                "expected a tuple, got {}",
                render_source(&current)
            )));
        };
        match values.len() {
            0 => return Ok(stack),
            2 => {
                let head = values[0].clone();
                let rest = values[1].clone();
                if !matches!(rest, Value::Vec(_)) {
                    return Err(RunError::type_error(format!(
                        "expected a tuple as the second element, got {}",
                        render_source(&rest)
                    )));
                }
                stack = stack.push(head);
                current = rest;
            }
            n => {
                return Err(RunError::type_error(format!(
                    "got a tuple of size {n}, expected 2: {}",
                    render_source(&current)
                )));
            }
        }
    }
}

/// Encodes a stack as a nested-pair vec; the bottom becomes the list head.
pub(crate) fn stack_to_list_vec(stack: &Stack) -> Value {
    let mut list = Value::vec(vec![]);
    for value in stack.iter() {
        list = Value::vec(vec![value.clone(), list]);
    }
    list
}
