//! The `case` pattern matcher.
//!
//! `case` consumes a code value of clauses and runs it against a sentinel
//! atom to collect `(pattern_vec, action_code)` pairs in source order. The
//! first pattern that unifies against the stack wins: its matched prefix is
//! consumed, dot-captures are re-pushed in ascending key order, and the
//! action runs in a fresh scope with the named captures bound.
//!
//! Pattern elements, matched against the top of the stack (rightmost element
//! against the top):
//!
//! - literal ints and strings match structurally
//! - `:label` atoms (the colon survives tuple parsing) match that atom
//! - `_` matches anything without capturing
//! - a run of dots captures a stack slot with key = run length (`.N` gives
//!   an explicit key); captures are re-pushed in ascending key order
//! - any other atom binds the value under that name in the action's scope
//! - a nested tuple pattern recurses element-wise into a tuple value

use std::sync::Arc;

use crate::{
    error::{RunError, RunResult},
    intern::{atom, atom_label},
    natives::{native, raw_function},
    stack::Stack,
    state::State,
    value::{Code, Instruction, Value, render_source},
};

const SENTINEL: &str = "{case sentinel}";

/// Builds the `case` builtin. `def_native` is the binding native the bound
/// action's prologue calls for each named capture.
pub(crate) fn case_value(def_native: Value) -> Value {
    let spread = native("--case-spread", case_spread);
    let matcher = native("--case-match", move |state| case_match(state, &def_native));
    raw_function(
        vec![
            Instruction::Put(spread),
            Instruction::CallByValue,
            Instruction::CallByValue,
            Instruction::Put(matcher),
            Instruction::CallByValue,
            Instruction::CallByValue,
        ],
        "case",
    )
}

/// Pops the clause code and stages it to run after a sentinel push, so the
/// matcher can find where the clauses end.
fn case_spread(state: State) -> RunResult<State> {
    let (clauses, state) = state.pop()?;
    if !matches!(clauses, Value::Code(_)) {
        return Err(RunError::pattern_error(format!(
            "{} is not a code value of case clauses",
            render_source(&clauses)
        )));
    }
    let staged = Value::code(Code::raw(
        vec![
            Instruction::Put(Value::atom(SENTINEL)),
            Instruction::Put(clauses),
            Instruction::CallByValue,
        ],
        "--case-clauses",
    ));
    Ok(state.push(staged))
}

/// Collects the clause pairs, finds the first matching pattern, rewrites the
/// stack, and leaves the bound action on top for the trailing call.
fn case_match(state: State, def_native: &Value) -> RunResult<State> {
    let sentinel = Value::atom(SENTINEL);
    let mut collected = Vec::new();
    let mut state = state;
    loop {
        let (value, rest) = state.pop().map_err(|_| {
            RunError::pattern_error("case clauses were not properly collected")
        })?;
        state = rest;
        if value.is_same(&sentinel) {
            break;
        }
        collected.push(value);
    }
    collected.reverse();

    if collected.len() % 2 != 0 {
        return Err(RunError::pattern_error("odd number of case forms"));
    }

    for pair in collected.chunks_exact(2) {
        let (pattern, action) = (&pair[0], &pair[1]);
        let Value::Vec(pattern) = pattern else {
            return Err(RunError::pattern_error(format!(
                "{} is not a tuple pattern",
                render_source(pattern)
            )));
        };
        let Value::Code(action) = action else {
            return Err(RunError::pattern_error(format!(
                "{} is not a code action",
                render_source(action)
            )));
        };
        if let Some(matched) = match_pattern(pattern, state.stack())? {
            let mut stack = matched.rest;
            let mut dots = matched.dots;
            dots.sort_by_key(|(key, _)| *key);
            for (_, value) in dots {
                stack = stack.push(value);
            }
            let bound = bind_action(action, matched.bindings, def_native);
            return Ok(state.with_stack(stack).push(bound));
        }
    }

    Err(RunError::pattern_error("no pattern matched the stack"))
}

#[derive(Debug)]
struct Matched {
    /// The stack with the matched prefix consumed.
    rest: Stack,
    /// Dot captures as `(key, value)`, in pattern traversal order.
    dots: Vec<(usize, Value)>,
    /// Named captures, in pattern traversal order.
    bindings: Vec<(Arc<str>, Value)>,
}

/// Tries to unify a pattern against the stack. `Ok(None)` means the pattern
/// does not match; errors are reserved for ill-formed patterns.
fn match_pattern(pattern: &[Value], stack: &Stack) -> RunResult<Option<Matched>> {
    // grab the top `k` values as a window ordered like the pattern
    // (leftmost pattern element against the deepest value)
    let mut window = Vec::with_capacity(pattern.len());
    let mut rest = stack.clone();
    for _ in 0..pattern.len() {
        let Some((value, below)) = rest.pop() else {
            return Ok(None);
        };
        window.push(value);
        rest = below;
    }
    window.reverse();

    let mut dots = Vec::new();
    let mut bindings = Vec::new();
    for (element, value) in pattern.iter().zip(window.iter()) {
        if !match_element(element, value, &mut dots, &mut bindings)? {
            return Ok(None);
        }
    }
    Ok(Some(Matched { rest, dots, bindings }))
}

fn match_element(
    element: &Value,
    value: &Value,
    dots: &mut Vec<(usize, Value)>,
    bindings: &mut Vec<(Arc<str>, Value)>,
) -> RunResult<bool> {
    match element {
        Value::Atom(id) => {
            let label = atom_label(*id);
            if &*label == "_" {
                return Ok(true);
            }
            if let Some(wanted) = label.strip_prefix(':') {
                return Ok(matches!(value, Value::Atom(v) if *v == atom(wanted)));
            }
            if let Some(key) = dot_key(&label) {
                dots.push((key, value.clone()));
                return Ok(true);
            }
            if bindings.iter().any(|(name, _)| **name == *label) {
                return Err(RunError::pattern_error(format!(
                    "duplicate binding {label} in pattern"
                )));
            }
            bindings.push((label, value.clone()));
            Ok(true)
        }
        Value::Vec(elements) => match value {
            Value::Vec(values) if values.len() == elements.len() => {
                for (element, value) in elements.iter().zip(values.iter()) {
                    if !match_element(element, value, dots, bindings)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        },
        literal => Ok(literal.loose_eq(value)),
    }
}

/// The capture key of a dots-only atom: `..` has key 2, `.3` has key 3.
fn dot_key(label: &str) -> Option<usize> {
    if !label.is_empty() && label.chars().all(|c| c == '.') {
        return Some(label.len());
    }
    let digits = label.strip_prefix('.')?;
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return digits.parse().ok();
    }
    None
}

/// Prepends a binding prologue to the action so each named capture is
/// defined in the action's fresh scope before its body runs.
fn bind_action(action: &Arc<Code>, bindings: Vec<(Arc<str>, Value)>, def_native: &Value) -> Value {
    if bindings.is_empty() {
        return Value::Code(Arc::clone(action));
    }
    let mut prologue = Vec::with_capacity(bindings.len() * 4);
    for (name, value) in bindings {
        prologue.push(Instruction::Put(value));
        prologue.push(Instruction::Put(Value::atom(&name)));
        prologue.push(Instruction::Put(def_native.clone()));
        prologue.push(Instruction::CallByValue);
    }
    Value::code(action.with_prelude(prologue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_keys_decode_runs_and_explicit_forms() {
        assert_eq!(dot_key("."), Some(1));
        assert_eq!(dot_key("..."), Some(3));
        assert_eq!(dot_key(".7"), Some(7));
        assert_eq!(dot_key("x"), None);
        assert_eq!(dot_key(".x"), None);
        assert_eq!(dot_key(""), None);
    }

    #[test]
    fn shallow_stack_is_no_match_rather_than_an_error() {
        let pattern = vec![Value::Int(1), Value::Int(2)];
        let stack = Stack::from_values([Value::Int(2)]);
        assert!(match_pattern(&pattern, &stack).unwrap().is_none());
    }

    #[test]
    fn duplicate_bindings_are_rejected() {
        let pattern = vec![Value::atom("x"), Value::atom("x")];
        let stack = Stack::from_values([Value::Int(1), Value::Int(2)]);
        let err = match_pattern(&pattern, &stack).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::PatternError);
    }

    #[test]
    fn colon_atoms_match_the_named_atom() {
        let pattern = vec![Value::atom(":rect")];
        let stack = Stack::from_values([Value::atom("rect")]);
        assert!(match_pattern(&pattern, &stack).unwrap().is_some());
        let stack = Stack::from_values([Value::atom("circle")]);
        assert!(match_pattern(&pattern, &stack).unwrap().is_none());
    }

    #[test]
    fn nested_tuple_patterns_capture_elements() {
        // ((a b)) against a stack holding (1 2)
        let pattern = vec![Value::vec(vec![Value::atom("a"), Value::atom("b")])];
        let stack = Stack::from_values([Value::vec(vec![Value::Int(1), Value::Int(2)])]);
        let matched = match_pattern(&pattern, &stack).unwrap().unwrap();
        assert_eq!(matched.bindings.len(), 2);
        assert!(matched.rest.is_empty());
    }
}
