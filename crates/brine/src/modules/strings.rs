//! String utilities.
//!
//! Transforms and predicates delegate to the host string methods; `join-list`
//! walks a cons-pair list; `foreach-str` iterates a string through the work
//! queue one character at a time, restaging itself via a bootstrap code value
//! so the user function runs between steps without host recursion.

use std::sync::{Arc, OnceLock};

use crate::{
    error::{RunError, RunResult},
    natives::{ModuleBuilder, expect_callable, expect_str, native, pop1, pop2, raw_function},
    state::State,
    value::{Instruction, Value, render_source},
};

pub(crate) fn module() -> ModuleBuilder {
    let mut m = ModuleBuilder::new("strings");

    register_transform(&mut m, "->lower", |s| s.to_lowercase());
    register_transform(&mut m, "->upper", |s| s.to_uppercase());
    register_transform(&mut m, "fold-case", |s| s.to_lowercase());
    register_transform(&mut m, "swap-case", |s| {
        s.chars()
            .flat_map(|c| {
                if c.is_uppercase() {
                    c.to_lowercase().collect::<Vec<_>>()
                } else {
                    c.to_uppercase().collect::<Vec<_>>()
                }
            })
            .collect()
    });
    register_transform(&mut m, "->title", title_case);

    register_predicate(&mut m, "alpha?", |s| {
        !s.is_empty() && s.chars().all(char::is_alphabetic)
    });
    register_predicate(&mut m, "digit?", |s| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
    });
    register_predicate(&mut m, "alnum?", |s| {
        !s.is_empty() && s.chars().all(char::is_alphanumeric)
    });
    register_predicate(&mut m, "ascii?", |s| s.is_ascii());
    register_predicate(&mut m, "space?", |s| {
        !s.is_empty() && s.chars().all(char::is_whitespace)
    });
    register_predicate(&mut m, "lower?", |s| {
        s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase)
    });
    register_predicate(&mut m, "upper?", |s| {
        s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
    });

    m.register_simple("join-list", |stack| {
        let (sep, list, rest) = pop2(&stack)?;
        let sep = expect_str(&sep)?;
        let mut parts = Vec::new();
        let mut current = list;
        loop {
            let Value::Vec(pair) = &current else {
                return Err(RunError::type_error(
                    "join-list requires a list of strings as its argument",
                ));
            };
            match pair.len() {
                0 => break,
                2 => {
                    parts.push(expect_str(&pair[0])?);
                    let tail = pair[1].clone();
                    current = tail;
                }
                n => {
                    return Err(RunError::type_error(format!(
                        "a list must be composed of 2-long tuples, got one of size {n}"
                    )));
                }
            }
        }
        let joined = parts
            .iter()
            .map(|s| &**s)
            .collect::<Vec<_>>()
            .join(&*sep);
        Ok(rest.push(Value::str(joined)))
    });

    // `"abc" fn foreach-str` — run fn once per character. The step native
    // restages itself through a bootstrap code value; the function must
    // consume the character it is given.
    let bootstrap_cell: Arc<OnceLock<Value>> = Arc::new(OnceLock::new());
    let step = {
        let cell = Arc::clone(&bootstrap_cell);
        native("--foreach-str-step", move |state| {
            let bootstrap = cell.get().expect("bootstrap is initialized before use");
            foreach_step(state, bootstrap)
        })
    };
    let bootstrap = raw_function(
        vec![
            Instruction::Put(step.clone()),
            Instruction::CallByValue,
            Instruction::CallByValue,
            Instruction::CallByValue,
        ],
        "--bootstrap-foreach-step",
    );
    bootstrap_cell
        .set(bootstrap)
        .expect("bootstrap cell is set exactly once");

    let init = {
        let step = step.clone();
        native("--foreach-str-init", move |state: State| {
            let (function, text, state) = state.pop2()?;
            expect_str(&text)?;
            expect_callable(&function)?;
            Ok(state
                .push(text)
                .push(function)
                .push(Value::Int(0))
                .push(step.clone()))
        })
    };
    let foreach = raw_function(
        vec![
            Instruction::Put(init),
            Instruction::CallByValue,
            Instruction::CallByValue,
            Instruction::CallByValue,
            Instruction::CallByValue,
        ],
        "foreach-str",
    );
    m.add("foreach-str", foreach.clone());
    m.add("∀s", foreach);

    m
}

/// One iteration step: either schedules the next character plus a restage of
/// itself, or pushes two inert code values to satisfy the pending calls.
fn foreach_step(state: State, bootstrap: &Value) -> RunResult<State> {
    let (index, function, text, state) = state.pop3()?;
    let Value::Int(index) = &index else {
        return Err(RunError::internal_error(format!(
            "foreach-str index is not an int: {}",
            render_source(&index)
        )));
    };
    let index = *index;
    let Value::Str(s) = &text else {
        return Err(RunError::internal_error("foreach-str lost its string"));
    };

    #[allow(clippy::cast_sign_loss)]
    let Some(c) = s.chars().nth(index as usize) else {
        let identity = raw_function(vec![], "--identity");
        return Ok(state.push(identity.clone()).push(identity));
    };

    Ok(state
        .push(text.clone())
        .push(function.clone())
        .push(Value::Int(index + 1))
        .push(bootstrap.clone())
        .push(Value::str(c.to_string()))
        .push(function))
}

fn register_transform(
    m: &mut ModuleBuilder,
    name: &str,
    transform: impl Fn(&str) -> String + Send + Sync + 'static,
) {
    m.register_simple(name, move |stack| {
        let (value, rest) = pop1(&stack)?;
        let s = expect_str(&value)?;
        Ok(rest.push(Value::str(transform(&s))))
    });
}

fn register_predicate(
    m: &mut ModuleBuilder,
    name: &str,
    predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
) {
    m.register_simple(name, move |stack| {
        let (value, rest) = pop1(&stack)?;
        let s = expect_str(&value)?;
        Ok(rest.push(Value::bool_atom(predicate(&s))))
    });
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
