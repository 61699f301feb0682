//! The prelude: builtins available without any import.
//!
//! These members populate the builtin scope every interpreter boots with.
//! Most are plain natives; a few (`!`, `print`, `,`, `case`) are raw code
//! values that stage natives through the work queue, which is the idiom used
//! whenever a builtin needs to call back into the language.

use std::{io::BufRead, sync::Arc, thread, time::Duration};

use crate::{
    case::case_value,
    error::{RunError, RunResult},
    io::with_writer,
    modules,
    natives::{
        ModuleBuilder, expect_atom, expect_callable, expect_str, native, pop1, pop2, pop3,
        raw_function, raw_function_with_source,
    },
    parse::parse,
    state::{ScopeId, State},
    value::{Code, Instruction, NativeFunction, Value, render_source},
    vm,
};

/// Builds the prelude module.
pub(crate) fn prelude() -> ModuleBuilder {
    let mut m = ModuleBuilder::new("prelude");

    // stack shufflers
    m.register_simple("dup", |stack| {
        let (x, rest) = pop1(&stack)?;
        Ok(rest.push(x.clone()).push(x))
    });
    m.register_simple("2dup", |stack| {
        let (b, a, rest) = pop2(&stack)?;
        Ok(rest.push(a.clone()).push(b.clone()).push(a).push(b))
    });
    m.register_simple("drop", |stack| {
        let (_, rest) = pop1(&stack)?;
        Ok(rest)
    });
    m.register_simple("2drop", |stack| {
        let (_, _, rest) = pop2(&stack)?;
        Ok(rest)
    });
    m.register_simple("swap", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        Ok(rest.push(y).push(x))
    });
    m.register_simple("over", |stack| {
        let (b, a, rest) = pop2(&stack)?;
        Ok(rest.push(a.clone()).push(b).push(a))
    });
    m.register_simple("rot", |stack| {
        let (c, b, a, rest) = pop3(&stack)?;
        Ok(rest.push(c).push(a).push(b))
    });
    m.register_simple("unrot", |stack| {
        let (c, b, a, rest) = pop3(&stack)?;
        Ok(rest.push(b).push(c).push(a))
    });

    // bindings
    let def_native = m.register("def", def);
    m.register("jar", jar);
    m.register("forget", forget);
    m.register("parent-scope", parent_scope);

    // rendering and printing
    m.register_simple("str", |stack| {
        let (x, rest) = pop1(&stack)?;
        Ok(rest.push(Value::str(x.to_string())))
    });
    m.register_simple("print-string", |stack| {
        let (head, rest) = pop1(&stack)?;
        let text = expect_str(&head)?;
        with_writer(|w| w.write_out(&text));
        Ok(rest)
    });
    m.register_simple("println-string", |stack| {
        let (head, rest) = pop1(&stack)?;
        let text = expect_str(&head)?;
        with_writer(|w| w.write_line(&text));
        Ok(rest)
    });
    m.add(
        "print",
        raw_function(
            vec![
                Instruction::CallByName(Arc::from("str")),
                Instruction::CallByName(Arc::from("print-string")),
            ],
            "print",
        ),
    );
    m.add(
        "println",
        raw_function(
            vec![
                Instruction::CallByName(Arc::from("str")),
                Instruction::CallByName(Arc::from("println-string")),
            ],
            "println",
        ),
    );
    m.register_simple("input", |stack| Ok(stack.push(Value::str(read_line()))));
    m.register_simple("prompt", |stack| {
        let (head, rest) = pop1(&stack)?;
        let text = expect_str(&head)?;
        with_writer(|w| w.write_out(&format!("{text} ")));
        Ok(rest.push(Value::str(read_line())))
    });
    m.register_simple("sleep", |stack| {
        let (head, rest) = pop1(&stack)?;
        thread::sleep(Duration::from_secs_f64(duration_seconds(&head)?));
        Ok(rest)
    });

    // calling
    m.add("!", raw_function(vec![Instruction::CallByValue], "!"));
    m.register_simple("if", |stack| {
        let (condition, else_, then, rest) = pop3(&stack)?;
        match bool_of(&condition) {
            Some(true) => Ok(rest.push(then)),
            Some(false) => Ok(rest.push(else_)),
            None => Err(RunError::type_error(format!(
                "{} is not a boolean (:true/:false)",
                render_source(&condition)
            ))),
        }
    });
    m.register("close", close);

    // the `,` operator: run a code value and collect what it pushed into a vec
    let spread = native("--spread-vec", spread_vec);
    let collect = native("--collect-vec", collect_vec);
    m.add(
        ",",
        raw_function_with_source(
            vec![
                Instruction::Put(spread),
                Instruction::CallByValue,
                Instruction::CallByValue,
                Instruction::Put(collect),
                Instruction::CallByValue,
            ],
            ",",
            "{ --spread-vec ! --collect-vec }",
        ),
    );

    m.add("case", case_value(def_native));
    m.register("import", import);

    // comparison and booleans
    m.register_simple("=", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        Ok(rest.push(Value::bool_atom(x.language_eq(&y)?)))
    });
    m.register_simple("is", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        Ok(rest.push(Value::bool_atom(x.is_same(&y))))
    });
    m.register_simple("&&", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        Ok(rest.push(Value::bool_atom(expect_bool(&x)? && expect_bool(&y)?)))
    });
    m.register_simple("||", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        Ok(rest.push(Value::bool_atom(expect_bool(&x)? || expect_bool(&y)?)))
    });
    m.register_simple("not", |stack| {
        let (x, rest) = pop1(&stack)?;
        Ok(rest.push(Value::bool_atom(!expect_bool(&x)?)))
    });

    m
}

/// `value :name def` — store a value under a name in the current scope. The
/// binding is a wrapper code value that re-pushes the value when called.
fn def(state: State) -> RunResult<State> {
    let (identifier, value, state) = state.pop2()?;
    let name = expect_atom(&identifier)?;
    let wrapper = Value::code(Code::raw(vec![Instruction::Put(value)], &name));
    let scope = state.current_scope_id()?;
    state.set_name(scope, &name, wrapper)
}

/// `code :name jar` — store a function under a name, recording the name on
/// code values.
fn jar(state: State) -> RunResult<State> {
    let (identifier, function, state) = state.pop2()?;
    let name = expect_atom(&identifier)?;
    if !function.is_callable() {
        return Err(RunError::type_error(format!(
            "{} is not code",
            render_source(&function)
        )));
    }
    let function = match function {
        Value::Code(code) => Value::code(code.with_name(&name)),
        other => other,
    };
    let scope = state.current_scope_id()?;
    state.set_name(scope, &name, function)
}

/// `:name forget` — remove a binding from the current scope; idempotent.
fn forget(state: State) -> RunResult<State> {
    let (identifier, state) = state.pop()?;
    let name = expect_atom(&identifier)?;
    let scope = state.current_scope_id()?;
    Ok(state.forget_name(scope, &name))
}

/// `code parent-scope` — mark a code value to run in its caller's scope.
fn parent_scope(state: State) -> RunResult<State> {
    let (value, state) = state.pop()?;
    let Value::Code(code) = &value else {
        return Err(RunError::type_error(format!(
            "expected a code value, got: {}",
            render_source(&value)
        )));
    };
    Ok(state.push(Value::code(code.with_flags(crate::value::CodeFlag::ParentScope.into()))))
}

/// `value function close` — partially apply: the value is pushed before the
/// function's body runs.
fn close(state: State) -> RunResult<State> {
    let (function, value, state) = state.pop2()?;
    let closed = match &function {
        Value::Code(code) => Value::code(code.with_prelude(vec![Instruction::Put(value)])),
        Value::Native(inner) => {
            let inner = inner.clone();
            let name = inner.name.to_string();
            Value::Native(NativeFunction::new(&name, move |state: State| {
                inner.call(state.push(value.clone()))
            }))
        }
        other => {
            return Err(RunError::type_error(format!(
                "{} is not a function",
                render_source(other)
            )));
        }
    };
    Ok(state.push(closed))
}

const SPREAD_SENTINEL: &str = "{, sentinel}";

/// Stages a function call bracketed by the spread sentinel.
fn spread_vec(state: State) -> RunResult<State> {
    let (function, state) = state.pop()?;
    expect_callable(&function)?;
    let staged = Value::code(Code::raw(
        vec![
            Instruction::Put(Value::atom(SPREAD_SENTINEL)),
            Instruction::Put(function),
            Instruction::CallByValue,
        ],
        "--spreader",
    ));
    Ok(state.push(staged))
}

/// Collects everything above the spread sentinel into a vec.
fn collect_vec(state: State) -> RunResult<State> {
    let sentinel = Value::atom(SPREAD_SENTINEL);
    let mut elements = Vec::new();
    let mut state = state;
    loop {
        let (value, rest) = state.pop().map_err(|_| {
            RunError::internal_error("collecting a vec without its sentinel on the stack")
        })?;
        state = rest;
        if value.is_same(&sentinel) {
            break;
        }
        elements.push(value);
    }
    elements.reverse();
    Ok(state.push(Value::vec(elements)))
}

/// `:module options import` — bind module members into the current scope.
fn import(state: State) -> RunResult<State> {
    let (options, identifier, state) = state.pop2()?;
    let Value::Atom(id) = &identifier else {
        return Err(RunError::type_error(format!(
            "module name has to be an atom, got: {}",
            render_source(&identifier)
        )));
    };
    let module_name = crate::intern::atom_label(*id);

    let Some(resolved) = modules::resolve(&module_name) else {
        return Err(RunError::import_error(format!("module {module_name} not found")));
    };
    let (members, state) = match resolved {
        modules::ResolvedModule::Host(builder) => (builder, state),
        modules::ResolvedModule::Source(source) => evaluate_source_module(source, state)?,
    };

    let bindings = imported_bindings(&members, &module_name, &options)?;
    let scope = state.current_scope_id()?;
    state.set_names(scope, bindings)
}

/// Resolves import options into the bindings they produce.
fn imported_bindings(
    members: &ModuleBuilder,
    module_name: &str,
    options: &Value,
) -> RunResult<Vec<(Arc<str>, Value)>> {
    let all = || -> Vec<(Arc<str>, Value)> {
        members
            .members()
            .map(|(name, value)| (Arc::clone(name), value.clone()))
            .collect()
    };
    let prefixed = |prefix: &str| -> Vec<(Arc<str>, Value)> {
        members
            .members()
            .map(|(name, value)| (Arc::from(format!("{prefix}.{name}")), value.clone()))
            .collect()
    };
    let qualified =
        |bound_as: &str| -> Vec<(Arc<str>, Value)> { vec![(Arc::from(bound_as), make_name_getter(members, bound_as))] };

    match options {
        Value::Atom(id) => {
            let label = crate::intern::atom_label(*id);
            match &*label {
                "all" => Ok(all()),
                "qual" => Ok(qualified(module_name)),
                "prefix" => Ok(prefixed(module_name)),
                _ => {
                    if let Some(bound_as) = label.strip_prefix("as:") {
                        Ok(qualified(bound_as))
                    } else if let Some(prefix) = label.strip_prefix("prefix:") {
                        Ok(prefixed(prefix))
                    } else {
                        Err(invalid_options(options))
                    }
                }
            }
        }
        Value::Vec(picked) => {
            let mut bindings = Vec::with_capacity(picked.len());
            for element in picked.iter() {
                let Value::Atom(id) = element else {
                    return Err(invalid_options(options));
                };
                let name = crate::intern::atom_label(*id);
                let value = members.get(&name).ok_or_else(|| {
                    RunError::import_error(format!("member {name} not found in module {module_name}"))
                })?;
                bindings.push((name, value.clone()));
            }
            Ok(bindings)
        }
        _ => Err(invalid_options(options)),
    }
}

fn invalid_options(options: &Value) -> RunError {
    RunError::import_error(format!("invalid import options: {}", render_source(options)))
}

/// The `:qual` lookup helper: `member_atom module` pushes the member.
fn make_name_getter(members: &ModuleBuilder, bound_as: &str) -> Value {
    let lookup = members.members_map();
    let module_name = members.name().to_owned();
    let getter = native(bound_as, move |state: State| {
        let (member, state) = state.pop()?;
        let name = match &member {
            Value::Atom(id) => crate::intern::atom_label(*id),
            Value::Str(s) => Arc::clone(s),
            other => {
                return Err(RunError::type_error(format!(
                    "member name has to be an atom or a string, got: {}",
                    render_source(other)
                )));
            }
        };
        let value = lookup.get(&name).ok_or_else(|| {
            RunError::import_error(format!("member {name} not found in module {module_name}"))
        })?;
        Ok(state.push(value.clone()))
    });
    raw_function(vec![Instruction::Put(getter), Instruction::CallByValue], bound_as)
}

/// Evaluates a source-defined module in a fresh persistent scope and collects
/// its declared exports.
fn evaluate_source_module(
    module: &modules::SourceModule,
    state: State,
) -> RunResult<(ModuleBuilder, State)> {
    let instructions = parse(module.source)?;
    let scope_id = ScopeId::fresh();
    let builtin = state.builtin_scope_id();
    let state = state
        .insert_persistent_scope(Some(builtin), scope_id)
        .push_scope_id(scope_id);
    let body = raw_function(instructions, module.name);
    let state = vm::call(state, &body)?;
    let (_, state) = state.pop_scope()?;

    let mut members = ModuleBuilder::new(module.name);
    {
        let scope = state.scope(scope_id)?;
        for export in module.exports {
            let value = scope.get(export).cloned().ok_or_else(|| {
                RunError::import_error(format!("module {} does not export {export}", module.name))
            })?;
            members.add(export, value);
        }
    }
    Ok((members, state))
}

fn bool_of(value: &Value) -> Option<bool> {
    match value {
        Value::Atom(id) if *id == crate::intern::atom_bool(true) => Some(true),
        Value::Atom(id) if *id == crate::intern::atom_bool(false) => Some(false),
        _ => None,
    }
}

fn expect_bool(value: &Value) -> RunResult<bool> {
    bool_of(value).ok_or_else(|| {
        RunError::type_error(format!(
            "{} is not a boolean (:true/:false)",
            render_source(value)
        ))
    })
}

/// A sleep duration: an int of seconds or an `(n d)` fraction.
fn duration_seconds(value: &Value) -> RunResult<f64> {
    match value {
        Value::Int(n) if *n >= 0 => Ok(*n as f64),
        Value::Vec(parts) if parts.len() == 2 => match (&parts[0], &parts[1]) {
            (Value::Int(n), Value::Int(d)) if *d != 0 && *n / *d >= 0 => Ok(*n as f64 / *d as f64),
            _ => Err(RunError::type_error(format!(
                "invalid duration: {}",
                render_source(value)
            ))),
        },
        _ => Err(RunError::type_error(format!(
            "invalid duration: {}",
            render_source(value)
        ))),
    }
}

fn read_line() -> String {
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    line
}
