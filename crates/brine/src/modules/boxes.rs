//! Mutable reference cells with nested transactions.
//!
//! A box's storage is a stack of values: the transaction log. `<[` pushes the
//! current top as a new entry, `]>` drops the shadowed entry, `<<<` pops the
//! top. Outside any transaction the log holds exactly one entry.

use crate::{
    natives::{ModuleBuilder, expect_box, expect_callable, native, pop2, raw_function},
    state::State,
    value::{Instruction, Value},
};

pub(crate) fn module() -> ModuleBuilder {
    let mut m = ModuleBuilder::new("boxes");

    m.register("box", |state: State| {
        let (value, state) = state.pop()?;
        let (id, state) = state.add_box(value);
        Ok(state.push(Value::Box(id)))
    });

    m.register("->", |state: State| {
        let (handle, state) = state.pop()?;
        let id = expect_box(&handle)?;
        let value = state.read_box_committed(id)?;
        Ok(state.push(value))
    });

    let read_top = m.register("-!>", |state: State| {
        let (handle, state) = state.pop()?;
        let id = expect_box(&handle)?;
        let value = state.read_box_top(id)?;
        Ok(state.push(value))
    });

    let write = m.register("<-", |state: State| {
        let (value, handle, state) = state.pop2()?;
        let id = expect_box(&handle)?;
        state.write_box(id, value)
    });

    let begin = m.register("<[", |state: State| {
        let (handle, state) = state.pop()?;
        let id = expect_box(&handle)?;
        state.begin_box(id)
    });

    let commit = m.register("]>", |state: State| {
        let (handle, state) = state.pop()?;
        let id = expect_box(&handle)?;
        state.commit_box(id)
    });

    m.register("<<<", |state: State| {
        let (handle, state) = state.pop()?;
        let id = expect_box(&handle)?;
        let (_discarded, state) = state.rollback_box(id)?;
        Ok(state)
    });

    m.register("<<<?", |state: State| {
        let (handle, state) = state.pop()?;
        let id = expect_box(&handle)?;
        let (discarded, state) = state.rollback_box(id)?;
        Ok(state.push(discarded))
    });

    // `box fn <=` — atomic change: apply fn to the current top inside an
    // implicit transaction and commit. Staged so that fn runs through the
    // work queue, not on the host stack.
    let swap = native("--swap", |state: State| {
        let stack = state.stack().clone();
        let (y, x, rest) = pop2(&stack)?;
        Ok(state.with_stack(rest.push(y).push(x)))
    });
    let change_impl = {
        let (begin, read_top, write, commit) = (begin.clone(), read_top.clone(), write.clone(), commit.clone());
        native("<=-impl", move |state: State| {
            let (function, handle, state) = state.pop2()?;
            expect_box(&handle)?;
            expect_callable(&function)?;
            let staged = raw_function(
                vec![
                    Instruction::Put(handle.clone()),
                    Instruction::Put(begin.clone()),
                    Instruction::CallByValue,
                    Instruction::Put(handle.clone()),
                    Instruction::Put(read_top.clone()),
                    Instruction::CallByValue,
                    Instruction::Put(function),
                    Instruction::CallByValue,
                    Instruction::Put(handle.clone()),
                    Instruction::Put(swap.clone()),
                    Instruction::CallByValue,
                    Instruction::Put(write.clone()),
                    Instruction::CallByValue,
                    Instruction::Put(handle),
                    Instruction::Put(commit.clone()),
                    Instruction::CallByValue,
                ],
                "<=-impl!",
            );
            Ok(state.push(staged))
        })
    };
    m.add(
        "<=",
        raw_function(
            vec![
                Instruction::Put(change_impl),
                Instruction::CallByValue,
                Instruction::CallByValue,
            ],
            "<=",
        ),
    );

    m.register("<X-", |state: State| {
        let (handle, state) = state.pop()?;
        let id = expect_box(&handle)?;
        state.kill_box(id)
    });

    m
}
