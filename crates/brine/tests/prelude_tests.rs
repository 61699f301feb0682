//! Behavior of the prelude builtins: stack shufflers, bindings, equality,
//! and the `,` collection operator.

use brine::{ErrorKind, State, Value, run_source};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Runs a program against a fresh state, panicking on failure.
fn run(source: &str) -> State {
    run_source(source).unwrap_or_else(|err| panic!("program failed: {err}\n{source}"))
}

/// The final stack from bottom to top, as i64s.
fn int_stack(state: &State) -> Vec<i64> {
    state
        .stack()
        .to_values()
        .iter()
        .map(|value| match value {
            Value::Int(n) => *n,
            other => panic!("expected an int on the stack, got {other}"),
        })
        .collect()
}

fn top_is_true(state: &State) -> bool {
    matches!(state.stack().peek(), Some(value) if value.is_same(&Value::bool_atom(true)))
}

#[test]
fn dup_duplicates_the_top() {
    assert_eq!(int_stack(&run("1 2 dup")), vec![1, 2, 2]);
}

#[test]
fn two_dup_duplicates_the_top_pair() {
    assert_eq!(int_stack(&run("1 2 2dup")), vec![1, 2, 1, 2]);
}

#[test]
fn drop_removes_the_top() {
    assert_eq!(int_stack(&run("1 2 drop")), vec![1]);
}

#[test]
fn two_drop_removes_the_top_pair() {
    assert_eq!(int_stack(&run("1 2 3 2drop")), vec![1]);
}

#[test]
fn swap_exchanges_the_top_two() {
    assert_eq!(int_stack(&run("1 2 swap")), vec![2, 1]);
}

#[test]
fn over_copies_the_second_value_to_the_top() {
    assert_eq!(int_stack(&run("1 2 over")), vec![1, 2, 1]);
}

#[test]
fn rot_rotates_the_top_under() {
    assert_eq!(int_stack(&run("1 2 3 rot")), vec![3, 1, 2]);
}

#[test]
fn unrot_is_the_inverse_rotation() {
    assert_eq!(int_stack(&run("1 2 3 unrot")), vec![2, 3, 1]);
}

#[test]
fn rot_twice_is_unrot() {
    assert_eq!(int_stack(&run("1 2 3 rot rot")), int_stack(&run("1 2 3 unrot")));
}

#[test]
fn rot_three_times_is_identity() {
    assert_eq!(int_stack(&run("1 2 3 rot rot rot")), vec![1, 2, 3]);
}

#[test]
fn def_binds_a_value_that_repushes_when_called() {
    assert_eq!(int_stack(&run("5 :x def x x")), vec![5, 5]);
}

#[test]
fn jar_binds_a_function() {
    assert_eq!(int_stack(&run("{ dup } :twice jar 3 twice")), vec![3, 3]);
}

#[test]
fn jar_rejects_non_code() {
    let err = run_source("5 :x jar").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn def_rejects_rebinding_in_the_same_scope() {
    let err = run_source("5 :x def 6 :x def").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameError);
}

#[test]
fn forget_allows_rebinding() {
    assert_eq!(int_stack(&run("5 :x def :x forget 6 :x def x")), vec![6]);
}

#[test]
fn forget_is_idempotent() {
    run(":x forget :x forget");
}

#[test]
fn unbound_names_are_name_errors() {
    let err = run_source("certainly-not-bound").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameError);
}

#[test]
fn bang_calls_the_code_on_top() {
    assert_eq!(int_stack(&run("{ 1 2 } !")), vec![1, 2]);
}

#[test]
fn if_selects_the_first_branch_on_true() {
    assert_eq!(int_stack(&run("{1} {2} :true if !")), vec![1]);
}

#[test]
fn if_selects_the_second_branch_on_false() {
    assert_eq!(int_stack(&run("{1} {2} :false if !")), vec![2]);
}

#[test]
fn if_rejects_non_boolean_conditions() {
    let err = run_source("{1} {2} :maybe if").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn comma_collects_pushed_values_into_a_vec() {
    assert!(top_is_true(&run("{1 2 3}, (1 2 3) =")));
}

#[test]
fn comma_collects_nothing_into_the_empty_vec() {
    assert!(top_is_true(&run("{}, () =")));
}

#[test]
fn close_partially_applies_a_code_value() {
    assert_eq!(
        int_stack(&run(":math ( + ) import { { + } close } :make-adder jar 5 make-adder :add5 jar 37 add5")),
        vec![42]
    );
}

#[test]
fn equality_is_structural_for_vecs() {
    assert!(top_is_true(&run("(1 (2 3)) (1 (2 3)) =")));
}

#[test]
fn equality_across_tags_fails() {
    let err = run_source("1 \"1\" =").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn is_compares_atom_identity() {
    assert!(top_is_true(&run(":x :x is")));
    assert!(top_is_true(&run(":x :y is not")));
}

#[test]
fn boolean_connectives() {
    assert!(top_is_true(&run(":true :true &&")));
    assert!(top_is_true(&run(":false :true ||")));
    assert!(top_is_true(&run(":false not")));
}

#[test]
fn parent_scope_splices_into_the_caller() {
    // the parent-scope body defines into the calling scope
    assert_eq!(int_stack(&run("{ 5 :x def } parent-scope ! x")), vec![5]);
}

#[test]
fn str_renders_values() {
    let state = run("(1 :a \"s\") str");
    match state.stack().peek() {
        Some(Value::Str(s)) => assert_eq!(&**s, "(1 :a s)"),
        other => panic!("expected a string, got {other:?}"),
    }
}

proptest! {
    #[test]
    fn swap_twice_is_identity(a in -1000i64..1000, b in -1000i64..1000) {
        let state = run(&format!("{a} {b} swap swap"));
        prop_assert_eq!(int_stack(&state), vec![a, b]);
    }

    #[test]
    fn rot_cycles_three_values(a in -1000i64..1000, b in -1000i64..1000, c in -1000i64..1000) {
        let rotated = run(&format!("{a} {b} {c} rot rot rot"));
        prop_assert_eq!(int_stack(&rotated), vec![a, b, c]);
        let once = run(&format!("{a} {b} {c} rot"));
        prop_assert_eq!(int_stack(&once), vec![c, a, b]);
    }

    #[test]
    fn dup_drop_is_identity(a in -1000i64..1000) {
        let state = run(&format!("{a} dup drop"));
        prop_assert_eq!(int_stack(&state), vec![a]);
    }

    #[test]
    fn dup_leaves_two_identical_tops(a in -1000i64..1000) {
        let state = run(&format!("{a} dup"));
        prop_assert_eq!(int_stack(&state), vec![a, a]);
    }
}
