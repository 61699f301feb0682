//! Pattern matching with `case`: literals, atoms, wildcards, stack
//! captures, named bindings, and nested tuple patterns.

use brine::{ErrorKind, State, Value, run_source};
use pretty_assertions::assert_eq;

fn run(source: &str) -> State {
    run_source(source).unwrap_or_else(|err| panic!("program failed: {err}\n{source}"))
}

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

#[test]
fn literal_value_match() {
    assert_eq!(int_stack(&run("1 { (1) {4} } case")), vec![4]);
}

#[test]
fn multiple_literal_match() {
    assert_eq!(int_stack(&run("1 3 8 { (1 3 8) {4} } case")), vec![4]);
}

#[test]
fn first_matching_pattern_wins_in_source_order() {
    let state = run(
        "1 2 3
         { (1 2 4) {1}
           (1 2 3) {2}
           (1 2 2) {3}
         } case",
    );
    assert_eq!(int_stack(&state), vec![2]);
}

#[test]
fn simple_stack_capture_repushes_the_slot() {
    assert_eq!(int_stack(&run(":math (+) import 1 { (.) {1 +} } case")), vec![2]);
}

#[test]
fn stack_captures_repush_in_ascending_key_order() {
    assert_eq!(int_stack(&run("1 2 3 4 { (. ... .. .) {} } case")), vec![1, 4, 3, 2]);
}

#[test]
fn wildcards_consume_without_capturing() {
    // final stack top-down is 3, 5, 4
    assert_eq!(int_stack(&run("1 2 3 4 5 {(_ _ .. . .) {}} case")), vec![4, 5, 3]);
}

#[test]
fn nested_tuple_captures_spill_onto_the_stack() {
    // final stack top-down is 2, 3, 4, 1
    assert_eq!(int_stack(&run("(1 2 3 4) { ((. ... .. .)) {} } case")), vec![1, 4, 3, 2]);
}

#[test]
fn explicit_dot_keys_order_captures() {
    assert_eq!(int_stack(&run("1 2 { (.2 .1) {} } case")), vec![2, 1]);
}

#[test]
fn named_capture_binds_in_the_action() {
    assert_eq!(int_stack(&run("1 {(a) {a}} case")), vec![1]);
}

#[test]
fn named_captures_do_not_leak_between_patterns() {
    let state = run(
        ":math (+) import
         1 2
         { (a 5)  {a}
           (_ b)  {b b +}
         } case",
    );
    assert_eq!(int_stack(&state), vec![4]);
}

#[test]
fn atom_pattern_matches_by_identity() {
    assert_eq!(int_stack(&run(":rect {(:rect) {4}} case")), vec![4]);
}

#[test]
fn atom_pattern_rejects_other_atoms() {
    let err = run_source(":circle {(:rect) {4}} case").unwrap_err();
    assert_eq!(err.kind, ErrorKind::PatternError);
}

#[test]
fn nested_tuple_pattern_matches_structurally() {
    assert_eq!(int_stack(&run("(1 2) { ((1 2)) {4} } case")), vec![4]);
}

#[test]
fn nested_tuple_pattern_binds_elements() {
    assert_eq!(int_stack(&run("(1 2) { ((a b)) {b a} } case")), vec![2, 1]);
}

#[test]
fn no_matching_pattern_is_a_pattern_error() {
    let err = run_source("7 { (1) {4} } case").unwrap_err();
    assert_eq!(err.kind, ErrorKind::PatternError);
}

#[test]
fn odd_number_of_case_forms_is_a_pattern_error() {
    let err = run_source("1 { (1) } case").unwrap_err();
    assert_eq!(err.kind, ErrorKind::PatternError);
}

#[test]
fn non_tuple_pattern_is_a_pattern_error() {
    let err = run_source("1 { 9 {4} } case").unwrap_err();
    assert_eq!(err.kind, ErrorKind::PatternError);
}

#[test]
fn duplicate_bindings_are_a_pattern_error() {
    let err = run_source("1 2 { (a a) {} } case").unwrap_err();
    assert_eq!(err.kind, ErrorKind::PatternError);
}

#[test]
fn matched_bindings_shadow_outer_definitions() {
    assert_eq!(int_stack(&run("5 :a def 1 {(a) {a}} case")), vec![1]);
}
