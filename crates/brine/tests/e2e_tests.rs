//! End-to-end programs: the canonical scenarios, module imports in every
//! flavor, concurrency, tracing middleware, and the REPL session.

use brine::{
    CollectStringPrint, ErrorKind, RecordingMiddleware, ReplError, ReplSession, State, Value,
    install_writer, run_source, run_source_with_middleware,
};
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

fn top_is_true(state: &State) -> bool {
    matches!(state.stack().peek(), Some(value) if value.is_same(&Value::bool_atom(true)))
}

#[test]
fn factorial_via_case() {
    let state = run(":math (* -) import  { { (1){} (. .){ dup 1 - rot * swap n! } } case } :n! jar  1 10 n!");
    assert_eq!(int_stack(&state), vec![3_628_800]);
}

#[test]
fn factorial_overflows_into_bigints() {
    let state = run(":math (* -) import  { { (1){} (. .){ dup 1 - rot * swap n! } } case } :n! jar  1 30 n!");
    let expected = (1..=30u64).fold(num_bigint::BigInt::from(1), |acc, n| acc * n);
    match state.stack().peek() {
        Some(Value::BigInt(n)) => assert_eq!(**n, expected),
        other => panic!("expected a bigint, got {other:?}"),
    }
}

#[test]
fn make_adder_closure() {
    let state = run(":math ( + ) import  { :x def { x + } } :make-adder jar  5 make-adder :add5 jar  37 add5");
    assert_eq!(int_stack(&state), vec![42]);
}

#[test]
fn if_selects_branches() {
    assert_eq!(int_stack(&run("{1} {2} :true if !")), vec![1]);
    assert_eq!(int_stack(&run("{1} {2} :false if !")), vec![2]);
}

#[test]
fn box_write_then_read() {
    let state = run(":boxes (box -> <-) import  7 box :b def  b 9 <-  b ->");
    assert_eq!(int_stack(&state), vec![9]);
}

#[test]
fn nested_dot_captures_spill_in_key_order() {
    let state = run("(1 2 3 4) { ((. ... .. .)) {} } case");
    assert_eq!(int_stack(&state), vec![1, 4, 3, 2]);
}

#[test]
fn wildcard_and_dot_captures_rearrange_the_stack() {
    let state = run("1 2 3 4 5 {(_ _ .. . .) {}} case");
    assert_eq!(int_stack(&state), vec![4, 5, 3]);
}

// ---------------------------------------------------------------------
// import flavors
// ---------------------------------------------------------------------

#[test]
fn cherry_picked_import_binds_a_subset() {
    let state = run(":math (%make) import 4 2 %make");
    assert!(run_source(":math (%make) import 4 2 %make %+").is_err());
    assert!(state.stack().peek().unwrap().loose_eq(&Value::vec(vec![Value::Int(2), Value::Int(1)])));
}

#[test]
fn star_import_binds_every_member() {
    let state = run(":math :all import 4 2 %make");
    assert!(state.stack().peek().unwrap().loose_eq(&Value::vec(vec![Value::Int(2), Value::Int(1)])));
}

#[test]
fn qualified_import_binds_a_lookup_helper() {
    // the helper pushes the member; `!` calls it
    let state = run(":math :qual import 4 2 :%make math !");
    assert!(state.stack().peek().unwrap().loose_eq(&Value::vec(vec![Value::Int(2), Value::Int(1)])));
}

#[test]
fn renamed_qualified_import() {
    let state = run(":math :as:shmath import 4 2 :%make shmath !");
    assert!(state.stack().peek().unwrap().loose_eq(&Value::vec(vec![Value::Int(2), Value::Int(1)])));
}

#[test]
fn prefixed_import_binds_dotted_names() {
    let state = run(":math :prefix import 4 2 math.%make");
    assert!(state.stack().peek().unwrap().loose_eq(&Value::vec(vec![Value::Int(2), Value::Int(1)])));
}

#[test]
fn custom_prefixed_import() {
    let state = run(":math :prefix:shmath import 4 2 shmath.%make");
    assert!(state.stack().peek().unwrap().loose_eq(&Value::vec(vec![Value::Int(2), Value::Int(1)])));
}

#[test]
fn unknown_modules_fail_to_import() {
    let err = run_source(":nope :all import").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ImportError);
}

#[test]
fn unknown_members_fail_to_import() {
    let err = run_source(":math (definitely-not-there) import").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ImportError);
}

#[test]
fn invalid_import_options_fail() {
    let err = run_source(":math 42 import").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ImportError);
}

#[test]
fn fraction_arithmetic_through_the_math_module() {
    let state = run(":math :all import  160 15 %make  4 10 %make  %+");
    assert!(state.stack().peek().unwrap().loose_eq(&Value::vec(vec![Value::Int(166), Value::Int(15)])));
}

#[test]
fn comparisons_produce_boolean_atoms() {
    assert!(top_is_true(&run(":math (<) import 1 2 <")));
    assert!(top_is_true(&run(":math (>=) import 2 2 >=")));
}

#[test]
fn division_by_zero_is_an_arithmetic_error() {
    let err = run_source(":math (/) import 1 0 /").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArithmeticError);
}

#[test]
fn a_source_defined_module_exports_its_bindings() {
    // foldr over the list (1 (2 (3 ()))), folding with + from 0
    let state = run(
        ":math ( + ) import
         :recursion (foldr) import
         0 { + } (1 (2 (3 ()))) foldr",
    );
    assert_eq!(int_stack(&state), vec![6]);
}

#[test]
fn string_module_transforms_and_predicates() {
    let state = run(":strings (->upper) import \"abc\" ->upper");
    match state.stack().peek() {
        Some(Value::Str(s)) => assert_eq!(&**s, "ABC"),
        other => panic!("expected a string, got {other:?}"),
    }
    assert!(top_is_true(&run(":strings (digit?) import \"123\" digit?")));
}

#[test]
fn foreach_str_visits_every_character() {
    // drop each character; the function must be stack-neutral
    let state = run(":strings (foreach-str) import 1 \"abc\" { drop } foreach-str");
    assert_eq!(int_stack(&state), vec![1]);
}

// ---------------------------------------------------------------------
// concurrency
// ---------------------------------------------------------------------

#[test]
fn run_concurrently_returns_stacks_in_positional_order() {
    let state = run(
        ":threading (run-concurrently) import
         ( {dup} {drop} )
         ( (5 ()) (7 (8 ())) )
         run-concurrently",
    );
    // thread 0: [5] dup -> [5 5]; thread 1: [7 8] drop -> [7]
    let expected = Value::vec(vec![
        Value::vec(vec![
            Value::Int(5),
            Value::vec(vec![Value::Int(5), Value::vec(vec![])]),
        ]),
        Value::vec(vec![Value::Int(7), Value::vec(vec![])]),
    ]);
    assert!(state.stack().peek().unwrap().loose_eq(&expected));
}

#[test]
fn run_concurrently_requires_matching_lengths() {
    let err = run_source(":threading (run-concurrently) import ( {dup} ) ( ) run-concurrently").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

// ---------------------------------------------------------------------
// middleware and output capture
// ---------------------------------------------------------------------

#[test]
fn middleware_observes_every_instruction_in_order() {
    let mut middleware = RecordingMiddleware::new();
    run_source_with_middleware("1 2 swap", &mut middleware).unwrap();
    let events = middleware.events();
    assert!(!events.is_empty());
    // the two pushes come first, and depths never jump by more than a call
    assert_eq!(events[0].op, "put");
    assert_eq!(events[0].depth_after, 1);
    assert_eq!(events[1].op, "put");
    assert_eq!(events[1].depth_after, 2);
    assert_eq!(events.last().unwrap().depth_after, 2);
}

#[test]
fn println_writes_through_the_installed_writer() {
    let collector = CollectStringPrint::new();
    {
        let _guard = install_writer(Box::new(collector.clone()));
        run("\"Answer:\" println 42 println");
    }
    assert_eq!(collector.output(), "Answer:\n42\n");
}

// ---------------------------------------------------------------------
// REPL sessions
// ---------------------------------------------------------------------

#[test]
fn repl_bindings_persist_across_lines() {
    let mut session = ReplSession::new();
    session.execute("5 :x def").unwrap();
    session.execute("x").unwrap();
    assert_eq!(int_stack(session.state()), vec![5]);
}

#[test]
fn repl_reports_incomplete_input_on_open_blocks() {
    let mut session = ReplSession::new();
    match session.execute("{ 1 2") {
        Err(ReplError::Incomplete) => {}
        other => panic!("expected Incomplete, got {other:?}"),
    }
    session.execute("{ 1 2 } !").unwrap();
    assert_eq!(int_stack(session.state()), vec![1, 2]);
}

#[test]
fn repl_failures_keep_the_last_committed_state() {
    let mut session = ReplSession::new();
    session.execute("1 :y def").unwrap();
    match session.execute("y no-such-name") {
        Err(ReplError::Run(err)) => assert_eq!(err.kind, ErrorKind::NameError),
        other => panic!("expected a runtime failure, got {other:?}"),
    }
    // the failed line's partial work is gone; y is still bound
    session.execute("y").unwrap();
    assert_eq!(int_stack(session.state()), vec![1]);
}

#[test]
fn repl_closures_survive_across_lines() {
    let mut session = ReplSession::new();
    session.execute(":math ( + ) import").unwrap();
    session.execute("{ :x def { x + } } :make-adder jar").unwrap();
    session.execute("5 make-adder :add5 jar").unwrap();
    session.execute("37 add5").unwrap();
    assert_eq!(int_stack(session.state()), vec![42]);
    session.execute("drop 40 add5").unwrap();
    assert_eq!(int_stack(session.state()), vec![45]);
}
