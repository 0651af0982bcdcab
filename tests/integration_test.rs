//! End-to-end scenarios from the specification's testable-properties
//! section: the worked examples (§8 "Concrete scenarios") and the
//! negative scenarios that must raise their listed error kind without
//! taking down the interpreter.

use liblisp::builtins::register_builtins;
use liblisp::cell::CellKind;
use liblisp::interp::Interpreter;

fn interp() -> Interpreter {
    let mut i = Interpreter::new();
    register_builtins(&mut i);
    i
}

#[test]
fn scenario_addition() {
    let mut i = interp();
    let v = i.eval_string("(+ 2 3)").unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(5)));
}

#[test]
fn scenario_define_then_double() {
    let mut i = interp();
    let defined = i.eval_string("(define x 10)").unwrap();
    assert!(matches!(i.gc.kind(defined), CellKind::Integer(10)));
    let v = i.eval_string("(+ x x)").unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(20)));
}

#[test]
fn scenario_if_picks_yes_branch() {
    let mut i = interp();
    let v = i.eval_string("(if (< 1 2) 'yes 'no)").unwrap();
    assert_eq!(i.gc.symbol_name(v).unwrap().as_ref(), "yes");
}

#[test]
fn scenario_lambda_application() {
    let mut i = interp();
    let v = i.eval_string("((lambda (x y) (+ x y)) 3 4)").unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(7)));
}

#[test]
fn scenario_recursive_factorial_of_five() {
    let mut i = interp();
    i.eval_string("(define f (lambda (n) (if (= n 0) 1 (* n (f (- n 1))))))")
        .unwrap();
    let v = i.eval_string("(f 5)").unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(120)));
}

#[test]
fn scenario_car_and_cdr_of_cons() {
    let mut i = interp();
    let v = i.eval_string("(car (cons 1 2))").unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(1)));
    let v = i.eval_string("(cdr (cons 1 2))").unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(2)));
}

#[test]
fn negative_add_on_string_is_type_error() {
    let mut i = interp();
    assert!(i.eval_string(r#"(+ 1 "a")"#).is_err());
}

#[test]
fn negative_car_of_nil_is_type_error() {
    let mut i = interp();
    assert!(i.eval_string("(car nil)").is_err());
}

#[test]
fn negative_set_on_undefined_is_unbound_error() {
    let mut i = interp();
    let err = i.eval_string("(set! undefined 1)").unwrap_err();
    assert!(matches!(err, liblisp::error::LispError::UnboundSymbol(_)));
}

#[test]
fn negative_division_by_zero_is_domain_error() {
    let mut i = interp();
    assert!(i.eval_string("(/ 1 0)").is_err());
}

#[test]
fn negative_unterminated_string_is_syntax_error() {
    let mut i = interp();
    assert!(i.eval_string("\"unterminated").is_err());
}

#[test]
fn repl_recovers_after_an_error() {
    // A recoverable error must not poison later evaluations in the same
    // interpreter instance (spec.md §8 "Recovery").
    let mut i = interp();
    assert!(i.eval_string("(car nil)").is_err());
    let v = i.eval_string("(+ 1 1)").unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(2)));
}

#[test]
fn quote_is_identity_for_literals() {
    let mut i = interp();
    let v = i.eval_string("(quote 42)").unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(42)));
    let v = i.eval_string("'(1 2 3)").unwrap();
    assert_eq!(i.gc.list_to_vec(v).unwrap().len(), 3);
}

#[test]
fn length_of_n_element_list_is_n() {
    let mut i = interp();
    let v = i.eval_string("(length (list 1 2 3 4 5))").unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(5)));
}

#[test]
fn read_eval_print_round_trip_through_string_ports() {
    let mut i = interp();
    i.eval_string(r#"(define in (open-input-string "(+ 1 2)"))"#)
        .unwrap();
    i.eval_string("(define form (read in))").unwrap();
    let v = i.eval_string("(eval form)").unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(3)));
}

#[test]
fn deeply_nested_tail_if_chain_does_not_blow_the_host_stack() {
    let mut i = interp();
    let src = "(if t 1 0)".repeat(1); // sanity: trivial chain evaluates
    let v = i.eval_string(&src).unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(1)));

    // A long chain built directly as cons cells, bypassing the reader's
    // own nesting cap, exercises the evaluator's trampoline.
    let t = i.interner.intern(&mut i.gc, "t");
    let if_sym = i.sym_if;
    let mut inner = i.gc.integer(7);
    for _ in 0..10_000 {
        let zero = i.gc.integer(0);
        inner = i.gc.list_from(&[if_sym, t, inner, zero]);
    }
    let v = liblisp::eval::eval(&mut i, inner, i.top_env, 0).unwrap();
    assert!(matches!(i.gc.kind(v), CellKind::Integer(7)));
}
