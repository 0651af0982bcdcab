//! The tree-walking evaluator: `eval(expr, env, depth)` dispatches
//! atoms, applies subroutines and closures, and interprets the standard
//! special forms. Tail positions (`if`, `cond`, `begin`, `and`, `or`,
//! and a procedure call's body) are implemented as a trampoline — the
//! loop rewrites `expr`/`env` and re-dispatches rather than recursing —
//! so a long chain of these does not grow the host stack. Other calls
//! (argument evaluation, a test expression, the callee position)
//! recurse normally and are bounded by `depth`.
//!
//! No `let`, `defmacro`, or quasiquote: the special-form table is
//! deliberately small, with `flambda` covering unevaluated-argument
//! macros instead of a separate macro system.

use crate::cell::{Cell, CellKind};
use crate::env::{self, ScopeMode};
use crate::error::{LispError, LispResult};
use crate::interp::Interpreter;
use crate::registry::validate;
use std::sync::atomic::Ordering;

/// Interpreter-wide trace level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceLevel {
    Off,
    Marked,
    All,
}

/// Entry point. `depth` is the caller's recursion depth; callers
/// starting a fresh top-level evaluation pass `0` (see
/// `Interpreter::eval_top`).
pub fn eval(interp: &mut Interpreter, expr: Cell, env: Cell, depth: usize) -> LispResult<Cell> {
    // Two pinned slots this call owns for the lifetime of the trampoline
    // loop, protecting the in-flight expr/env from a mark-and-sweep
    // triggered while evaluating a subform. Always truncated back to
    // `base` before returning.
    let base = interp.pin_stack.len();
    interp.pin_stack.push(expr);
    interp.pin_stack.push(env);

    let result = eval_loop(interp, expr, env, depth, base);
    interp.pin_stack.truncate(base);
    result
}

fn eval_loop(
    interp: &mut Interpreter,
    mut expr: Cell,
    mut env: Cell,
    mut depth: usize,
    base: usize,
) -> LispResult<Cell> {
    loop {
        if depth > interp.config.max_depth {
            return Err(LispError::DepthExceeded(interp.config.max_depth));
        }
        if interp.sig.swap(false, Ordering::Relaxed) {
            return Err(LispError::Signal);
        }
        interp.maybe_collect();
        interp.pin_stack[base] = expr;
        interp.pin_stack[base + 1] = env;

        trace_step(interp, expr);

        match interp.gc.kind(expr).clone() {
            CellKind::Nil
            | CellKind::Tee
            | CellKind::Integer(_)
            | CellKind::Float(_)
            | CellKind::Str(_)
            | CellKind::Subr(_)
            | CellKind::Proc(_)
            | CellKind::FProc(_)
            | CellKind::Hash(_)
            | CellKind::IoPort(_)
            | CellKind::UserDefined(..) => return Ok(expr),

            CellKind::Symbol(_) => return env::lookup(&interp.gc, env, expr),

            CellKind::Cons(_) => {
                let head = interp.gc.car(expr)?;
                let rest = interp.gc.cdr(expr)?;

                if head == interp.sym_quote {
                    let args = interp.gc.list_to_vec(rest)?;
                    if args.len() != 1 {
                        return Err(LispError::arity_error("quote", "1", args.len()));
                    }
                    return Ok(args[0]);
                }
                if head == interp.sym_if {
                    let args = interp.gc.list_to_vec(rest)?;
                    if args.len() < 2 || args.len() > 3 {
                        return Err(LispError::arity_error("if", "2 or 3", args.len()));
                    }
                    let test = eval(interp, args[0], env, depth + 1)?;
                    if !interp.gc.is_nil(test) {
                        expr = args[1];
                    } else if args.len() == 3 {
                        expr = args[2];
                    } else {
                        return Ok(interp.gc.nil);
                    }
                    continue;
                }
                if head == interp.sym_begin {
                    let forms = interp.gc.list_to_vec(rest)?;
                    match run_body_tail(interp, &forms, env, depth)? {
                        TailOutcome::Value(v) => return Ok(v),
                        TailOutcome::Tail(next_expr) => {
                            expr = next_expr;
                            continue;
                        }
                    }
                }
                if head == interp.sym_lambda || head == interp.sym_flambda {
                    let params = interp.gc.car(rest)?;
                    let body = interp.gc.cdr(rest)?;
                    let is_fexpr = head == interp.sym_flambda;
                    return Ok(interp.make_procedure(params, body, env, is_fexpr));
                }
                if head == interp.sym_define {
                    let args = interp.gc.list_to_vec(rest)?;
                    if args.len() != 2 {
                        return Err(LispError::arity_error("define", "2", args.len()));
                    }
                    if !matches!(interp.gc.kind(args[0]), CellKind::Symbol(_)) {
                        return Err(LispError::type_error(
                            "define",
                            "symbol",
                            interp.gc.type_name(args[0]),
                            0,
                        ));
                    }
                    let value = eval(interp, args[1], env, depth + 1)?;
                    env::define(&mut interp.gc, env, args[0], value)?;
                    return Ok(value);
                }
                if head == interp.sym_set {
                    let args = interp.gc.list_to_vec(rest)?;
                    if args.len() != 2 {
                        return Err(LispError::arity_error("set!", "2", args.len()));
                    }
                    let value = eval(interp, args[1], env, depth + 1)?;
                    env::set_bang(&mut interp.gc, env, args[0], value)?;
                    return Ok(value);
                }
                if head == interp.sym_cond {
                    let clauses = interp.gc.list_to_vec(rest)?;
                    let mut matched = None;
                    for clause in clauses {
                        let parts = interp.gc.list_to_vec(clause)?;
                        if parts.is_empty() {
                            return Err(LispError::runtime_error("cond", "empty clause"));
                        }
                        let test = eval(interp, parts[0], env, depth + 1)?;
                        if !interp.gc.is_nil(test) {
                            if parts.len() == 1 {
                                // A body-less arm returns the evaluated test value.
                                matched = Some(TailOutcome::Value(test));
                            } else {
                                matched = Some(run_body_tail(interp, &parts[1..], env, depth)?);
                            }
                            break;
                        }
                    }
                    match matched {
                        None => return Ok(interp.gc.nil),
                        Some(TailOutcome::Value(v)) => return Ok(v),
                        Some(TailOutcome::Tail(next_expr)) => {
                            expr = next_expr;
                            continue;
                        }
                    }
                }
                if head == interp.sym_and {
                    let forms = interp.gc.list_to_vec(rest)?;
                    if forms.is_empty() {
                        return Ok(interp.gc.tee);
                    }
                    for f in &forms[..forms.len() - 1] {
                        let v = eval(interp, *f, env, depth + 1)?;
                        if interp.gc.is_nil(v) {
                            return Ok(interp.gc.nil);
                        }
                    }
                    expr = forms[forms.len() - 1];
                    continue;
                }
                if head == interp.sym_or {
                    let forms = interp.gc.list_to_vec(rest)?;
                    if forms.is_empty() {
                        return Ok(interp.gc.nil);
                    }
                    for f in &forms[..forms.len() - 1] {
                        let v = eval(interp, *f, env, depth + 1)?;
                        if !interp.gc.is_nil(v) {
                            return Ok(v);
                        }
                    }
                    expr = forms[forms.len() - 1];
                    continue;
                }

                // Ordinary application: evaluate the head to a callable.
                let callee = eval(interp, head, env, depth + 1)?;
                interp.pin_stack.push(callee);

                match interp.gc.kind(callee).clone() {
                    CellKind::Subr(id) => {
                        let arg_exprs = interp.gc.list_to_vec(rest)?;
                        let mut args = Vec::with_capacity(arg_exprs.len());
                        for a in arg_exprs {
                            let v = eval(interp, a, env, depth + 1)?;
                            interp.pin_stack.push(v);
                            args.push(v);
                        }
                        let entry = interp.registry.entry(id);
                        if let Some(fmt) = entry.validation.clone() {
                            validate(&entry.name.clone(), &fmt, &interp.gc, &args)?;
                        }
                        let func = entry.func;
                        let result = func(interp, &args)?;
                        interp.pin_stack.truncate(base + 2);
                        return Ok(result);
                    }
                    CellKind::Proc(proc) => {
                        let arg_exprs = interp.gc.list_to_vec(rest)?;
                        let mut args = Vec::with_capacity(arg_exprs.len());
                        for a in arg_exprs {
                            let v = eval(interp, a, env, depth + 1)?;
                            interp.pin_stack.push(v);
                            args.push(v);
                        }
                        let frame = env::new_call_frame(
                            &mut interp.gc,
                            interp.config.scope_mode,
                            proc.env,
                            env,
                        );
                        interp.pin_stack.push(frame);
                        env::bind_params(&mut interp.gc, frame, proc.params, &args)?;
                        let body = interp.gc.list_to_vec(proc.body)?;
                        match run_body_tail(interp, &body, frame, depth)? {
                            TailOutcome::Value(v) => {
                                interp.pin_stack.truncate(base + 2);
                                return Ok(v);
                            }
                            TailOutcome::Tail(next_expr) => {
                                interp.pin_stack.truncate(base + 2);
                                expr = next_expr;
                                env = frame;
                                continue;
                            }
                        }
                    }
                    CellKind::FProc(proc) => {
                        let raw_args = interp.gc.list_to_vec(rest)?;
                        let frame = env::new_call_frame(
                            &mut interp.gc,
                            interp.config.scope_mode,
                            proc.env,
                            env,
                        );
                        interp.pin_stack.push(frame);
                        env::bind_params(&mut interp.gc, frame, proc.params, &raw_args)?;
                        let body = interp.gc.list_to_vec(proc.body)?;
                        match run_body_tail(interp, &body, frame, depth)? {
                            TailOutcome::Value(v) => {
                                interp.pin_stack.truncate(base + 2);
                                return Ok(v);
                            }
                            TailOutcome::Tail(next_expr) => {
                                interp.pin_stack.truncate(base + 2);
                                expr = next_expr;
                                env = frame;
                                continue;
                            }
                        }
                    }
                    _ => {
                        let text = interp.print_to_string(callee, false, false);
                        return Err(LispError::NotCallable(text));
                    }
                }
            }
        }
    }
}

enum TailOutcome {
    Value(Cell),
    Tail(Cell),
}

/// Evaluates every form but the last, returning the last form to the
/// caller for tail-position re-dispatch. An empty body evaluates to
/// nil, matching `(begin)` and a procedure with no body forms.
fn run_body_tail(
    interp: &mut Interpreter,
    forms: &[Cell],
    env: Cell,
    depth: usize,
) -> LispResult<TailOutcome> {
    if forms.is_empty() {
        return Ok(TailOutcome::Value(interp.gc.nil));
    }
    for f in &forms[..forms.len() - 1] {
        eval(interp, *f, env, depth + 1)?;
    }
    Ok(TailOutcome::Tail(forms[forms.len() - 1]))
}

fn trace_step(interp: &mut Interpreter, expr: Cell) {
    if interp.trace_level == TraceLevel::Off {
        return;
    }
    let is_cons = interp.gc.is_cons(expr);
    let marked = interp.gc.get(expr).header.trace;
    let should_trace = match interp.trace_level {
        TraceLevel::Off => false,
        TraceLevel::All => is_cons,
        TraceLevel::Marked => marked,
    };
    if !should_trace {
        return;
    }
    let text = interp.print_to_string(expr, false, false);
    let log_id = interp.log_port_id();
    if let Ok(port) = interp.port_mut(log_id) {
        let _ = port.write_str(&format!("; trace: {}\n", text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;

    fn interp() -> Interpreter {
        let mut i = Interpreter::new();
        register_builtins(&mut i);
        i
    }

    #[test]
    fn literals_are_self_evaluating() {
        let mut i = interp();
        let v = i.eval_string("42").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(42)));
    }

    #[test]
    fn if_picks_consequent() {
        let mut i = interp();
        let v = i.eval_string("(if (< 1 2) 'yes 'no)").unwrap();
        assert_eq!(i.gc.symbol_name(v).unwrap().as_ref(), "yes");
    }

    #[test]
    fn if_without_else_is_nil() {
        let mut i = interp();
        let v = i.eval_string("(if nil 1)").unwrap();
        assert!(i.gc.is_nil(v));
    }

    #[test]
    fn lambda_application() {
        let mut i = interp();
        let v = i.eval_string("((lambda (x y) (+ x y)) 3 4)").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(7)));
    }

    #[test]
    fn recursive_factorial() {
        let mut i = interp();
        i.eval_string(
            "(define f (lambda (n) (if (= n 0) 1 (* n (f (- n 1))))))",
        )
        .unwrap();
        let v = i.eval_string("(f 5)").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(120)));
    }

    #[test]
    fn cond_first_match_wins() {
        let mut i = interp();
        let v = i.eval_string("(cond (nil 1) (t 2) (t 3))").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(2)));
    }

    #[test]
    fn cond_bodyless_arm_returns_test_value() {
        let mut i = interp();
        let v = i.eval_string("(cond (42))").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(42)));
    }

    #[test]
    fn and_or_short_circuit() {
        let mut i = interp();
        let v = i.eval_string("(and 1 2 nil 3)").unwrap();
        assert!(i.gc.is_nil(v));
        let v = i.eval_string("(or nil nil 5 (error-divide-by-zero))").unwrap_or_else(|_| i.gc.nil);
        assert!(matches!(i.gc.kind(v), CellKind::Integer(5)));
    }

    #[test]
    fn deep_tail_if_chain_does_not_overflow_stack() {
        // Built directly as cons cells (not read from source text) since
        // the reader's own nesting cap is independent of the evaluator's
        // tail-position handling under test here.
        let mut i = interp();
        let t = i.interner.intern(&mut i.gc, "t");
        let if_sym = i.sym_if;
        let mut inner = i.gc.integer(0);
        for _ in 0..10_000 {
            let zero = i.gc.integer(0);
            inner = i.gc.list_from(&[if_sym, t, inner, zero]);
        }
        let v = eval(&mut i, inner, i.top_env, 0).unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(0)));
    }

    #[test]
    fn flambda_receives_unevaluated_args() {
        let mut i = interp();
        i.eval_string("(define f (flambda (a) (car a)))").unwrap();
        let v = i.eval_string("(f (+ 1 2))").unwrap();
        let head = i.gc.symbol_name(v);
        assert_eq!(head.unwrap().as_ref(), "+");
    }

    #[test]
    fn unbound_symbol_is_an_error() {
        let mut i = interp();
        assert!(i.eval_string("undefined-thing").is_err());
    }

    #[test]
    fn set_bang_on_unbound_is_an_error() {
        let mut i = interp();
        assert!(i.eval_string("(set! undefined-thing 1)").is_err());
    }

    #[test]
    fn overflow_depth_is_an_error() {
        let mut i = interp();
        i.config.max_depth = 8;
        assert!(i.eval_string("(+ 1 (+ 1 (+ 1 (+ 1 (+ 1 (+ 1 (+ 1 (+ 1 1))))))))").is_err());
    }
}
