//! Environment frames: a cons cell whose car is an association list of
//! `(symbol . value)` pairs and whose cdr is the parent frame. `nil`
//! terminates the parent chain.
//!
//! Frames live on the GC-managed heap rather than in an `Rc`-chained
//! `HashMap`: a closure captures a frame cell, and `eq?`/mutation on
//! that frame must see the same heap identity the GC roots and sweeps.

use crate::cell::{Cell, CellKind};
use crate::error::{LispError, LispResult};
use crate::gc::Gc;

/// Whether a new call frame's parent is the closure's captured
/// environment (lexical, the default) or the caller's current
/// environment (dynamic).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    Lexical,
    Dynamic,
}

impl Default for ScopeMode {
    fn default() -> Self {
        ScopeMode::Lexical
    }
}

/// Allocates a new frame: `(nil . parent)`. The frame's alist starts
/// empty and grows via `define`.
pub fn new_frame(gc: &mut Gc, parent: Cell) -> Cell {
    gc.cons(gc.nil, parent)
}

/// Scans a single frame's alist head-to-tail for `sym`, returning the
/// pair cell `(sym . value)` if bound in *this* frame only.
fn find_pair_in_frame(gc: &Gc, frame: Cell, sym: Cell) -> LispResult<Option<Cell>> {
    let mut alist = gc.car(frame)?;
    while !gc.is_nil(alist) {
        let pair = gc.car(alist)?;
        if gc.car(pair)? == sym {
            return Ok(Some(pair));
        }
        alist = gc.cdr(alist)?;
    }
    Ok(None)
}

/// `lookup(sym, env)`: scans frame pairs head-to-tail, then recurses
/// into the parent.
pub fn lookup(gc: &Gc, mut env: Cell, sym: Cell) -> LispResult<Cell> {
    loop {
        if gc.is_nil(env) {
            let name = gc.symbol_name(sym).map(|s| s.to_string()).unwrap_or_default();
            return Err(LispError::unbound(name));
        }
        if let Some(pair) = find_pair_in_frame(gc, env, sym)? {
            return gc.cdr(pair);
        }
        env = gc.cdr(env)?;
    }
}

/// `define(sym, val)`: mutates the topmost frame, overwriting an
/// existing binding in that frame or prepending a new pair.
pub fn define(gc: &mut Gc, env: Cell, sym: Cell, value: Cell) -> LispResult<()> {
    if let Some(pair) = find_pair_in_frame(gc, env, sym)? {
        gc.set_cdr(pair, value)?;
        return Ok(());
    }
    let pair = gc.cons(sym, value);
    let alist = gc.car(env)?;
    let new_alist = gc.cons(pair, alist);
    gc.set_car(env, new_alist)?;
    Ok(())
}

/// `set!(sym, val)`: finds the binding walking outward through parent
/// frames and updates it in place; errors (Unbound) if absent anywhere.
pub fn set_bang(gc: &mut Gc, mut env: Cell, sym: Cell, value: Cell) -> LispResult<()> {
    loop {
        if gc.is_nil(env) {
            let name = gc.symbol_name(sym).map(|s| s.to_string()).unwrap_or_default();
            return Err(LispError::unbound(name));
        }
        if let Some(pair) = find_pair_in_frame(gc, env, sym)? {
            gc.set_cdr(pair, value)?;
            return Ok(());
        }
        env = gc.cdr(env)?;
    }
}

/// Builds the new call frame for an application, per the active
/// `ScopeMode`: lexical parents on the closure's captured env, dynamic
/// parents on the caller's current env.
pub fn new_call_frame(gc: &mut Gc, mode: ScopeMode, closure_env: Cell, caller_env: Cell) -> Cell {
    let parent = match mode {
        ScopeMode::Lexical => closure_env,
        ScopeMode::Dynamic => caller_env,
    };
    new_frame(gc, parent)
}

/// Zips a parameter spec (a symbol for a variadic binding, or a list of
/// symbols, possibly improper for `(a b . rest)`-style variadics) against
/// already-evaluated (or, for f-procedures, raw) argument cells and
/// `define`s each in `frame`.
pub fn bind_params(gc: &mut Gc, frame: Cell, params: Cell, args: &[Cell]) -> LispResult<()> {
    // A bare symbol parameter binds the whole argument list.
    if matches!(gc.kind(params), CellKind::Symbol(_)) {
        let rest = gc.list_from(args);
        define(gc, frame, params, rest)?;
        return Ok(());
    }

    let mut p = params;
    let mut i = 0usize;
    loop {
        if gc.is_nil(p) {
            if i != args.len() {
                return Err(LispError::arity_error(
                    "lambda",
                    format!("{}", i),
                    args.len(),
                ));
            }
            return Ok(());
        }
        if matches!(gc.kind(p), CellKind::Symbol(_)) {
            // Improper tail: remaining params symbol binds the rest.
            let rest = gc.list_from(&args[i..]);
            define(gc, frame, p, rest)?;
            return Ok(());
        }
        let sym = gc.car(p)?;
        if i >= args.len() {
            return Err(LispError::arity_error(
                "lambda",
                format!("at least {}", i + 1),
                args.len(),
            ));
        }
        define(gc, frame, sym, args[i])?;
        i += 1;
        p = gc.cdr(p)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Interner;

    fn setup() -> (Gc, Interner, Cell) {
        let mut gc = Gc::new();
        let interner = Interner::new();
        let top = new_frame(&mut gc, gc.nil);
        (gc, interner, top)
    }

    #[test]
    fn define_then_lookup() {
        let (mut gc, mut interner, top) = setup();
        let x = interner.intern(&mut gc, "x");
        let val = gc.integer(42);
        define(&mut gc, top, x, val).unwrap();
        assert_eq!(lookup(&gc, top, x).unwrap(), val);
    }

    #[test]
    fn lookup_unbound_errors() {
        let (mut gc, mut interner, top) = setup();
        let x = interner.intern(&mut gc, "x");
        assert!(lookup(&gc, top, x).is_err());
    }

    #[test]
    fn child_sees_parent_binding() {
        let (mut gc, mut interner, top) = setup();
        let x = interner.intern(&mut gc, "x");
        let val = gc.integer(1);
        define(&mut gc, top, x, val).unwrap();
        let child = new_frame(&mut gc, top);
        assert_eq!(lookup(&gc, child, x).unwrap(), val);
    }

    #[test]
    fn child_define_does_not_leak_to_parent() {
        let (mut gc, mut interner, top) = setup();
        let x = interner.intern(&mut gc, "x");
        let child = new_frame(&mut gc, top);
        let val = gc.integer(1);
        define(&mut gc, child, x, val).unwrap();
        assert!(lookup(&gc, top, x).is_err());
        assert_eq!(lookup(&gc, child, x).unwrap(), val);
    }

    #[test]
    fn set_bang_updates_in_place_through_parent() {
        let (mut gc, mut interner, top) = setup();
        let x = interner.intern(&mut gc, "x");
        let v1 = gc.integer(1);
        define(&mut gc, top, x, v1).unwrap();
        let child = new_frame(&mut gc, top);
        let v2 = gc.integer(2);
        set_bang(&mut gc, child, x, v2).unwrap();
        assert_eq!(lookup(&gc, top, x).unwrap(), v2);
    }

    #[test]
    fn set_bang_unbound_errors() {
        let (mut gc, mut interner, top) = setup();
        let x = interner.intern(&mut gc, "x");
        let v = gc.integer(1);
        assert!(set_bang(&mut gc, top, x, v).is_err());
    }

    #[test]
    fn dynamic_scope_parents_on_caller_env() {
        let (mut gc, _interner, top) = setup();
        let closure_env = new_frame(&mut gc, top);
        let caller_env = new_frame(&mut gc, top);
        let frame = new_call_frame(&mut gc, ScopeMode::Dynamic, closure_env, caller_env);
        assert_eq!(gc.cdr(frame).unwrap(), caller_env);
        let frame2 = new_call_frame(&mut gc, ScopeMode::Lexical, closure_env, caller_env);
        assert_eq!(gc.cdr(frame2).unwrap(), closure_env);
    }
}
