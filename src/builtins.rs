//! A minimal, representative primitive set so the engine is self-testable:
//! arithmetic, comparison, cons/car/cdr, `eq?`, plus `eval`/`read`/`print`
//! and a thin slice of each non-special-form component (hash tables, I/O
//! ports, the GC/trace knobs) so every heap-level module has at least one
//! Lisp-callable entry point. `define`/`set!`/`if`/`lambda`/`quote` are
//! special forms handled directly by `eval.rs`.

use crate::cell::{Cell, CellKind};
use crate::env::ScopeMode;
use crate::error::{LispError, LispResult};
use crate::eval::TraceLevel;
use crate::gc::Gc;
use crate::hash::HashTable;
use crate::interp::Interpreter;
use crate::io::Port;

// ---- numeric helpers -------------------------------------------------

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_float(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn into_cell(self, gc: &mut Gc) -> Cell {
        match self {
            Num::Int(i) => gc.integer(i),
            Num::Float(f) => gc.float(f),
        }
    }
}

fn as_num(gc: &Gc, fname: &str, position: usize, c: Cell) -> LispResult<Num> {
    match gc.kind(c) {
        CellKind::Integer(i) => Ok(Num::Int(*i)),
        CellKind::Float(f) => Ok(Num::Float(*f)),
        _ => Err(LispError::type_error(fname, "integer-or-float", gc.type_name(c), position)),
    }
}

/// Both operands integers → integer result; any float → float result.
fn numeric_op(
    a: Num,
    b: Num,
    int_op: impl Fn(i64, i64) -> LispResult<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> LispResult<Num> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Ok(Num::Int(int_op(x, y)?)),
        _ => Ok(Num::Float(float_op(a.as_float(), b.as_float()))),
    }
}

// ---- arithmetic --------------------------------------------------------

fn builtin_add(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let mut acc = Num::Int(0);
    for (i, &a) in args.iter().enumerate() {
        let n = as_num(&interp.gc, "+", i, a)?;
        acc = numeric_op(acc, n, |x, y| Ok(x.wrapping_add(y)), |x, y| x + y)?;
    }
    Ok(acc.into_cell(&mut interp.gc))
}

fn builtin_sub(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    if args.is_empty() {
        return Err(LispError::arity_error("-", "at least 1", 0));
    }
    let first = as_num(&interp.gc, "-", 0, args[0])?;
    if args.len() == 1 {
        let negated = match first {
            Num::Int(i) => Num::Int(i.wrapping_neg()),
            Num::Float(f) => Num::Float(-f),
        };
        return Ok(negated.into_cell(&mut interp.gc));
    }
    let mut acc = first;
    for (i, &a) in args[1..].iter().enumerate() {
        let n = as_num(&interp.gc, "-", i + 1, a)?;
        acc = numeric_op(acc, n, |x, y| Ok(x.wrapping_sub(y)), |x, y| x - y)?;
    }
    Ok(acc.into_cell(&mut interp.gc))
}

fn builtin_mul(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let mut acc = Num::Int(1);
    for (i, &a) in args.iter().enumerate() {
        let n = as_num(&interp.gc, "*", i, a)?;
        acc = numeric_op(acc, n, |x, y| Ok(x.wrapping_mul(y)), |x, y| x * y)?;
    }
    Ok(acc.into_cell(&mut interp.gc))
}

fn builtin_div(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    if args.is_empty() {
        return Err(LispError::arity_error("/", "at least 1", 0));
    }
    let first = as_num(&interp.gc, "/", 0, args[0])?;
    if args.len() == 1 {
        return checked_div(Num::Int(1), first).map(|n| n.into_cell(&mut interp.gc));
    }
    let mut acc = first;
    for (i, &a) in args[1..].iter().enumerate() {
        let n = as_num(&interp.gc, "/", i + 1, a)?;
        acc = checked_div(acc, n)?;
    }
    Ok(acc.into_cell(&mut interp.gc))
}

/// Domain errors: division by zero, and `i64::MIN / -1` integer overflow.
fn checked_div(a: Num, b: Num) -> LispResult<Num> {
    match (a, b) {
        (Num::Int(_), Num::Int(0)) => Err(LispError::runtime_error("/", "division by zero")),
        (Num::Int(x), Num::Int(y)) => {
            if x == i64::MIN && y == -1 {
                return Err(LispError::runtime_error("/", "integer overflow"));
            }
            Ok(Num::Int(x / y))
        }
        _ => {
            let divisor = b.as_float();
            if divisor == 0.0 {
                return Err(LispError::runtime_error("/", "division by zero"));
            }
            Ok(Num::Float(a.as_float() / divisor))
        }
    }
}

fn builtin_mod(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    if args.len() != 2 {
        return Err(LispError::arity_error("%", "2", args.len()));
    }
    let a = as_num(&interp.gc, "%", 0, args[0])?;
    let b = as_num(&interp.gc, "%", 1, args[1])?;
    match (a, b) {
        (Num::Int(_), Num::Int(0)) => Err(LispError::runtime_error("%", "division by zero")),
        (Num::Int(x), Num::Int(y)) => Ok(interp.gc.integer(x % y)),
        _ => {
            let y = b.as_float();
            if y == 0.0 {
                return Err(LispError::runtime_error("%", "division by zero"));
            }
            Ok(interp.gc.float(a.as_float() % y))
        }
    }
}

// ---- comparison ---------------------------------------------------------

fn numeric_chain(
    interp: &Interpreter,
    name: &str,
    args: &[Cell],
    cmp: impl Fn(f64, f64) -> bool,
) -> LispResult<bool> {
    if args.len() < 2 {
        return Err(LispError::arity_error(name, "at least 2", args.len()));
    }
    let mut prev = as_num(&interp.gc, name, 0, args[0])?.as_float();
    for (i, &a) in args[1..].iter().enumerate() {
        let cur = as_num(&interp.gc, name, i + 1, a)?.as_float();
        if !cmp(prev, cur) {
            return Ok(false);
        }
        prev = cur;
    }
    Ok(true)
}

fn bool_cell(interp: &mut Interpreter, b: bool) -> Cell {
    if b {
        interp.gc.tee
    } else {
        interp.gc.nil
    }
}

fn builtin_numeric_eq(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let r = numeric_chain(interp, "=", args, |a, b| a == b)?;
    Ok(bool_cell(interp, r))
}

fn builtin_lt(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let r = numeric_chain(interp, "<", args, |a, b| a < b)?;
    Ok(bool_cell(interp, r))
}

fn builtin_gt(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let r = numeric_chain(interp, ">", args, |a, b| a > b)?;
    Ok(bool_cell(interp, r))
}

fn builtin_le(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let r = numeric_chain(interp, "<=", args, |a, b| a <= b)?;
    Ok(bool_cell(interp, r))
}

fn builtin_ge(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let r = numeric_chain(interp, ">=", args, |a, b| a >= b)?;
    Ok(bool_cell(interp, r))
}

// ---- logic ---------------------------------------------------------------

fn builtin_not(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let is_nil = interp.gc.is_nil(args[0]);
    Ok(bool_cell(interp, is_nil))
}

// ---- cons / lists ----------------------------------------------------------

fn builtin_cons(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    Ok(interp.gc.cons(args[0], args[1]))
}

fn builtin_car(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    interp.gc.car(args[0])
}

fn builtin_cdr(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    interp.gc.cdr(args[0])
}

fn builtin_set_car(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    interp.gc.set_car(args[0], args[1])?;
    Ok(args[1])
}

fn builtin_set_cdr(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    interp.gc.set_cdr(args[0], args[1])?;
    Ok(args[1])
}

fn builtin_list(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    Ok(interp.gc.list_from(args))
}

fn builtin_length(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let items = interp.gc.list_to_vec(args[0])?;
    Ok(interp.gc.integer(items.len() as i64))
}

// ---- equality and predicates ------------------------------------------------

fn builtin_eq(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    // Identity on every cell kind reduces to comparing the underlying heap
    // index, including symbols once interned.
    let r = args[0] == args[1];
    Ok(bool_cell(interp, r))
}

fn structurally_equal(gc: &Gc, a: Cell, b: Cell) -> bool {
    if a == b {
        return true;
    }
    match (gc.kind(a), gc.kind(b)) {
        (CellKind::Integer(x), CellKind::Integer(y)) => x == y,
        (CellKind::Float(x), CellKind::Float(y)) => x == y,
        (CellKind::Str(x), CellKind::Str(y)) => *x.borrow() == *y.borrow(),
        (CellKind::Cons(_), CellKind::Cons(_)) => {
            let (ac, bc) = (gc.car(a), gc.car(b));
            let (ad, bd) = (gc.cdr(a), gc.cdr(b));
            match (ac, bc, ad, bd) {
                (Ok(ac), Ok(bc), Ok(ad), Ok(bd)) => {
                    structurally_equal(gc, ac, bc) && structurally_equal(gc, ad, bd)
                }
                _ => false,
            }
        }
        _ => false,
    }
}

fn builtin_equal(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let r = structurally_equal(&interp.gc, args[0], args[1]);
    Ok(bool_cell(interp, r))
}

macro_rules! predicate {
    ($fn_name:ident, $test:expr) => {
        fn $fn_name(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
            let test: fn(&Gc, Cell) -> bool = $test;
            let r = test(&interp.gc, args[0]);
            Ok(bool_cell(interp, r))
        }
    };
}

predicate!(builtin_nil_p, |gc, c| gc.is_nil(c));
predicate!(builtin_cons_p, |gc, c| gc.is_cons(c));
predicate!(builtin_symbol_p, |gc, c| matches!(gc.kind(c), CellKind::Symbol(_)));
predicate!(builtin_string_p, |gc, c| matches!(gc.kind(c), CellKind::Str(_)));
predicate!(builtin_number_p, |gc, c| matches!(
    gc.kind(c),
    CellKind::Integer(_) | CellKind::Float(_)
));
predicate!(builtin_integer_p, |gc, c| matches!(gc.kind(c), CellKind::Integer(_)));
predicate!(builtin_float_p, |gc, c| matches!(gc.kind(c), CellKind::Float(_)));
predicate!(builtin_procedure_p, |gc, c| matches!(
    gc.kind(c),
    CellKind::Proc(_) | CellKind::FProc(_) | CellKind::Subr(_)
));
predicate!(builtin_hash_p, |gc, c| matches!(gc.kind(c), CellKind::Hash(_)));
predicate!(builtin_io_port_p, |gc, c| matches!(gc.kind(c), CellKind::IoPort(_)));

// ---- reader / evaluator / printer entry points ----------------------------

fn builtin_eval(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    if args.is_empty() || args.len() > 2 {
        return Err(LispError::arity_error("eval", "1 or 2", args.len()));
    }
    let env = if args.len() == 2 { Some(args[1]) } else { None };
    interp.eval_top(args[0], env)
}

fn builtin_read(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    if args.len() > 1 {
        return Err(LispError::arity_error("read", "0 or 1", args.len()));
    }
    let port_id = if let Some(&p) = args.first() {
        port_id_of(interp, "read", 0, p)?
    } else {
        interp.stdin_id()
    };
    match interp.read_port(port_id)? {
        Some(c) => Ok(c),
        None => Ok(interp.gc.nil), // EOF reads as nil
    }
}

fn builtin_print(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    if args.is_empty() || args.len() > 2 {
        return Err(LispError::arity_error("print", "1 or 2", args.len()));
    }
    let port_id = if let Some(&p) = args.get(1) {
        port_id_of(interp, "print", 1, p)?
    } else {
        interp.stdout_id()
    };
    interp.print_to_port(port_id, args[0])?;
    Ok(args[0])
}

fn builtin_newline(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    if args.len() > 1 {
        return Err(LispError::arity_error("newline", "0 or 1", args.len()));
    }
    let port_id = if let Some(&p) = args.first() {
        port_id_of(interp, "newline", 0, p)?
    } else {
        interp.stdout_id()
    };
    interp.port_mut(port_id)?.write_str("\n")?;
    Ok(interp.gc.nil)
}

fn port_id_of(interp: &Interpreter, fname: &str, pos: usize, c: Cell) -> LispResult<crate::io::PortId> {
    match interp.gc.kind(c) {
        CellKind::IoPort(id) => Ok(*id),
        _ => Err(LispError::type_error(fname, "io-port", interp.gc.type_name(c), pos)),
    }
}

// ---- I/O ports --------------------------------------------------------------

fn builtin_open_input_string(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let s = string_arg(&interp.gc, "open-input-string", 0, args[0])?;
    let port = Port::string_input(s);
    let id = interp.alloc_port(port);
    Ok(interp.gc.alloc(CellKind::IoPort(id)))
}

fn builtin_open_output_string(interp: &mut Interpreter, _args: &[Cell]) -> LispResult<Cell> {
    let id = interp.alloc_port(Port::string_output());
    Ok(interp.gc.alloc(CellKind::IoPort(id)))
}

fn builtin_get_output_string(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let port_id = port_id_of(interp, "get-output-string", 0, args[0])?;
    let s = interp
        .port(port_id)?
        .take_string()
        .ok_or_else(|| LispError::runtime_error("get-output-string", "not a string-output port"))?;
    Ok(interp.gc.string(s))
}

fn builtin_open_input_file(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let path = string_arg(&interp.gc, "open-input-file", 0, args[0])?;
    let port = Port::open_file_read(&path)?;
    let id = interp.alloc_port(port);
    Ok(interp.gc.alloc(CellKind::IoPort(id)))
}

fn builtin_open_output_file(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    if args.is_empty() || args.len() > 2 {
        return Err(LispError::arity_error("open-output-file", "1 or 2", args.len()));
    }
    let path = string_arg(&interp.gc, "open-output-file", 0, args[0])?;
    let append = args.get(1).is_some_and(|&c| !interp.gc.is_nil(c));
    let port = Port::open_file_write(&path, append)?;
    let id = interp.alloc_port(port);
    Ok(interp.gc.alloc(CellKind::IoPort(id)))
}

fn builtin_close_port(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let id = port_id_of(interp, "close-port", 0, args[0])?;
    interp.close_port(id);
    Ok(interp.gc.nil)
}

fn builtin_eof_p(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let id = port_id_of(interp, "eof?", 0, args[0])?;
    let eof = {
        let port = interp.port_mut(id)?;
        match port.getc()? {
            Some(b) => {
                port.ungetc(b);
                false
            }
            None => true,
        }
    };
    Ok(bool_cell(interp, eof))
}

fn string_arg(gc: &Gc, fname: &str, pos: usize, c: Cell) -> LispResult<String> {
    match gc.kind(c) {
        CellKind::Str(s) => Ok(s.borrow().clone()),
        _ => Err(LispError::type_error(fname, "string", gc.type_name(c), pos)),
    }
}

// ---- hash table ------------------------------------------------------------

fn hash_key(gc: &Gc, fname: &str, pos: usize, c: Cell) -> LispResult<String> {
    match gc.kind(c) {
        CellKind::Str(s) => Ok(s.borrow().clone()),
        CellKind::Symbol(s) => Ok(s.to_string()),
        _ => Err(LispError::type_error(fname, "symbol-or-string", gc.type_name(c), pos)),
    }
}

/// `(hash-create k1 v1 k2 v2 ...)`: the flat arg-list form both
/// `hash->list` produces and this constructor accepts.
fn builtin_hash_create(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    if args.len() % 2 != 0 {
        return Err(LispError::runtime_error("hash-create", "odd number of arguments"));
    }
    let mut table = HashTable::new();
    for pair in args.chunks(2) {
        let key = hash_key(&interp.gc, "hash-create", 0, pair[0])?;
        table.set(&key, pair[1]);
    }
    let id = interp.alloc_hash(table);
    Ok(interp.gc.alloc(CellKind::Hash(id)))
}

fn hash_id_of(interp: &Interpreter, fname: &str, pos: usize, c: Cell) -> LispResult<crate::hash::HashId> {
    match interp.gc.kind(c) {
        CellKind::Hash(id) => Ok(*id),
        _ => Err(LispError::type_error(fname, "hash", interp.gc.type_name(c), pos)),
    }
}

fn builtin_hash_ref(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    if args.len() < 2 || args.len() > 3 {
        return Err(LispError::arity_error("hash-ref", "2 or 3", args.len()));
    }
    let id = hash_id_of(interp, "hash-ref", 0, args[0])?;
    let key = hash_key(&interp.gc, "hash-ref", 1, args[1])?;
    match interp.hash(id).get(&key) {
        Some(v) => Ok(v),
        None => Ok(args.get(2).copied().unwrap_or(interp.gc.nil)),
    }
}

fn builtin_hash_set(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let id = hash_id_of(interp, "hash-set!", 0, args[0])?;
    let key = hash_key(&interp.gc, "hash-set!", 1, args[1])?;
    interp.hash_mut(id).set(&key, args[2]);
    Ok(args[2])
}

/// `hash->list`: flat `(k1 v1 k2 v2 ...)`, bucket-chain order
/// (unspecified beyond "stable within one table's lifetime").
fn builtin_hash_to_list(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let id = hash_id_of(interp, "hash->list", 0, args[0])?;
    let pairs: Vec<(String, Cell)> = interp
        .hash(id)
        .entries()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    let mut flat = Vec::new();
    for (k, v) in pairs {
        flat.push(interp.gc.string(k));
        flat.push(v);
    }
    Ok(interp.gc.list_from(&flat))
}

// ---- GC and trace knobs ----------------------------------------------------

fn builtin_gc_collect(interp: &mut Interpreter, _args: &[Cell]) -> LispResult<Cell> {
    interp.gc_collect();
    Ok(interp.gc.nil)
}

fn builtin_gc_disable(interp: &mut Interpreter, _args: &[Cell]) -> LispResult<Cell> {
    interp.gc.set_control(crate::gc::GcControl::Off);
    Ok(interp.gc.nil)
}

fn builtin_gc_enable(interp: &mut Interpreter, _args: &[Cell]) -> LispResult<Cell> {
    interp.gc.set_control(crate::gc::GcControl::On);
    Ok(interp.gc.nil)
}

fn builtin_gc_postpone(interp: &mut Interpreter, _args: &[Cell]) -> LispResult<Cell> {
    interp.gc.set_control(crate::gc::GcControl::Postpone);
    Ok(interp.gc.nil)
}

fn builtin_trace_level(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let name = match interp.gc.kind(args[0]) {
        CellKind::Symbol(s) => s.to_string(),
        _ => return Err(LispError::type_error("trace-level!", "symbol", interp.gc.type_name(args[0]), 0)),
    };
    interp.trace_level = match name.as_str() {
        "off" => TraceLevel::Off,
        "marked" => TraceLevel::Marked,
        "all" => TraceLevel::All,
        other => {
            return Err(LispError::runtime_error(
                "trace-level!",
                format!("expected one of off/marked/all, got '{}'", other),
            ))
        }
    };
    Ok(interp.gc.nil)
}

fn builtin_scope_mode(interp: &mut Interpreter, args: &[Cell]) -> LispResult<Cell> {
    let name = match interp.gc.kind(args[0]) {
        CellKind::Symbol(s) => s.to_string(),
        _ => return Err(LispError::type_error("scope-mode!", "symbol", interp.gc.type_name(args[0]), 0)),
    };
    interp.config.scope_mode = match name.as_str() {
        "lexical" => ScopeMode::Lexical,
        "dynamic" => ScopeMode::Dynamic,
        other => {
            return Err(LispError::runtime_error(
                "scope-mode!",
                format!("expected lexical or dynamic, got '{}'", other),
            ))
        }
    };
    Ok(interp.gc.nil)
}

// ---- registration -----------------------------------------------------------

/// Installs the minimal, representative primitive set as bindings in
/// the interpreter's top frame.
pub fn register_builtins(interp: &mut Interpreter) {
    interp.add_subr("+", builtin_add, None, Some("sum of all arguments"));
    interp.add_subr("-", builtin_sub, None, Some("difference, or negation with one argument"));
    interp.add_subr("*", builtin_mul, None, Some("product of all arguments"));
    interp.add_subr("/", builtin_div, None, Some("quotient, or reciprocal with one argument"));
    interp.add_subr("%", builtin_mod, Some("a a"), Some("remainder of integer or float division"));

    interp.add_subr("=", builtin_numeric_eq, None, Some("numeric equality chain"));
    interp.add_subr("<", builtin_lt, None, Some("strictly increasing chain"));
    interp.add_subr(">", builtin_gt, None, Some("strictly decreasing chain"));
    interp.add_subr("<=", builtin_le, None, Some("non-decreasing chain"));
    interp.add_subr(">=", builtin_ge, None, Some("non-increasing chain"));

    interp.add_subr("not", builtin_not, Some("A"), Some("logical negation"));

    interp.add_subr("cons", builtin_cons, Some("A A"), Some("construct a pair"));
    interp.add_subr("car", builtin_car, Some("c"), Some("first element of a pair"));
    interp.add_subr("cdr", builtin_cdr, Some("c"), Some("rest of a pair"));
    interp.add_subr("set-car!", builtin_set_car, Some("c A"), Some("mutate a pair's car"));
    interp.add_subr("set-cdr!", builtin_set_cdr, Some("c A"), Some("mutate a pair's cdr"));
    interp.add_subr("list", builtin_list, None, Some("construct a proper list"));
    interp.add_subr("length", builtin_length, Some("L"), Some("number of elements in a proper list"));

    interp.add_subr("eq?", builtin_eq, Some("A A"), Some("heap-identity comparison"));
    interp.add_subr("equal?", builtin_equal, Some("A A"), Some("structural comparison"));
    interp.add_subr("nil?", builtin_nil_p, Some("A"), Some("is the argument nil?"));
    interp.add_subr("cons?", builtin_cons_p, Some("A"), Some("is the argument a pair?"));
    interp.add_subr("symbol?", builtin_symbol_p, Some("A"), Some("is the argument a symbol?"));
    interp.add_subr("string?", builtin_string_p, Some("A"), Some("is the argument a string?"));
    interp.add_subr("number?", builtin_number_p, Some("A"), Some("is the argument an integer or float?"));
    interp.add_subr("integer?", builtin_integer_p, Some("A"), Some("is the argument an integer?"));
    interp.add_subr("float?", builtin_float_p, Some("A"), Some("is the argument a float?"));
    interp.add_subr("procedure?", builtin_procedure_p, Some("A"), Some("is the argument callable?"));
    interp.add_subr("hash?", builtin_hash_p, Some("A"), Some("is the argument a hash table?"));
    interp.add_subr("io-port?", builtin_io_port_p, Some("A"), Some("is the argument an I/O port?"));

    interp.add_subr("eval", builtin_eval, None, Some("evaluate a cell, optionally in a given environment"));
    interp.add_subr("read", builtin_read, None, Some("read one expression from a port (default stdin)"));
    interp.add_subr("print", builtin_print, None, Some("write a cell's printed form"));
    interp.add_subr("newline", builtin_newline, None, Some("write a newline"));

    interp.add_subr("open-input-string", builtin_open_input_string, Some("S"), Some("an input port reading a string"));
    interp.add_subr("open-output-string", builtin_open_output_string, Some(""), Some("a growable string-output port"));
    interp.add_subr("get-output-string", builtin_get_output_string, Some("P"), Some("contents accumulated by a string-output port"));
    interp.add_subr("open-input-file", builtin_open_input_file, Some("S"), Some("an input port reading a file"));
    interp.add_subr("open-output-file", builtin_open_output_file, None, Some("an output port writing a file"));
    interp.add_subr("close-port", builtin_close_port, Some("P"), Some("release a port's backing resource"));
    interp.add_subr("eof?", builtin_eof_p, Some("P"), Some("is the port at end of input?"));

    interp.add_subr("hash-create", builtin_hash_create, None, Some("build a hash table from a flat k/v arg list"));
    interp.add_subr("hash-ref", builtin_hash_ref, None, Some("look up a key, optional default"));
    interp.add_subr("hash-set!", builtin_hash_set, Some("h Z A"), Some("insert or overwrite a key"));
    interp.add_subr("hash->list", builtin_hash_to_list, Some("h"), Some("flat (k1 v1 k2 v2 ...) dump"));

    interp.add_subr("gc-collect", builtin_gc_collect, Some(""), Some("run a collection now"));
    interp.add_subr("gc-off", builtin_gc_disable, Some(""), Some("permanently disable automatic collection (one-way)"));
    interp.add_subr("gc-on", builtin_gc_enable, Some(""), Some("collect normally (no-op once gc-off has run)"));
    interp.add_subr("gc-postpone", builtin_gc_postpone, Some(""), Some("temporarily suspend automatic collection"));
    interp.add_subr("trace-level!", builtin_trace_level, Some("s"), Some("set the trace level: off/marked/all"));
    interp.add_subr("scope-mode!", builtin_scope_mode, Some("s"), Some("set scoping: lexical/dynamic"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Interpreter;

    fn interp() -> Interpreter {
        let mut i = Interpreter::new();
        register_builtins(&mut i);
        i
    }

    #[test]
    fn addition() {
        let mut i = interp();
        let v = i.eval_string("(+ 2 3)").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(5)));
    }

    #[test]
    fn mixed_int_float_arithmetic_promotes() {
        let mut i = interp();
        let v = i.eval_string("(+ 1 2.5)").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Float(f) if (*f - 3.5).abs() < 1e-9));
    }

    #[test]
    fn division_by_zero_is_domain_error() {
        let mut i = interp();
        assert!(i.eval_string("(/ 1 0)").is_err());
    }

    #[test]
    fn type_error_on_bad_add_argument() {
        let mut i = interp();
        assert!(i.eval_string(r#"(+ 1 "a")"#).is_err());
    }

    #[test]
    fn car_of_nil_is_type_error() {
        let mut i = interp();
        assert!(i.eval_string("(car nil)").is_err());
    }

    #[test]
    fn cons_car_cdr_roundtrip() {
        let mut i = interp();
        let v = i.eval_string("(car (cons 1 2))").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(1)));
        let v = i.eval_string("(cdr (cons 1 2))").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(2)));
    }

    #[test]
    fn list_length() {
        let mut i = interp();
        let v = i.eval_string("(length (list 1 2 3))").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(3)));
    }

    #[test]
    fn set_car_mutates_in_place() {
        let mut i = interp();
        i.eval_string("(define p (cons 1 2))").unwrap();
        i.eval_string("(set-car! p 99)").unwrap();
        let v = i.eval_string("(car p)").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(99)));
    }

    #[test]
    fn eq_is_identity_not_structural() {
        let mut i = interp();
        let v = i.eval_string("(eq? (list 1 2) (list 1 2))").unwrap();
        assert!(i.gc.is_nil(v));
        let v = i.eval_string("(equal? (list 1 2) (list 1 2))").unwrap();
        assert_eq!(v, i.gc.tee);
    }

    #[test]
    fn interned_symbols_are_eq() {
        let mut i = interp();
        let v = i.eval_string("(eq? 'foo 'foo)").unwrap();
        assert_eq!(v, i.gc.tee);
    }

    #[test]
    fn hash_create_ref_roundtrip() {
        let mut i = interp();
        i.eval_string(r#"(define h (hash-create "a" 1 "b" 2))"#).unwrap();
        let v = i.eval_string(r#"(hash-ref h "a")"#).unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(1)));
        let v = i.eval_string(r#"(hash-ref h "missing" 42)"#).unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(42)));
    }

    #[test]
    fn hash_set_then_to_list_round_trips_through_create() {
        let mut i = interp();
        i.eval_string(r#"(define h (hash-create))"#).unwrap();
        i.eval_string(r#"(hash-set! h "k" 7)"#).unwrap();
        let v = i.eval_string("(hash->list h)").unwrap();
        let items = i.gc.list_to_vec(v).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn string_ports_roundtrip() {
        let mut i = interp();
        i.eval_string(r#"(define o (open-output-string))"#).unwrap();
        i.eval_string(r#"(print "hi" o)"#).unwrap();
        let v = i.eval_string("(get-output-string o)").unwrap();
        match i.gc.kind(v) {
            CellKind::Str(s) => assert_eq!(s.borrow().as_str(), "\"hi\""),
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn read_from_string_port() {
        let mut i = interp();
        i.eval_string(r#"(define p (open-input-string "(1 2 3)"))"#).unwrap();
        let v = i.eval_string("(read p)").unwrap();
        let items = i.gc.list_to_vec(v).unwrap();
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn hash_table_prints_as_reconstruction_expression() {
        let mut i = interp();
        let v = i.eval_string(r#"(hash-create "a" 1 "b" 2)"#).unwrap();
        let text = i.print_to_string(v, false, false);
        assert!(text.starts_with("(hash-create "));
        assert!(text.contains("\"a\" 1"));
        assert!(text.contains("\"b\" 2"));
    }

    #[test]
    fn gc_collect_is_callable_and_harmless() {
        let mut i = interp();
        i.eval_string("(define x 1)").unwrap();
        i.eval_string("(gc-collect)").unwrap();
        let v = i.eval_string("x").unwrap();
        assert!(matches!(i.gc.kind(v), CellKind::Integer(1)));
    }

    #[test]
    fn gc_postpone_and_off_are_callable_from_lisp() {
        let mut i = interp();
        i.eval_string("(gc-postpone)").unwrap();
        assert_eq!(i.gc.control, crate::gc::GcControl::Postpone);
        i.eval_string("(gc-on)").unwrap();
        assert_eq!(i.gc.control, crate::gc::GcControl::On);
        i.eval_string("(gc-off)").unwrap();
        assert_eq!(i.gc.control, crate::gc::GcControl::Off);
        i.eval_string("(gc-postpone)").unwrap();
        assert_eq!(i.gc.control, crate::gc::GcControl::Off);
    }

    #[test]
    fn trace_level_bang_is_callable_from_lisp() {
        let mut i = interp();
        i.eval_string("(trace-level! 'all)").unwrap();
        assert_eq!(i.trace_level, TraceLevel::All);
        i.eval_string("(trace-level! 'off)").unwrap();
        assert_eq!(i.trace_level, TraceLevel::Off);
        assert!(i.eval_string("(trace-level! 'bogus)").is_err());
    }
}
