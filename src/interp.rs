//! The embedder-facing `Interpreter`: owns the heap, the symbol
//! interner, the subroutine registry, open I/O ports and hash tables,
//! and the configuration knobs. A reusable library type an embedder
//! constructs, registers builtins and host callbacks into, then drives
//! through `read`/`eval`/`print`/`eval_string` calls of its own choosing
//! rather than a single hardcoded loop.

use crate::cell::{Cell, CellKind, Procedure, SubrId};
use crate::config::Config;
use crate::env;
use crate::error::{LispError, LispResult};
use crate::eval::{self, TraceLevel};
use crate::gc::Gc;
use crate::hash::HashTable;
use crate::interner::Interner;
use crate::io::{Port, PortId};
use crate::printer::Printer;
use crate::reader::Reader;
use crate::registry::{Registry, SubrFn};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host-provided callbacks for one embedder-registered opaque type.
pub struct UserTypeFuncs {
    pub free: Option<Rc<dyn Fn(usize)>>,
    /// Given the opaque payload, appends every `Cell` it keeps alive.
    /// Takes no `&Gc`: the embedder's own payload already knows what it
    /// references, and the collector's mark pass holds `&mut Gc` while
    /// this runs.
    pub mark: Option<Rc<dyn Fn(usize, &mut Vec<Cell>)>>,
    pub equal: Option<Rc<dyn Fn(usize, usize) -> bool>>,
    pub print: Option<Rc<dyn Fn(usize) -> String>>,
}

/// A recovery-point snapshot: the pin-stack length and evaluator depth
/// at install time, restored on an error unwind (spec.md §4.9, §9
/// Design Notes). Stands in for the C `setjmp`/`jmp_buf` save-restore
/// discipline without `unsafe` non-local control flow.
#[derive(Debug, Clone, Copy)]
pub struct Recovery {
    pub pin_len: usize,
}

pub struct Interpreter {
    pub gc: Gc,
    pub interner: Interner,
    pub registry: Registry,
    pub top_env: Cell,
    pub config: Config,

    ports: Vec<Option<Port>>,
    hashes: Vec<Option<HashTable>>,
    user_types: Vec<UserTypeFuncs>,

    /// GC root: cells allocated by in-flight primitives/evaluation not
    /// yet reachable from a variable (spec.md §4.6 "GC coordination").
    pub pin_stack: Vec<Cell>,
    pub trace_level: TraceLevel,

    /// Polled between evaluation steps; set from a signal handler or
    /// another thread (spec.md §5).
    pub sig: Arc<AtomicBool>,

    stdout: PortId,
    stdin: PortId,
    log: PortId,

    // Canonical interned specials, cached for identity dispatch
    // (spec.md §4.6 "recognised by interned symbol identity").
    pub sym_quote: Cell,
    pub sym_if: Cell,
    pub sym_begin: Cell,
    pub sym_lambda: Cell,
    pub sym_flambda: Cell,
    pub sym_define: Cell,
    pub sym_set: Cell,
    pub sym_cond: Cell,
    pub sym_and: Cell,
    pub sym_or: Cell,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut gc = Gc::new();
        let mut interner = Interner::new();
        let top_env = env::new_frame(&mut gc, gc.nil);

        let mut ports = Vec::new();
        let stdout = PortId(ports.len());
        ports.push(Some(Port::null())); // real stdout is written directly, see io.rs
        let stdin = PortId(ports.len());
        ports.push(Some(Port::null()));
        let log = PortId(ports.len());
        ports.push(Some(Port::null()));

        let sym_quote = interner.intern(&mut gc, "quote");
        let sym_if = interner.intern(&mut gc, "if");
        let sym_begin = interner.intern(&mut gc, "begin");
        let sym_lambda = interner.intern(&mut gc, "lambda");
        let sym_flambda = interner.intern(&mut gc, "flambda");
        let sym_define = interner.intern(&mut gc, "define");
        let sym_set = interner.intern(&mut gc, "set!");
        let sym_cond = interner.intern(&mut gc, "cond");
        let sym_and = interner.intern(&mut gc, "and");
        let sym_or = interner.intern(&mut gc, "or");

        Interpreter {
            gc,
            interner,
            registry: Registry::new(),
            top_env,
            config: Config::default(),
            ports,
            hashes: Vec::new(),
            user_types: Vec::new(),
            pin_stack: Vec::new(),
            trace_level: TraceLevel::Off,
            sig: Arc::new(AtomicBool::new(false)),
            stdout,
            stdin,
            log,
            sym_quote,
            sym_if,
            sym_begin,
            sym_lambda,
            sym_flambda,
            sym_define,
            sym_set,
            sym_cond,
            sym_and,
            sym_or,
        }
    }

    // ---- embedder API (spec.md §6) -------------------------------------

    pub fn set_input(&mut self, port: Port) {
        self.ports[self.stdin.0] = Some(port);
    }

    pub fn set_output(&mut self, port: Port) {
        self.ports[self.stdout.0] = Some(port);
    }

    pub fn set_log(&mut self, port: Port) {
        self.ports[self.log.0] = Some(port);
    }

    pub fn log_port_id(&self) -> PortId {
        self.log
    }

    /// Installs a host primitive and binds it in the top frame, per
    /// spec.md §6 `add_subr`.
    pub fn add_subr(&mut self, name: &str, func: SubrFn, validation: Option<&str>, doc: Option<&str>) {
        let id = self.registry.register(name, func, validation, doc);
        let cell = self.gc.alloc(CellKind::Subr(id));
        let sym = self.interner.intern(&mut self.gc, name);
        env::define(&mut self.gc, self.top_env, sym, cell).expect("top frame is always a cons");
    }

    /// Binds a pre-built value in the top frame (spec.md §6 `add_cell`).
    pub fn add_cell(&mut self, name: &str, value: Cell) {
        let sym = self.interner.intern(&mut self.gc, name);
        env::define(&mut self.gc, self.top_env, sym, value).expect("top frame is always a cons");
    }

    /// Registers a new opaque embedder type, returning its small integer
    /// tag (spec.md §6 `new_user_type`).
    pub fn new_user_type(&mut self, funcs: UserTypeFuncs) -> u8 {
        let tag = self.user_types.len() as u8;
        self.user_types.push(funcs);
        tag
    }

    pub fn user_type_funcs(&self, tag: u8) -> &UserTypeFuncs {
        &self.user_types[tag as usize]
    }

    // ---- port / hash tables --------------------------------------------

    pub fn alloc_port(&mut self, port: Port) -> PortId {
        let id = PortId(self.ports.len());
        self.ports.push(Some(port));
        id
    }

    pub fn port(&self, id: PortId) -> LispResult<&Port> {
        self.ports[id.0]
            .as_ref()
            .ok_or_else(|| LispError::runtime_error("port", "use of closed port"))
    }

    pub fn port_mut(&mut self, id: PortId) -> LispResult<&mut Port> {
        self.ports[id.0]
            .as_mut()
            .ok_or_else(|| LispError::runtime_error("port", "use of closed port"))
    }

    pub fn close_port(&mut self, id: PortId) {
        self.ports[id.0] = None;
    }

    pub fn alloc_hash(&mut self, table: HashTable) -> crate::hash::HashId {
        let id = crate::hash::HashId(self.hashes.len());
        self.hashes.push(Some(table));
        id
    }

    pub fn hash(&self, id: crate::hash::HashId) -> &HashTable {
        self.hashes[id.0].as_ref().expect("hash table not closed")
    }

    pub fn hash_mut(&mut self, id: crate::hash::HashId) -> &mut HashTable {
        self.hashes[id.0].as_mut().expect("hash table not closed")
    }

    pub fn hash_ids(&self) -> Vec<crate::hash::HashId> {
        (0..self.hashes.len())
            .filter(|i| self.hashes[*i].is_some())
            .map(crate::hash::HashId)
            .collect()
    }

    // ---- reader / evaluator / printer entry points ---------------------

    /// `Lisp.read(stream)`: reads one expression from a port already
    /// open in the interpreter's port table.
    pub fn read_port(&mut self, port_id: PortId) -> LispResult<Option<Cell>> {
        let mut port = self.ports[port_id.0]
            .take()
            .ok_or_else(|| LispError::runtime_error("read", "use of closed port"))?;
        let mut reader = Reader::new(&mut port);
        let result = reader.read(&mut self.gc, &mut self.interner);
        self.ports[port_id.0] = Some(port);
        result
    }

    /// `Lisp.eval(cell [, env])`.
    pub fn eval_top(&mut self, expr: Cell, env: Option<Cell>) -> LispResult<Cell> {
        let env = env.unwrap_or(self.top_env);
        let recovery = Recovery {
            pin_len: self.pin_stack.len(),
        };
        let result = eval::eval(self, expr, env, 0);
        match result {
            Err(e) => {
                self.pin_stack.truncate(recovery.pin_len);
                // errors_halt (spec.md §4.9): strict embedding upgrades
                // every recoverable error to fatal instead of recovering.
                if self.config.errors_halt && !e.is_fatal() {
                    Err(LispError::Fatal(e.to_string()))
                } else {
                    Err(e)
                }
            }
            ok => ok,
        }
    }

    /// `Lisp.print(stream, cell)`.
    pub fn print_to_port(&mut self, port_id: PortId, cell: Cell) -> LispResult<()> {
        let (color, pretty) = {
            let p = self.port(port_id)?;
            (p.color, p.pretty)
        };
        let printer = Printer::with_hashes(&self.gc, &self.hashes, color, pretty);
        let text = printer.print_to_string(cell);
        self.port_mut(port_id)?.write_str(&text)
    }

    pub fn print_to_string(&self, cell: Cell, color: bool, pretty: bool) -> String {
        Printer::with_hashes(&self.gc, &self.hashes, color, pretty).print_to_string(cell)
    }

    /// `Lisp.eval_string(src) -> cell`: reads and evaluates every
    /// top-level form in `src`, returning the last value (nil if `src`
    /// held no forms).
    pub fn eval_string(&mut self, src: &str) -> LispResult<Cell> {
        let mut port = Port::string_input(src.to_string());
        let mut result = self.gc.nil;
        loop {
            let mut reader = Reader::new(&mut port);
            let next = reader.read(&mut self.gc, &mut self.interner)?;
            match next {
                None => break,
                Some(expr) => {
                    result = self.eval_top(expr, None)?;
                }
            }
        }
        Ok(result)
    }

    pub fn gc_collect(&mut self) {
        let mut roots: Vec<Cell> = Vec::new();
        roots.push(self.top_env);
        roots.extend(self.pin_stack.iter().copied());
        roots.extend(self.interner.all_symbols());

        let hashes = &self.hashes;
        let user_types = &self.user_types;
        self.gc.collect(&roots, |kind, stack| match kind {
            CellKind::Hash(id) => {
                if let Some(Some(table)) = hashes.get(id.0) {
                    for (_, v) in table.entries() {
                        stack.push(v);
                    }
                }
            }
            CellKind::UserDefined(tag, payload) => {
                if let Some(funcs) = user_types.get(*tag as usize) {
                    if let Some(mark) = &funcs.mark {
                        mark(*payload, stack);
                    }
                }
            }
            _ => {}
        });
    }

    pub fn maybe_collect(&mut self) {
        if self.gc.should_collect() {
            self.gc_collect();
        }
    }

    pub fn make_procedure(&mut self, params: Cell, body: Cell, env: Cell, is_fexpr: bool) -> Cell {
        let proc = Procedure {
            params,
            body,
            env,
            name: None,
        };
        self.gc.procedure(proc, is_fexpr)
    }

    pub fn stdout_id(&self) -> PortId {
        self.stdout
    }

    pub fn stdin_id(&self) -> PortId {
        self.stdin
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_string_arithmetic() {
        let mut interp = Interpreter::new();
        crate::builtins::register_builtins(&mut interp);
        let result = interp.eval_string("(+ 2 3)").unwrap();
        assert!(matches!(interp.gc.kind(result), CellKind::Integer(5)));
    }

    #[test]
    fn eval_string_define_then_use() {
        let mut interp = Interpreter::new();
        crate::builtins::register_builtins(&mut interp);
        interp.eval_string("(define x 10)").unwrap();
        let result = interp.eval_string("(+ x x)").unwrap();
        assert!(matches!(interp.gc.kind(result), CellKind::Integer(20)));
    }

    #[test]
    fn recovery_truncates_pin_stack_on_error() {
        let mut interp = Interpreter::new();
        crate::builtins::register_builtins(&mut interp);
        let before = interp.pin_stack.len();
        let _ = interp.eval_string("(car 1)");
        assert_eq!(interp.pin_stack.len(), before);
    }
}
