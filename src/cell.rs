//! The tagged-cell value representation. Every Lisp value — including
//! integers, floats, and interned symbols — is a handle into the heap
//! arena owned by `Gc` (see `gc.rs`). A `Cell` is just an index; two
//! cells are `eq?` iff their indices are equal.

use std::cell::RefCell;
use std::rc::Rc;

/// A handle into the cell arena. Cheap to copy, compare, and hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell(pub usize);

/// Per-cell header bits, mirroring `struct cell`'s bitfields in the
/// original C implementation (mark / uncollectable / trace / closed /
/// cached length).
#[derive(Debug, Clone, Copy, Default)]
pub struct CellHeader {
    /// Set by the mark phase, cleared at the start of the next mark.
    pub mark: bool,
    /// Roots the GC must never sweep (canonical nil/t, interned symbols).
    pub uncollectable: bool,
    /// Per-cell trace-on-eval flag, checked by the evaluator's trace levels.
    pub trace: bool,
    /// Streams/hash tables that have been explicitly closed.
    pub closed: bool,
    /// Cached list length, invalidated on mutation; `None` = unknown.
    pub cached_length: Option<usize>,
}

/// The payload half of a cell.
#[derive(Debug, Clone)]
pub enum CellKind {
    Nil,
    Tee,
    Integer(i64),
    Float(f64),
    /// Interned symbol; the `Rc<str>` is the canonical spelling, shared
    /// with the interner's lookup table.
    Symbol(Rc<str>),
    Str(RefCell<String>),
    Cons(RefCell<(Cell, Cell)>),
    Proc(Procedure),
    FProc(Procedure),
    Subr(SubrId),
    IoPort(crate::io::PortId),
    Hash(crate::hash::HashId),
    /// `(tag, payload)` for embedder-registered user types; the payload
    /// is an opaque index the embedder interprets via `add_cell`.
    UserDefined(u8, usize),
}

/// Identifies a registered primitive subroutine by its slot in the
/// interpreter's `registry::Registry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubrId(pub usize);

/// A closure: `lambda` captures evaluated arguments, `flambda` receives
/// the unevaluated argument list; both share this shape.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub params: Cell,
    pub body: Cell,
    pub env: Cell,
    pub name: Option<Rc<str>>,
}

/// One arena slot: header plus payload. `None` marks a freed slot
/// available for the next allocation (see `gc::Gc::alloc`).
pub struct Slot {
    pub header: CellHeader,
    pub kind: CellKind,
}

impl Cell {
    pub const fn index(self) -> usize {
        self.0
    }
}
