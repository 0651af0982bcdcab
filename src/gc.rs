//! The cell arena and its mark-and-sweep collector. Every live value is
//! a `Slot` in `Gc::slots`; a `Cell` is just an index into it. Freed
//! slots are tracked on a free list and reused by the next allocation,
//! so the heap grows only when every existing slot is live.

use crate::cell::{Cell, CellHeader, CellKind, Procedure, Slot};
use crate::error::{LispError, LispResult};
use std::cell::RefCell;
use std::rc::Rc;

/// Default auto-collect threshold, matching the original `COLLECTION_POINT`
/// (`1 << 20` allocations) from `private.h`.
pub const DEFAULT_COLLECTION_POINT: usize = 1 << 20;

/// The three states of `private.h`'s `gc_control` enum: collecting
/// normally, temporarily suspended (reversible via `gc-on`), or
/// permanently disabled (one-way: once `Off`, `gc-on` cannot undo it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcControl {
    On,
    Postpone,
    Off,
}

pub struct Gc {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    allocs_since_collect: usize,
    /// Auto-collect threshold; the evaluator's eval-step loop polls
    /// `should_collect` against this.
    pub collection_point: usize,
    pub control: GcControl,
    pub nil: Cell,
    pub tee: Cell,
}

impl Gc {
    pub fn new() -> Self {
        let mut gc = Gc {
            slots: Vec::new(),
            free: Vec::new(),
            allocs_since_collect: 0,
            collection_point: DEFAULT_COLLECTION_POINT,
            control: GcControl::On,
            nil: Cell(0),
            tee: Cell(0),
        };
        gc.nil = gc.alloc_uncollectable(CellKind::Nil);
        gc.tee = gc.alloc_uncollectable(CellKind::Tee);
        gc
    }

    fn push_slot(&mut self, kind: CellKind, uncollectable: bool) -> Cell {
        let header = CellHeader {
            uncollectable,
            ..CellHeader::default()
        };
        let slot = Slot { header, kind };
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            Cell(idx)
        } else {
            self.slots.push(Some(slot));
            Cell(self.slots.len() - 1)
        }
    }

    pub fn alloc(&mut self, kind: CellKind) -> Cell {
        self.allocs_since_collect += 1;
        self.push_slot(kind, false)
    }

    /// Allocates a cell the collector must never sweep: canonical
    /// singletons and interned symbols.
    pub fn alloc_uncollectable(&mut self, kind: CellKind) -> Cell {
        self.push_slot(kind, true)
    }

    pub fn get(&self, cell: Cell) -> &Slot {
        self.slots[cell.0]
            .as_ref()
            .expect("use of cell past collection")
    }

    pub fn get_mut(&mut self, cell: Cell) -> &mut Slot {
        self.slots[cell.0]
            .as_mut()
            .expect("use of cell past collection")
    }

    pub fn kind(&self, cell: Cell) -> &CellKind {
        &self.get(cell).kind
    }

    // ---- convenience constructors -------------------------------------

    pub fn cons(&mut self, a: Cell, b: Cell) -> Cell {
        self.alloc(CellKind::Cons(RefCell::new((a, b))))
    }

    pub fn integer(&mut self, v: i64) -> Cell {
        self.alloc(CellKind::Integer(v))
    }

    pub fn float(&mut self, v: f64) -> Cell {
        self.alloc(CellKind::Float(v))
    }

    pub fn string(&mut self, s: impl Into<String>) -> Cell {
        self.alloc(CellKind::Str(RefCell::new(s.into())))
    }

    pub fn procedure(&mut self, proc: Procedure, is_fexpr: bool) -> Cell {
        if is_fexpr {
            self.alloc(CellKind::FProc(proc))
        } else {
            self.alloc(CellKind::Proc(proc))
        }
    }

    // ---- predicates / accessors ----------------------------------------

    pub fn is_nil(&self, c: Cell) -> bool {
        c == self.nil
    }

    pub fn is_cons(&self, c: Cell) -> bool {
        matches!(self.kind(c), CellKind::Cons(_))
    }

    pub fn car(&self, c: Cell) -> LispResult<Cell> {
        match self.kind(c) {
            CellKind::Cons(pair) => Ok(pair.borrow().0),
            _ => Err(LispError::type_error("car", "cons", self.type_name(c), 0)),
        }
    }

    pub fn cdr(&self, c: Cell) -> LispResult<Cell> {
        match self.kind(c) {
            CellKind::Cons(pair) => Ok(pair.borrow().1),
            _ => Err(LispError::type_error("cdr", "cons", self.type_name(c), 0)),
        }
    }

    pub fn set_car(&mut self, c: Cell, v: Cell) -> LispResult<()> {
        self.invalidate_length(c);
        match &self.get(c).kind {
            CellKind::Cons(pair) => {
                pair.borrow_mut().0 = v;
                Ok(())
            }
            _ => Err(LispError::type_error("set-car!", "cons", self.type_name(c), 0)),
        }
    }

    pub fn set_cdr(&mut self, c: Cell, v: Cell) -> LispResult<()> {
        self.invalidate_length(c);
        match &self.get(c).kind {
            CellKind::Cons(pair) => {
                pair.borrow_mut().1 = v;
                Ok(())
            }
            _ => Err(LispError::type_error("set-cdr!", "cons", self.type_name(c), 0)),
        }
    }

    fn invalidate_length(&mut self, c: Cell) {
        self.get_mut(c).header.cached_length = None;
    }

    pub fn type_name(&self, c: Cell) -> &'static str {
        match self.kind(c) {
            CellKind::Nil => "nil",
            CellKind::Tee => "t",
            CellKind::Integer(_) => "integer",
            CellKind::Float(_) => "float",
            CellKind::Symbol(_) => "symbol",
            CellKind::Str(_) => "string",
            CellKind::Cons(_) => "cons",
            CellKind::Proc(_) => "procedure",
            CellKind::FProc(_) => "f-expr",
            CellKind::Subr(_) => "subroutine",
            CellKind::IoPort(_) => "io-port",
            CellKind::Hash(_) => "hash",
            CellKind::UserDefined(..) => "user-defined",
        }
    }

    pub fn symbol_name(&self, c: Cell) -> Option<Rc<str>> {
        match self.kind(c) {
            CellKind::Symbol(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Builds a proper list from a slice, terminated by `nil`.
    pub fn list_from(&mut self, items: &[Cell]) -> Cell {
        let mut tail = self.nil;
        for item in items.iter().rev() {
            tail = self.cons(*item, tail);
        }
        tail
    }

    /// Walks a proper list into a `Vec`. Errors if the list is improper.
    pub fn list_to_vec(&self, mut c: Cell) -> LispResult<Vec<Cell>> {
        let mut out = Vec::new();
        while !self.is_nil(c) {
            out.push(self.car(c)?);
            c = self.cdr(c)?;
        }
        Ok(out)
    }

    // ---- mark and sweep -------------------------------------------------

    /// Marks every cell reachable from `roots`, then frees every
    /// non-uncollectable slot whose mark bit is still clear. Mark bits
    /// are cleared again at the start of the call so repeated
    /// collections are idempotent.
    ///
    /// `extra_roots` supplements the structural `Cons`/`Proc`/`FProc`
    /// traversal with the two root sources this arena cannot see on its
    /// own: each live hash cell's contained values, and a user cell's
    /// `mark` callback if present. It is called only for
    /// `Hash`/`UserDefined` cells actually reached by the mark, so an
    /// unreachable hash table's values are not force-rooted.
    pub fn collect(&mut self, roots: &[Cell], mut extra_roots: impl FnMut(&CellKind, &mut Vec<Cell>)) {
        self.allocs_since_collect = 0;
        for slot in self.slots.iter_mut().flatten() {
            slot.header.mark = false;
        }
        let mut stack: Vec<Cell> = roots.to_vec();
        while let Some(c) = stack.pop() {
            if c.0 >= self.slots.len() {
                continue;
            }
            let already_marked = match &self.slots[c.0] {
                Some(s) => s.header.mark,
                None => continue,
            };
            if already_marked {
                continue;
            }
            self.slots[c.0].as_mut().unwrap().header.mark = true;
            self.push_children(c, &mut stack, &mut extra_roots);
        }
        for idx in 0..self.slots.len() {
            let should_free = match &self.slots[idx] {
                Some(s) => !s.header.mark && !s.header.uncollectable,
                None => false,
            };
            if should_free {
                self.slots[idx] = None;
                self.free.push(idx);
            }
        }
    }

    fn push_children(
        &self,
        c: Cell,
        stack: &mut Vec<Cell>,
        extra_roots: &mut impl FnMut(&CellKind, &mut Vec<Cell>),
    ) {
        let kind = &self.slots[c.0].as_ref().unwrap().kind;
        match kind {
            CellKind::Cons(pair) => {
                let (a, b) = *pair.borrow();
                stack.push(a);
                stack.push(b);
            }
            CellKind::Proc(p) | CellKind::FProc(p) => {
                stack.push(p.params);
                stack.push(p.body);
                stack.push(p.env);
            }
            CellKind::Hash(_) | CellKind::UserDefined(..) => extra_roots(kind, stack),
            _ => {}
        }
    }

    /// True once allocations since the last collection cross
    /// `collection_point`; callers (the evaluator's eval-step loop) poll
    /// this to decide whether to run an automatic collection. `Postpone`
    /// and `Off` both suspend auto-collection; only `gc-collect` can
    /// force a sweep while postponed, and nothing can while `Off`.
    pub fn should_collect(&self) -> bool {
        self.control == GcControl::On
            && self.collection_point > 0
            && self.allocs_since_collect >= self.collection_point
    }

    /// Sets the GC control state. Transitioning to `Off` is one-way: a
    /// later attempt to set `On` or `Postpone` while already `Off` is a
    /// no-op, matching `private.h`'s "permanently turn garbage collection
    /// off" comment on `GC_OFF`.
    pub fn set_control(&mut self, control: GcControl) {
        if self.control == GcControl::Off {
            return;
        }
        self.control = control;
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for Gc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_cons_is_swept() {
        let mut gc = Gc::new();
        let before = gc.live_count();
        let a = gc.integer(1);
        let b = gc.integer(2);
        let _pair = gc.cons(a, b);
        assert!(gc.live_count() > before);
        gc.collect(&[], |_, _| {});
        assert_eq!(gc.live_count(), before);
    }

    #[test]
    fn reachable_cons_survives() {
        let mut gc = Gc::new();
        let a = gc.integer(1);
        let b = gc.integer(2);
        let pair = gc.cons(a, b);
        gc.collect(&[pair], |_, _| {});
        assert_eq!(gc.car(pair).unwrap(), a);
        assert_eq!(gc.cdr(pair).unwrap(), b);
    }

    #[test]
    fn nil_and_tee_survive_with_no_roots() {
        let mut gc = Gc::new();
        gc.collect(&[], |_, _| {});
        assert!(gc.is_nil(gc.nil));
        assert_eq!(gc.type_name(gc.tee), "t");
    }

    #[test]
    fn cyclic_structure_does_not_leak() {
        let mut gc = Gc::new();
        let a = gc.cons(gc.nil, gc.nil);
        let b = gc.cons(a, gc.nil);
        gc.set_cdr(a, b).unwrap();
        let live_with_cycle = gc.live_count();
        gc.collect(&[], |_, _| {});
        assert!(gc.live_count() < live_with_cycle);
    }

    #[test]
    fn mark_bits_clear_between_collections() {
        let mut gc = Gc::new();
        let a = gc.integer(1);
        gc.collect(&[a], |_, _| {});
        gc.collect(&[], |_, _| {});
        assert_eq!(gc.live_count(), 2); // nil, tee only
    }

    #[test]
    fn postpone_suspends_auto_collect_and_on_resumes_it() {
        let mut gc = Gc::new();
        gc.collection_point = 1;
        gc.set_control(GcControl::Postpone);
        gc.integer(1);
        assert!(!gc.should_collect());
        gc.set_control(GcControl::On);
        assert!(gc.should_collect());
    }

    #[test]
    fn off_is_one_way_and_resists_gc_on() {
        let mut gc = Gc::new();
        gc.collection_point = 1;
        gc.set_control(GcControl::Off);
        gc.integer(1);
        assert!(!gc.should_collect());
        gc.set_control(GcControl::On);
        assert_eq!(gc.control, GcControl::Off);
        assert!(!gc.should_collect());
    }

    #[test]
    fn forced_collect_runs_regardless_of_control_state() {
        let mut gc = Gc::new();
        gc.set_control(GcControl::Off);
        let before = gc.live_count();
        gc.integer(1);
        assert!(gc.live_count() > before);
        gc.collect(&[], |_, _| {});
        assert_eq!(gc.live_count(), before);
    }
}
