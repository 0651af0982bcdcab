//! Structural writer: recursive, with a recursion cap shared with the
//! reader, optional pretty-printing indentation, and optional ANSI
//! colour (SGR escapes around symbols/strings/numbers), a newline
//! before each open paren once pretty-printing and depth both require
//! it, and an octal-escape fallback for non-printable string bytes.

use crate::cell::{Cell, CellKind};
use crate::gc::Gc;
use crate::hash::HashTable;
use crate::io::Port;
use crate::reader::MAX_DEPTH;

const SGR_RESET: &str = "\x1b[0m";
const SGR_SYMBOL: &str = "\x1b[33m"; // yellow, liblisp's '%y'
const SGR_STRING: &str = "\x1b[31m"; // red, liblisp's '%r'
const SGR_NUMBER: &str = "\x1b[35m"; // magenta, liblisp's '%m'
const SGR_SPECIAL: &str = "\x1b[1m"; // bold, liblisp's '%B'

pub struct Printer<'a> {
    gc: &'a Gc,
    /// Slotted like `Interpreter::hashes`: `None` holes are closed tables.
    /// Absent entirely for printers built without an owning interpreter
    /// (e.g. the reader round-trip tests below), in which case a `Hash`
    /// cell falls back to the old opaque `<HASH:id>` form.
    hashes: Option<&'a [Option<HashTable>]>,
    color: bool,
    pretty: bool,
    depth_limit: usize,
}

impl<'a> Printer<'a> {
    pub fn new(gc: &'a Gc, color: bool, pretty: bool) -> Self {
        Printer {
            gc,
            hashes: None,
            color,
            pretty,
            depth_limit: MAX_DEPTH,
        }
    }

    /// Builds a printer that can resolve `Hash` cells back to their
    /// contents, so they print as the reconstruction expression
    /// `(hash-create k1 v1 ...)` (spec.md §4.3, §9) instead of an
    /// opaque handle.
    pub fn with_hashes(gc: &'a Gc, hashes: &'a [Option<HashTable>], color: bool, pretty: bool) -> Self {
        Printer {
            gc,
            hashes: Some(hashes),
            color,
            pretty,
            depth_limit: MAX_DEPTH,
        }
    }

    fn colorize(&self, sgr: &str, text: &str, out: &mut String) {
        if self.color {
            out.push_str(sgr);
            out.push_str(text);
            out.push_str(SGR_RESET);
        } else {
            out.push_str(text);
        }
    }

    /// Renders `cell` to a string.
    pub fn print_to_string(&self, cell: Cell) -> String {
        let mut out = String::new();
        self.write(cell, 0, &mut out);
        out
    }

    pub fn print(&self, cell: Cell, port: &mut Port) -> crate::error::LispResult<()> {
        let s = self.print_to_string(cell);
        port.write_str(&s)
    }

    fn write(&self, cell: Cell, depth: usize, out: &mut String) {
        if depth > self.depth_limit {
            out.push_str(&format!("<PRINT-DEPTH-EXCEEDED:{}>", depth));
            return;
        }
        match self.gc.kind(cell) {
            CellKind::Nil => self.colorize(SGR_STRING, "nil", out),
            CellKind::Tee => self.colorize(SGR_STRING, "t", out),
            CellKind::Integer(i) => self.colorize(SGR_NUMBER, &i.to_string(), out),
            CellKind::Float(f) => self.colorize(SGR_NUMBER, &format_float(*f), out),
            CellKind::Symbol(s) => self.colorize(SGR_SYMBOL, s, out),
            CellKind::Str(s) => self.write_escaped_string(&s.borrow(), out),
            CellKind::Cons(_) => self.write_cons(cell, depth, out),
            CellKind::Proc(p) => self.write_closure(p, "lambda", depth, out),
            CellKind::FProc(p) => self.write_closure(p, "flambda", depth, out),
            CellKind::Subr(id) => {
                self.colorize(SGR_SPECIAL, &format!("<SUBR:{}>", id.0), out)
            }
            CellKind::IoPort(id) => {
                self.colorize(SGR_SPECIAL, &format!("<IO:{}>", id.0), out)
            }
            CellKind::Hash(id) => match self.hashes.and_then(|hs| hs.get(id.0)).and_then(|t| t.as_ref()) {
                Some(table) => out.push_str(&self.print_hash_to_string(table)),
                None => out.push_str(&format!("<HASH:{}>", id.0)),
            },
            CellKind::UserDefined(tag, payload) => {
                out.push_str(&format!("<USER:{}:{}>", tag, payload))
            }
        }
    }

    fn write_closure(&self, p: &crate::cell::Procedure, kw: &str, depth: usize, out: &mut String) {
        if self.pretty && depth > 0 {
            out.push('\n');
            out.push_str(&" ".repeat(depth));
        }
        out.push('(');
        self.colorize(SGR_SYMBOL, kw, out);
        out.push(' ');
        self.write(p.params, depth + 1, out);
        let mut body = p.body;
        while !self.gc.is_nil(body) {
            out.push(' ');
            if let Ok(item) = self.gc.car(body) {
                self.write(item, depth + 1, out);
            }
            body = match self.gc.cdr(body) {
                Ok(c) => c,
                Err(_) => break,
            };
        }
        out.push(')');
    }

    fn write_cons(&self, mut cell: Cell, depth: usize, out: &mut String) {
        if self.pretty && depth > 0 {
            out.push('\n');
            out.push_str(&" ".repeat(depth));
        }
        out.push('(');
        loop {
            let head = match self.gc.car(cell) {
                Ok(h) => h,
                Err(_) => break,
            };
            self.write(head, depth + 1, out);
            let tail = match self.gc.cdr(cell) {
                Ok(t) => t,
                Err(_) => break,
            };
            if self.gc.is_nil(tail) {
                break;
            }
            if self.gc.is_cons(tail) {
                out.push(' ');
                cell = tail;
            } else {
                // Improper list: print the dotted-pair tail. The reader
                // does not accept this syntax back; it is print-only.
                out.push_str(" . ");
                self.write(tail, depth + 1, out);
                break;
            }
        }
        out.push(')');
    }

    fn write_escaped_string(&self, s: &str, out: &mut String) {
        let mut body = String::from("\"");
        for c in s.chars() {
            match c {
                '\\' => body.push_str("\\\\"),
                '\n' => body.push_str("\\n"),
                '\t' => body.push_str("\\t"),
                '\r' => body.push_str("\\r"),
                '"' => body.push_str("\\\""),
                c if (c as u32) < 0x20 || (c as u32) == 0x7f => {
                    body.push_str(&format!("\\{:03o}", c as u32 & 0xFF))
                }
                c => body.push(c),
            }
        }
        body.push('"');
        self.colorize(SGR_STRING, &body, out);
    }

    /// Renders a hash table as the reconstruction expression
    /// `(hash-create k1 v1 k2 v2 ...)`.
    pub fn print_hash_to_string(&self, table: &HashTable) -> String {
        let mut out = String::from("(hash-create");
        for (key, value) in table.entries() {
            out.push(' ');
            self.write_escaped_string(key, &mut out);
            out.push(' ');
            self.write(value, 1, &mut out);
        }
        out.push(')');
        out
    }
}

/// Floats always print with a decimal point so `3.0` round-trips as a
/// float rather than being re-read as the integer `3`.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_infinite() || f.is_nan() {
        return format!("{}", f);
    }
    let s = format!("{}", f);
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{}.0", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Interner;
    use crate::reader::read_one_from_str;

    fn roundtrip(src: &str) -> String {
        let mut gc = Gc::new();
        let mut interner = Interner::new();
        let cell = read_one_from_str(src, &mut gc, &mut interner).unwrap().unwrap();
        Printer::new(&gc, false, false).print_to_string(cell)
    }

    #[test]
    fn prints_integer() {
        assert_eq!(roundtrip("42"), "42");
        assert_eq!(roundtrip("-7"), "-7");
    }

    #[test]
    fn prints_float_with_decimal_point() {
        assert_eq!(roundtrip("3.0"), "3.0");
        assert_eq!(roundtrip("3.5"), "3.5");
    }

    #[test]
    fn prints_list() {
        assert_eq!(roundtrip("(1 2 3)"), "(1 2 3)");
    }

    #[test]
    fn prints_symbol_and_nil() {
        assert_eq!(roundtrip("foo"), "foo");
        assert_eq!(roundtrip("()"), "nil");
    }

    #[test]
    fn prints_string_with_escapes() {
        let mut gc = Gc::new();
        let cell = gc.string("a\nb\"c");
        let printed = Printer::new(&gc, false, false).print_to_string(cell);
        assert_eq!(printed, "\"a\\nb\\\"c\"");
    }

    #[test]
    fn prints_nested_list() {
        assert_eq!(roundtrip("(1 (2 3))"), "(1 (2 3))");
    }

    #[test]
    fn color_wraps_in_sgr_codes() {
        let mut gc = Gc::new();
        let mut interner = Interner::new();
        let cell = read_one_from_str("foo", &mut gc, &mut interner).unwrap().unwrap();
        let printed = Printer::new(&gc, true, false).print_to_string(cell);
        assert!(printed.starts_with("\x1b["));
        assert!(printed.ends_with(SGR_RESET));
    }

    #[test]
    fn dotted_pair_prints_with_dot() {
        let mut gc = Gc::new();
        let a = gc.integer(1);
        let b = gc.integer(2);
        let pair = gc.cons(a, b);
        let printed = Printer::new(&gc, false, false).print_to_string(pair);
        assert_eq!(printed, "(1 . 2)");
    }
}
