//! Tokenizer + recursive-descent S-expression reader.
//!
//! Reads one character at a time from an `io::Port`, building `Cell`s
//! directly with no intermediate token array. The reader is re-entrant:
//! `(read port)` calls back in with whatever port the caller supplies,
//! which is why this is a hand-rolled character-stream tokenizer rather
//! than a slice-based combinator parser — a port only promises a single
//! byte of push-back, and reading must be able to stop exactly after one
//! expression and leave the rest of the stream alone.

use crate::cell::{Cell, CellKind};
use crate::error::{LispError, LispResult};
use crate::gc::Gc;
use crate::interner::Interner;
use crate::io::Port;

/// Default nesting-depth cap shared with the printer.
pub const MAX_DEPTH: usize = 4096;

pub struct Reader<'a> {
    port: &'a mut Port,
    depth_limit: usize,
}

impl<'a> Reader<'a> {
    pub fn new(port: &'a mut Port) -> Self {
        Reader {
            port,
            depth_limit: MAX_DEPTH,
        }
    }

    pub fn with_depth_limit(port: &'a mut Port, depth_limit: usize) -> Self {
        Reader { port, depth_limit }
    }

    fn getc(&mut self) -> LispResult<Option<u8>> {
        self.port.getc()
    }

    fn ungetc(&mut self, c: u8) {
        self.port.ungetc(c);
    }

    fn skip_whitespace_and_comments(&mut self) -> LispResult<()> {
        loop {
            match self.getc()? {
                None => return Ok(()),
                Some(c) if c.is_ascii_whitespace() => continue,
                Some(b';') => {
                    // Line comment: discard through the next newline or EOF.
                    loop {
                        match self.getc()? {
                            None => return Ok(()),
                            Some(b'\n') => break,
                            Some(_) => continue,
                        }
                    }
                }
                Some(c) => {
                    self.ungetc(c);
                    return Ok(());
                }
            }
        }
    }

    fn is_delimiter(c: u8) -> bool {
        c.is_ascii_whitespace() || c == b'(' || c == b')' || c == b';' || c == b'"' || c == b'\''
    }

    /// Reads one complete expression, or `None` at EOF before any token.
    pub fn read(&mut self, gc: &mut Gc, interner: &mut Interner) -> LispResult<Option<Cell>> {
        self.skip_whitespace_and_comments()?;
        match self.getc()? {
            None => Ok(None),
            Some(c) => {
                self.ungetc(c);
                Ok(Some(self.read_expr(gc, interner, 0)?))
            }
        }
    }

    fn read_expr(&mut self, gc: &mut Gc, interner: &mut Interner, depth: usize) -> LispResult<Cell> {
        if depth > self.depth_limit {
            return Err(LispError::DepthExceeded(self.depth_limit));
        }
        self.skip_whitespace_and_comments()?;
        let c = self
            .getc()?
            .ok_or_else(|| LispError::ReadError("unexpected end of input".into()))?;
        match c {
            b'(' => self.read_list(gc, interner, depth + 1),
            b')' => Err(LispError::ReadError("unexpected ')'".into())),
            b'\'' => {
                let quoted = self.read_expr(gc, interner, depth + 1)?;
                let quote_sym = interner.intern(gc, "quote");
                let tail = gc.cons(quoted, gc.nil);
                Ok(gc.cons(quote_sym, tail))
            }
            b'"' => self.read_string(gc),
            _ => {
                self.ungetc(c);
                self.read_atom(gc, interner)
            }
        }
    }

    fn read_list(&mut self, gc: &mut Gc, interner: &mut Interner, depth: usize) -> LispResult<Cell> {
        if depth > self.depth_limit {
            return Err(LispError::DepthExceeded(self.depth_limit));
        }
        let mut items = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            match self.getc()? {
                None => return Err(LispError::ReadError("unbalanced parentheses".into())),
                Some(b')') => return Ok(gc.list_from(&items)),
                Some(c) => {
                    self.ungetc(c);
                    items.push(self.read_expr(gc, interner, depth + 1)?);
                }
            }
        }
    }

    fn read_string(&mut self, gc: &mut Gc) -> LispResult<Cell> {
        let mut bytes = Vec::new();
        loop {
            match self.getc()? {
                None => return Err(LispError::ReadError("unterminated string literal".into())),
                Some(b'"') => break,
                Some(b'\\') => {
                    let esc = self
                        .getc()?
                        .ok_or_else(|| LispError::ReadError("unterminated string literal".into()))?;
                    match esc {
                        b'\\' => bytes.push(b'\\'),
                        b'"' => bytes.push(b'"'),
                        b'n' => bytes.push(b'\n'),
                        b't' => bytes.push(b'\t'),
                        b'r' => bytes.push(b'\r'),
                        b'0'..=b'7' => {
                            // Three-digit octal escape: \ooo.
                            let mut digits = vec![esc];
                            for _ in 0..2 {
                                match self.getc()? {
                                    Some(d @ b'0'..=b'7') => digits.push(d),
                                    Some(other) => {
                                        self.ungetc(other);
                                        break;
                                    }
                                    None => break,
                                }
                            }
                            let s: String = digits.iter().map(|&b| b as char).collect();
                            let value = u32::from_str_radix(&s, 8)
                                .map_err(|_| LispError::ReadError("bad octal escape".into()))?;
                            bytes.push((value & 0xFF) as u8);
                        }
                        other => {
                            return Err(LispError::ReadError(format!(
                                "unknown string escape '\\{}'",
                                other as char
                            )))
                        }
                    }
                }
                Some(c) => bytes.push(c),
            }
        }
        let s = String::from_utf8_lossy(&bytes).into_owned();
        Ok(gc.string(s))
    }

    /// Reads an unquoted atom: integer, float, or symbol.
    fn read_atom(&mut self, gc: &mut Gc, interner: &mut Interner) -> LispResult<Cell> {
        let mut bytes = Vec::new();
        loop {
            match self.getc()? {
                None => break,
                Some(c) if Self::is_delimiter(c) => {
                    self.ungetc(c);
                    break;
                }
                Some(c) => bytes.push(c),
            }
        }
        if bytes.is_empty() {
            return Err(LispError::ReadError("empty atom".into()));
        }
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if let Some(i) = parse_integer(&text) {
            return Ok(gc.integer(i));
        }
        if let Some(f) = parse_float(&text) {
            return Ok(gc.float(f));
        }
        if text == "nil" {
            return Ok(gc.nil);
        }
        if text == "t" {
            return Ok(gc.tee);
        }
        Ok(interner.intern(gc, &text))
    }
}

/// Integer regex: `(+|-)?(0[xX][0-9a-fA-F]+|0[0-7]*|[1-9][0-9]+|0)`.
fn parse_integer(text: &str) -> Option<i64> {
    let (neg, rest) = match text.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if rest.is_empty() {
        return None;
    }
    let magnitude: i64 = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        i64::from_str_radix(hex, 16).ok()?
    } else if rest == "0" {
        0
    } else if rest.starts_with('0') {
        // Octal: 0[0-7]*
        if !rest.chars().all(|c| ('0'..='7').contains(&c)) {
            return None;
        }
        i64::from_str_radix(rest, 8).ok()?
    } else if rest.starts_with(|c: char| ('1'..='9').contains(&c)) {
        if !rest.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        rest.parse().ok()?
    } else {
        return None;
    };
    Some(if neg { -magnitude } else { magnitude })
}

/// Float regex: `[-+]?[0-9]*\.?[0-9]+([eE][-+]?[0-9]+)?`, rejecting
/// `inf`/`nan` tokens that Rust's own `str::parse::<f64>` would accept.
fn parse_float(text: &str) -> Option<f64> {
    let lower = text.to_ascii_lowercase();
    if lower.contains("inf") || lower.contains("nan") {
        return None;
    }
    let bytes = text.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'-' || bytes[i] == b'+') {
        i += 1;
    }
    let mut saw_digit = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        saw_digit = true;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
    }
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        saw_digit = true;
    }
    if !saw_digit {
        return None;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'-' || bytes[j] == b'+') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    if i != bytes.len() {
        return None;
    }
    text.parse::<f64>().ok()
}

/// Convenience for reading a whole in-memory source string as a sequence
/// of top-level expressions (used by `eval_string`/the REPL line loop).
pub fn read_all_from_str(
    src: &str,
    gc: &mut Gc,
    interner: &mut Interner,
) -> LispResult<Vec<Cell>> {
    let mut port = Port::string_input(src.to_string());
    let mut reader = Reader::new(&mut port);
    let mut out = Vec::new();
    while let Some(cell) = reader.read(gc, interner)? {
        out.push(cell);
    }
    Ok(out)
}

pub fn read_one_from_str(src: &str, gc: &mut Gc, interner: &mut Interner) -> LispResult<Option<Cell>> {
    let mut port = Port::string_input(src.to_string());
    let mut reader = Reader::new(&mut port);
    reader.read(gc, interner)
}

#[allow(dead_code)]
fn assert_symbol(gc: &Gc, c: Cell) -> bool {
    matches!(gc.kind(c), CellKind::Symbol(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_str(src: &str) -> (Gc, Cell) {
        let mut gc = Gc::new();
        let mut interner = Interner::new();
        let cell = read_one_from_str(src, &mut gc, &mut interner).unwrap().unwrap();
        (gc, cell)
    }

    #[test]
    fn reads_integer() {
        let (gc, c) = read_str("42");
        assert!(matches!(gc.kind(c), CellKind::Integer(42)));
        let (gc, c) = read_str("-7");
        assert!(matches!(gc.kind(c), CellKind::Integer(-7)));
        let (gc, c) = read_str("0x2A");
        assert!(matches!(gc.kind(c), CellKind::Integer(42)));
        let (gc, c) = read_str("017");
        assert!(matches!(gc.kind(c), CellKind::Integer(15)));
    }

    #[test]
    fn reads_float() {
        let (gc, c) = read_str("3.14");
        assert!(matches!(gc.kind(c), CellKind::Float(f) if (*f - 3.14).abs() < 1e-9));
        let (gc, c) = read_str("1e3");
        assert!(matches!(gc.kind(c), CellKind::Float(f) if (*f - 1000.0).abs() < 1e-9));
    }

    #[test]
    fn reads_symbol() {
        let (gc, c) = read_str("foo-bar?");
        assert_eq!(gc.symbol_name(c).unwrap().as_ref(), "foo-bar?");
    }

    #[test]
    fn reads_string_with_escapes() {
        let (gc, c) = read_str(r#""a\nb\tc\"""#);
        match gc.kind(c) {
            CellKind::Str(s) => assert_eq!(s.borrow().as_str(), "a\nb\tc\""),
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn reads_octal_escape() {
        let (gc, c) = read_str(r#""\101""#);
        match gc.kind(c) {
            CellKind::Str(s) => assert_eq!(s.borrow().as_str(), "A"),
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn reads_quote_sugar() {
        let (gc, c) = read_str("'x");
        let head = gc.car(c).unwrap();
        assert_eq!(gc.symbol_name(head).unwrap().as_ref(), "quote");
        let arg = gc.car(gc.cdr(c).unwrap()).unwrap();
        assert_eq!(gc.symbol_name(arg).unwrap().as_ref(), "x");
    }

    #[test]
    fn reads_nested_list() {
        let (gc, c) = read_str("(1 (2 3) 4)");
        let items = gc.list_to_vec(c).unwrap();
        assert_eq!(items.len(), 3);
        assert!(matches!(gc.kind(items[0]), CellKind::Integer(1)));
        let inner = gc.list_to_vec(items[1]).unwrap();
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn unbalanced_parens_is_syntax_error() {
        let mut gc = Gc::new();
        let mut interner = Interner::new();
        assert!(read_one_from_str("(1 2", &mut gc, &mut interner).is_err());
    }

    #[test]
    fn unterminated_string_is_syntax_error() {
        let mut gc = Gc::new();
        let mut interner = Interner::new();
        assert!(read_one_from_str("\"unterminated", &mut gc, &mut interner).is_err());
    }

    #[test]
    fn unexpected_close_paren_is_syntax_error() {
        let mut gc = Gc::new();
        let mut interner = Interner::new();
        assert!(read_one_from_str(")", &mut gc, &mut interner).is_err());
    }

    #[test]
    fn nil_and_t_tokens_read_as_the_canonical_singletons() {
        let (gc, c) = read_str("nil");
        assert_eq!(c, gc.nil);
        let (gc, c) = read_str("t");
        assert_eq!(c, gc.tee);
    }

    #[test]
    fn depth_overflow_is_an_error() {
        let mut gc = Gc::new();
        let mut interner = Interner::new();
        let deep = "(".repeat(10) + &")".repeat(10);
        let mut port = Port::string_input(deep);
        let mut reader = Reader::with_depth_limit(&mut port, 3);
        assert!(reader.read(&mut gc, &mut interner).is_err());
    }

    #[test]
    fn reads_multiple_top_level_forms() {
        let mut gc = Gc::new();
        let mut interner = Interner::new();
        let forms = read_all_from_str("1 2 3", &mut gc, &mut interner).unwrap();
        assert_eq!(forms.len(), 3);
    }
}
