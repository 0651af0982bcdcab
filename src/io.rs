//! Generic I/O port abstraction unifying file streams, in-memory string
//! buffers, and a null sink, with single-character pushback and the
//! printer's color/pretty flags. Also exposes `tell`/`seek`/`get-delim`/
//! `ferror` for random access and sticky error inspection.

use crate::error::{LispError, LispResult};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Handle into `Interpreter`'s port table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(pub usize);

const INITIAL_BUF_CAP: usize = 64;

enum Backing {
    FileIn(File),
    FileOut(File),
    StringIn { buf: Vec<u8>, pos: usize },
    StringOut { buf: Vec<u8> },
    Null,
}

/// Offset origin for `seek`, matching the `*seek-set*`/`*seek-cur*`/
/// `*seek-end*` symbols exposed to Lisp code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    Start,
    Current,
    End,
}

impl SeekWhence {
    /// `None` on an out-of-range code: the caller raises the Domain error.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(SeekWhence::Start),
            1 => Some(SeekWhence::Current),
            2 => Some(SeekWhence::End),
            _ => None,
        }
    }
}

/// One open I/O port. Input ports support one character of pushback;
/// output ports carry the printer's color/pretty flags so `(set-color!
/// port #t)` etc. can toggle them without a new port type. `error` latches
/// once a backing operation fails, surfaced by `ferror`/`error?` without
/// needing to inspect the propagated `LispError`.
pub struct Port {
    backing: Backing,
    pushback: Option<u8>,
    pub color: bool,
    pub pretty: bool,
    error: bool,
}

impl Port {
    pub fn open_file_read(path: &str) -> LispResult<Self> {
        Ok(Port {
            backing: Backing::FileIn(File::open(path)?),
            pushback: None,
            color: false,
            pretty: false,
            error: false,
        })
    }

    pub fn open_file_write(path: &str, append: bool) -> LispResult<Self> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(Port {
            backing: Backing::FileOut(file),
            pushback: None,
            color: false,
            pretty: false,
            error: false,
        })
    }

    pub fn string_input(contents: impl Into<String>) -> Self {
        Port {
            backing: Backing::StringIn {
                buf: contents.into().into_bytes(),
                pos: 0,
            },
            pushback: None,
            color: false,
            pretty: false,
            error: false,
        }
    }

    pub fn string_output() -> Self {
        Port {
            backing: Backing::StringOut {
                buf: Vec::with_capacity(INITIAL_BUF_CAP),
            },
            pushback: None,
            color: false,
            pretty: false,
            error: false,
        }
    }

    pub fn null() -> Self {
        Port {
            backing: Backing::Null,
            pushback: None,
            color: false,
            pretty: false,
            error: false,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self.backing, Backing::FileIn(_) | Backing::StringIn { .. })
    }

    pub fn is_output(&self) -> bool {
        matches!(
            self.backing,
            Backing::FileOut(_) | Backing::StringOut { .. } | Backing::Null
        )
    }

    /// Returns `None` at end of input.
    pub fn getc(&mut self) -> LispResult<Option<u8>> {
        if let Some(c) = self.pushback.take() {
            return Ok(Some(c));
        }
        let result = match &mut self.backing {
            Backing::FileIn(f) => {
                let mut b = [0u8; 1];
                match f.read(&mut b) {
                    Ok(0) => Ok(None),
                    Ok(_) => Ok(Some(b[0])),
                    Err(e) => Err(LispError::from(e)),
                }
            }
            Backing::StringIn { buf, pos } => {
                if *pos >= buf.len() {
                    Ok(None)
                } else {
                    let c = buf[*pos];
                    *pos += 1;
                    Ok(Some(c))
                }
            }
            _ => Err(LispError::runtime_error("getc", "port is not an input port")),
        };
        if result.is_err() {
            self.error = true;
        }
        result
    }

    /// Reads the next byte without consuming it, using the one-byte
    /// pushback slot so a later `getc` still sees it (grounded in
    /// `subr_getchar`'s lookahead use in `original_source/subr.c`).
    pub fn peekc(&mut self) -> LispResult<Option<u8>> {
        let c = self.getc()?;
        if let Some(b) = c {
            self.ungetc(b);
        }
        Ok(c)
    }

    /// Pushes a single byte back for the next `getc`. Only one byte of
    /// lookahead is guaranteed, matching the reader's needs.
    pub fn ungetc(&mut self, c: u8) {
        self.pushback = Some(c);
    }

    pub fn putc(&mut self, c: u8) -> LispResult<()> {
        self.write_bytes(&[c])
    }

    pub fn write_str(&mut self, s: &str) -> LispResult<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Writes `count` copies of `byte` (grounded in liblisp's repeated
    /// `wputc` use when padding pretty-printer indentation).
    pub fn write_run(&mut self, byte: u8, count: usize) -> LispResult<()> {
        self.write_bytes(&vec![byte; count])
    }

    pub fn write_int(&mut self, n: i64) -> LispResult<()> {
        self.write_str(&n.to_string())
    }

    pub fn write_float(&mut self, f: f64) -> LispResult<()> {
        self.write_str(&crate::printer::format_float(f))
    }

    /// Reads bytes up to and including `delim` (or to EOF), returning
    /// `None` if nothing was read before EOF. With `delim == None`,
    /// reads to EOF. Grounded in `subr_getdelim`.
    pub fn read_line(&mut self, delim: Option<u8>) -> LispResult<Option<String>> {
        let mut out = Vec::new();
        loop {
            match self.getc()? {
                None => break,
                Some(c) => {
                    if Some(c) == delim {
                        break;
                    }
                    out.push(c);
                }
            }
        }
        if out.is_empty() && self.is_eof_pos() {
            Ok(None)
        } else {
            Ok(Some(String::from_utf8_lossy(&out).into_owned()))
        }
    }

    fn is_eof_pos(&self) -> bool {
        match &self.backing {
            Backing::StringIn { buf, pos } => *pos >= buf.len(),
            _ => false,
        }
    }

    /// `#t` once an input port has nothing left to read (string ports
    /// only: file ports report EOF lazily through `getc`'s `None`).
    pub fn is_eof(&mut self) -> LispResult<bool> {
        if self.pushback.is_some() {
            return Ok(false);
        }
        Ok(self.peekc()?.is_none())
    }

    /// Sticky error flag, latched by any failing backing operation and
    /// never cleared automatically.
    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Current byte offset.
    pub fn tell(&mut self) -> LispResult<u64> {
        match &mut self.backing {
            Backing::FileIn(f) => Ok(f.stream_position()?),
            Backing::FileOut(f) => Ok(f.stream_position()?),
            Backing::StringIn { pos, .. } => Ok(*pos as u64),
            Backing::StringOut { buf } => Ok(buf.len() as u64),
            Backing::Null => Ok(0),
        }
    }

    /// Repositions the port by `SeekWhence`; an invalid whence is the
    /// caller's responsibility to reject before calling.
    pub fn seek(&mut self, offset: i64, whence: SeekWhence) -> LispResult<u64> {
        let from = match whence {
            SeekWhence::Start => SeekFrom::Start(offset.max(0) as u64),
            SeekWhence::Current => SeekFrom::Current(offset),
            SeekWhence::End => SeekFrom::End(offset),
        };
        self.pushback = None;
        match &mut self.backing {
            Backing::FileIn(f) => Ok(f.seek(from)?),
            Backing::FileOut(f) => Ok(f.seek(from)?),
            Backing::StringIn { buf, pos } => {
                *pos = seek_in_slice(buf.len(), *pos, offset, whence)?;
                Ok(*pos as u64)
            }
            Backing::StringOut { buf } => {
                let new_pos = seek_in_slice(buf.len(), buf.len(), offset, whence)?;
                Ok(new_pos as u64)
            }
            Backing::Null => Ok(0),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> LispResult<()> {
        let result = match &mut self.backing {
            Backing::FileOut(f) => f.write_all(bytes).map_err(LispError::from),
            Backing::StringOut { buf } => {
                if buf.len() + bytes.len() > buf.capacity() {
                    buf.reserve(buf.capacity().max(bytes.len()));
                }
                buf.extend_from_slice(bytes);
                Ok(())
            }
            Backing::Null => Ok(()),
            _ => Err(LispError::runtime_error("putc", "port is not an output port")),
        };
        if result.is_err() {
            self.error = true;
        }
        result
    }

    /// Contents accumulated by a string-output port.
    pub fn take_string(&self) -> Option<String> {
        match &self.backing {
            Backing::StringOut { buf } => Some(String::from_utf8_lossy(buf).into_owned()),
            _ => None,
        }
    }

    pub fn flush(&mut self) -> LispResult<()> {
        match &mut self.backing {
            Backing::FileOut(f) => Ok(f.flush()?),
            _ => Ok(()),
        }
    }
}

fn seek_in_slice(len: usize, pos: usize, offset: i64, whence: SeekWhence) -> LispResult<usize> {
    let base = match whence {
        SeekWhence::Start => 0i64,
        SeekWhence::Current => pos as i64,
        SeekWhence::End => len as i64,
    };
    let target = base + offset;
    if target < 0 {
        return Err(LispError::runtime_error("seek", "resulting offset is negative"));
    }
    Ok((target as usize).min(len))
}

// The process's real stdout/stderr are written through directly
// (`print!`/`eprintln!`) by `interp.rs`/`builtins.rs` rather than wrapped
// as a `Port`; `Port` models the file/string/null streams an embedder or
// Lisp program opens explicitly.

pub fn stdin_read_line() -> io::Result<String> {
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}
