//! Subroutine registry and the validation-string mini-language: each
//! space-separated token in a subr's validation string classifies one
//! positional (already-evaluated) argument, checked before the host
//! function runs.

use crate::cell::{Cell, CellKind, SubrId};
use crate::error::{LispError, LispResult};
use crate::gc::Gc;
use crate::interp::Interpreter;

pub type SubrFn = fn(&mut Interpreter, &[Cell]) -> LispResult<Cell>;

pub struct SubrEntry {
    pub name: String,
    pub func: SubrFn,
    pub validation: Option<String>,
    pub doc: Option<String>,
}

#[derive(Default)]
pub struct Registry {
    subrs: Vec<SubrEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        func: SubrFn,
        validation: Option<&str>,
        doc: Option<&str>,
    ) -> SubrId {
        let id = SubrId(self.subrs.len());
        self.subrs.push(SubrEntry {
            name: name.to_string(),
            func,
            validation: validation.map(str::to_string),
            doc: doc.map(str::to_string),
        });
        id
    }

    pub fn entry(&self, id: SubrId) -> &SubrEntry {
        &self.subrs[id.0]
    }
}

/// One token of the validation mini-language.
fn token_matches(gc: &Gc, token: char, arg: Cell) -> bool {
    match token {
        's' => matches!(gc.kind(arg), CellKind::Symbol(_)),
        'd' => matches!(gc.kind(arg), CellKind::Integer(_)),
        'f' => matches!(gc.kind(arg), CellKind::Float(_)),
        'a' => matches!(gc.kind(arg), CellKind::Integer(_) | CellKind::Float(_)),
        'S' => matches!(gc.kind(arg), CellKind::Str(_)),
        'Z' => matches!(gc.kind(arg), CellKind::Symbol(_) | CellKind::Str(_)),
        'c' => gc.is_cons(arg),
        'L' => gc.is_cons(arg) || gc.is_nil(arg),
        'h' => matches!(gc.kind(arg), CellKind::Hash(_)),
        'P' => matches!(gc.kind(arg), CellKind::IoPort(_)),
        'i' | 'o' => matches!(gc.kind(arg), CellKind::IoPort(_)),
        'x' => matches!(
            gc.kind(arg),
            CellKind::Subr(_) | CellKind::Proc(_) | CellKind::FProc(_)
        ),
        'l' => matches!(gc.kind(arg), CellKind::Proc(_) | CellKind::FProc(_)),
        'p' => matches!(gc.kind(arg), CellKind::Proc(_)),
        'r' => matches!(gc.kind(arg), CellKind::Subr(_)),
        'F' => matches!(gc.kind(arg), CellKind::FProc(_)),
        'u' => matches!(gc.kind(arg), CellKind::UserDefined(..)),
        'b' => gc.is_nil(arg) || arg == gc.tee,
        'I' => matches!(gc.kind(arg), CellKind::IoPort(_) | CellKind::Str(_)),
        'C' => matches!(
            gc.kind(arg),
            CellKind::Symbol(_) | CellKind::Str(_) | CellKind::Integer(_)
        ),
        'A' => true,
        _ => false,
    }
}

fn token_description(token: char) -> &'static str {
    match token {
        's' => "symbol",
        'd' => "integer",
        'f' => "float",
        'a' => "integer-or-float",
        'S' => "string",
        'Z' => "symbol-or-string",
        'c' => "cons",
        'L' => "cons-or-nil",
        'h' => "hash",
        'P' => "io-port",
        'i' => "input-port",
        'o' => "output-port",
        'x' => "function",
        'l' => "defined-procedure",
        'p' => "procedure",
        'r' => "subroutine",
        'F' => "f-expr",
        'u' => "user-defined",
        'b' => "t-or-nil",
        'I' => "input-port-or-string",
        'C' => "symbol-string-or-integer",
        'A' => "any-expression",
        _ => "?",
    }
}

/// Validates `args` against the space-separated validation string before
/// the subr runs, raising a descriptive Type error on the first mismatch.
pub fn validate(name: &str, fmt: &str, gc: &Gc, args: &[Cell]) -> LispResult<()> {
    let tokens: Vec<char> = fmt.split_whitespace().filter_map(|t| t.chars().next()).collect();
    if tokens.len() != args.len() {
        return Err(LispError::arity_error(name, tokens.len().to_string(), args.len()));
    }
    for (i, (&token, &arg)) in tokens.iter().zip(args.iter()).enumerate() {
        if !token_matches(gc, token, arg) {
            return Err(LispError::type_error(
                name,
                token_description(token),
                gc.type_name(arg),
                i,
            ));
        }
    }
    Ok(())
}
