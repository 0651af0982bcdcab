//! Interpreter-wide configuration knobs and the REPL driver's CLI surface:
//! version/welcome strings, a single settings struct passed around at
//! startup, and the runtime knobs the evaluator and GC consult — depth
//! cap, lexical-vs-dynamic scope, the GC auto-collect threshold, and
//! `errors_halt`.

use crate::env::ScopeMode;
use clap::Parser;
use std::path::PathBuf;

pub const VERSION: &str = "0.1.0";
pub const WELCOME_MESSAGE: &str = "liblisp 0.1.0";
pub const WELCOME_SUBTITLE: &str = "An embeddable tagged-cell Lisp with mark-and-sweep GC";
pub const WELCOME_FOOTER: &str = "Type (quit) or Ctrl-D to exit.";

/// Default evaluator recursion-depth cap, shared with the reader/printer's
/// own nesting cap in `reader::MAX_DEPTH`.
pub const DEFAULT_MAX_DEPTH: usize = 4096;

/// Runtime knobs an embedder can tune after `Interpreter::new()`: the
/// dynamic-scope flag, the evaluator depth cap, the GC knob, and
/// `errors_halt`. Kept as one struct threaded through construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_depth: usize,
    pub scope_mode: ScopeMode,
    /// Upgrades every non-fatal error to fatal, for strict embedding.
    pub errors_halt: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_depth: DEFAULT_MAX_DEPTH,
            scope_mode: ScopeMode::Lexical,
            errors_halt: false,
        }
    }
}

/// The REPL/script driver's command-line surface. Driver-side only — it
/// owns argv parsing and hands the resulting `Config` to `Interpreter`.
#[derive(Parser, Debug)]
#[command(name = "liblisp")]
#[command(version = VERSION)]
#[command(about = "An embeddable tagged-cell Lisp interpreter")]
#[command(long_about = "A small Lisp interpreter: reader, tree-walking evaluator, \
mark-and-sweep GC, and a REPL driver.")]
pub struct CliArgs {
    /// Script file to execute (optional; starts a REPL if omitted).
    #[arg(value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Evaluator recursion-depth cap before an Overflow error is raised.
    #[arg(long = "max-depth", value_name = "N", default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// Use dynamic scoping instead of the lexical default.
    #[arg(long = "dynamic-scope")]
    pub dynamic_scope: bool,

    /// Upgrade every recoverable error to a fatal halt.
    #[arg(long = "errors-halt")]
    pub errors_halt: bool,

    /// Disable ANSI colour in printed output.
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Pretty-print (indent) printed output.
    #[arg(long = "pretty")]
    pub pretty: bool,
}

impl CliArgs {
    pub fn to_config(&self) -> Config {
        Config {
            max_depth: self.max_depth,
            scope_mode: if self.dynamic_scope {
                ScopeMode::Dynamic
            } else {
                ScopeMode::Lexical
            },
            errors_halt: self.errors_halt,
        }
    }
}
