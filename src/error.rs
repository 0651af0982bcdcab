//! Error types produced by the reader, evaluator, and embedder-facing API.

use thiserror::Error;

/// The interpreter's error kinds: type/arity/unbound/not-callable mistakes,
/// reader and I/O failures, depth overflow, the async interrupt signal, and
/// unrecoverable faults.
#[derive(Error, Debug, Clone)]
pub enum LispError {
    #[error("{function}: expected {expected}, got {actual} at argument {position}")]
    TypeError {
        function: String,
        expected: String,
        actual: String,
        position: usize,
    },

    #[error("{function}: expected {expected} argument{}, got {actual}", if expected == "1" { "" } else { "s" })]
    ArityError {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("unbound symbol: {0}")]
    UnboundSymbol(String),

    #[error("value is not callable: {0}")]
    NotCallable(String),

    #[error("read error: {0}")]
    ReadError(String),

    #[error("nesting depth exceeded ({0})")]
    DepthExceeded(usize),

    #[error("{function}: {message}")]
    RuntimeError { function: String, message: String },

    #[error("{message}")]
    ValidationError { message: String },

    #[error("io error: {0}")]
    IoError(String),

    /// The interrupt flag was set between evaluation steps.
    #[error("interrupted by signal")]
    Signal,

    /// Out-of-memory or an internal invariant breach; always upgrades to
    /// a halt regardless of `errors_halt`.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl LispError {
    pub fn type_error(function: &str, expected: &str, actual: &str, position: usize) -> Self {
        LispError::TypeError {
            function: function.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            position,
        }
    }

    pub fn arity_error(function: &str, expected: impl Into<String>, actual: usize) -> Self {
        LispError::ArityError {
            function: function.to_string(),
            expected: expected.into(),
            actual,
        }
    }

    pub fn runtime_error(function: &str, message: impl Into<String>) -> Self {
        LispError::RuntimeError {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        LispError::ValidationError {
            message: message.into(),
        }
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        LispError::UnboundSymbol(name.into())
    }

    /// True for the kinds that the REPL recovers from; `Fatal` is the
    /// only kind that always terminates the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LispError::Fatal(_))
    }
}

impl From<std::io::Error> for LispError {
    fn from(e: std::io::Error) -> Self {
        LispError::IoError(e.to_string())
    }
}

pub type LispResult<T> = Result<T, LispError>;
