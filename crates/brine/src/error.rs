//! Typed runtime failures.
//!
//! Failures are not recovered by the interpreter: they abort the current call
//! and surface to the driver (CLI or REPL), which prints a diagnostic and, in
//! the REPL, resumes with the last committed state.

use std::fmt;

use strum::{Display, IntoStaticStr};

use crate::stack::Stack;

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// The failure classes surfaced by the interpreter and builtins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum ErrorKind {
    /// Malformed token or unterminated block.
    ParseError,
    /// A native expected a specific tag and received another.
    TypeError,
    /// Lookup of an unbound name.
    NameError,
    /// Stack too shallow for a native's arity.
    ArityError,
    /// Ill-formed pattern or no pattern matched.
    PatternError,
    /// Commit/rollback without a transaction, or use of a killed box.
    BoxError,
    /// Unknown module or invalid import options.
    ImportError,
    /// Division by zero, malformed fraction, and friends.
    ArithmeticError,
    /// Invariant violation inside the interpreter.
    InternalError,
}

/// A runtime failure with a human-readable reason.
///
/// When a native function fails, the error records the native's name and a
/// snapshot of the stack it saw; the runner renders both in its diagnostic.
#[derive(Debug, Clone)]
pub struct RunError {
    /// The failure class.
    pub kind: ErrorKind,
    /// Human-readable reason.
    pub reason: String,
    /// The active function name, when the failure happened inside a native.
    pub function: Option<String>,
    /// Stack snapshot at the point of failure, for diagnostics.
    pub stack: Option<Stack>,
}

impl RunError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            function: None,
            stack: None,
        }
    }

    pub fn type_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, reason)
    }

    pub fn name_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::NameError, reason)
    }

    pub fn arity_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArityError, reason)
    }

    pub fn pattern_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::PatternError, reason)
    }

    pub fn box_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::BoxError, reason)
    }

    pub fn import_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ImportError, reason)
    }

    pub fn arithmetic_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArithmeticError, reason)
    }

    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, reason)
    }

    /// Attaches the active native's name and stack snapshot, keeping the
    /// innermost attribution if one is already present.
    #[must_use]
    pub(crate) fn in_function(mut self, name: &str, stack: &Stack) -> Self {
        if self.function.is_none() {
            self.function = Some(name.to_owned());
            self.stack = Some(stack.clone());
        }
        self
    }

    /// Renders the full diagnostic the drivers print on failure.
    pub fn diagnostic(&self) -> String {
        let mut out = String::new();
        if let Some(function) = &self.function {
            out.push_str(&format!("Failure in function {function}\n"));
        }
        out.push_str(&format!("Reason: {}: {}", self.kind, self.reason));
        if let Some(stack) = &self.stack {
            out.push_str(&format!("\n> Stack: {}", stack.render()));
        }
        out
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

impl std::error::Error for RunError {}
