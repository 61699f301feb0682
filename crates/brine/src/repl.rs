//! Persistent REPL session support.
//!
//! `ReplSession` keeps interpreter state across `execute()` calls so
//! interactive snippets share bindings. Failed lines leave the last
//! committed state untouched; an unterminated block reports
//! [`ReplError::Incomplete`] so the driver can read continuation lines.

use std::fmt;

use crate::{
    error::RunError,
    parse::{ParseError, parse},
    runner::{boot_state, entry_code},
    state::{ScopeId, State},
    vm,
};

/// Why a REPL line did not commit.
#[derive(Debug)]
pub enum ReplError {
    /// The source ends inside an open block; feed more input and retry.
    Incomplete,
    /// The source does not parse.
    Parse(ParseError),
    /// The program failed at run time.
    Run(RunError),
}

impl fmt::Display for ReplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "input is incomplete"),
            Self::Parse(err) => write!(f, "{err}"),
            Self::Run(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ReplError {}

/// A persistent session executing lines against accumulated state.
///
/// Interactive bindings land in the session's own scope, a persistent child
/// of the global scope, so the well-known scopes stay untouched.
pub struct ReplSession {
    state: State,
    scope_id: ScopeId,
}

impl ReplSession {
    /// A session over a freshly booted state.
    pub fn new() -> Self {
        Self::with_state(boot_state())
    }

    /// A session continuing from an existing state, e.g. after running a
    /// file with `-r`.
    pub fn with_state(state: State) -> Self {
        let scope_id = ScopeId::fresh();
        let parent = state
            .current_scope_id()
            .unwrap_or_else(|_| state.global_scope_id());
        let state = state
            .insert_persistent_scope(Some(parent), scope_id)
            .push_scope_id(scope_id);
        Self { state, scope_id }
    }

    /// Parses and runs one input. On success the resulting state is
    /// committed; on failure the previous state is kept.
    pub fn execute(&mut self, source: &str) -> Result<(), ReplError> {
        let instructions = match parse(source) {
            Ok(instructions) => instructions,
            Err(err) if err.is_eof() => return Err(ReplError::Incomplete),
            Err(err) => return Err(ReplError::Parse(err)),
        };
        let code = entry_code(instructions, "<input>", Some(source));
        match vm::call(self.state.clone(), &code) {
            Ok(state) => {
                self.state = state;
                Ok(())
            }
            Err(err) => Err(ReplError::Run(err)),
        }
    }

    /// The committed state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The session's own binding scope.
    pub fn scope_id(&self) -> ScopeId {
        self.scope_id
    }
}

impl Default for ReplSession {
    fn default() -> Self {
        Self::new()
    }
}
