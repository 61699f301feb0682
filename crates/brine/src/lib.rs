#![doc = include_str!("../../../README.md")]

mod ast;
mod case;
mod error;
mod intern;
mod io;
mod lex;
mod modules;
mod natives;
mod parse;
mod prelude;
mod repl;
mod retain;
mod runner;
mod stack;
mod state;
mod trace;
mod value;
mod vm;

pub use crate::{
    ast::{AstNode, DiscoveredImport, find_imports, parse_ast},
    error::{ErrorKind, RunError, RunResult},
    intern::{AtomId, atom, atom_bool, atom_label},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint, WriterGuard, install_writer},
    lex::{Token, TokenKind, lex, significant, unescape_string},
    parse::{ParseError, ParseErrorKind, parse},
    repl::{ReplError, ReplSession},
    runner::{boot_state, run, run_source, run_source_with_middleware, run_with_middleware},
    stack::{Stack, StackIter},
    state::{BoxId, Scope, ScopeId, ScopeStack, State},
    trace::{Middleware, NoopMiddleware, RecordingMiddleware, StderrMiddleware, TraceEvent},
    value::{Code, CodeFlag, Instruction, NativeFunction, Value, render_source},
    vm::{call, call_with_middleware},
};
