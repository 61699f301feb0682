//! Per-instruction tracing middleware.
//!
//! The interpreter accepts a [`Middleware`] hook invoked on every instruction
//! with the instruction and the stacks before and after it. Hooks are pure
//! observers: they receive shared references and cannot mutate interpreter
//! state. [`NoopMiddleware`] is the zero-cost default; the other
//! implementations cover interactive debugging and post-mortem analysis.

use crate::{stack::Stack, value::Instruction};

/// Hook invoked on every executed instruction.
///
/// The default implementation does nothing, so [`NoopMiddleware`] needs no
/// code of its own.
pub trait Middleware {
    /// Called after each instruction with the stack before and after it.
    /// Instructions are observed in execution order.
    #[inline]
    fn on_instruction(&mut self, _instruction: &Instruction, _before: &Stack, _after: &Stack) {}
}

/// Middleware that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl Middleware for NoopMiddleware {}

/// Middleware that prints a human-readable execution log to stderr.
///
/// Output format:
/// ```text
/// put              [] -> [1]
/// call-by-name +   [1 2] -> [1 2]
/// ```
///
/// Useful for interactive debugging — pipe stderr to a file while stdout
/// shows normal program output.
#[derive(Debug, Default)]
pub struct StderrMiddleware {
    /// Stop tracing after this many instructions (prevents runaway output on
    /// loops). `None` means unlimited.
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracer that stops after `limit` instructions.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl Middleware for StderrMiddleware {
    fn on_instruction(&mut self, instruction: &Instruction, before: &Stack, after: &Stack) {
        if self.stopped {
            return;
        }
        let detail = match instruction {
            Instruction::CallByName(name) => format!(" {name}"),
            Instruction::Put(value) => format!(" {value}"),
            Instruction::MakeVec(n) => format!(" {n}"),
            _ => String::new(),
        };
        eprintln!(
            "{:<14}{detail}  {} -> {}",
            instruction.op_name(),
            before.render(),
            after.render()
        );
        self.count += 1;
        if let Some(limit) = self.limit {
            if self.count >= limit {
                eprintln!("--- trace limit reached ({limit} instructions) ---");
                self.stopped = true;
            }
        }
    }
}

/// One recorded execution step.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Short operation name of the instruction.
    pub op: &'static str,
    /// Stack depth before the instruction.
    pub depth_before: usize,
    /// Stack depth after the instruction.
    pub depth_after: usize,
    /// Rendering of the top of the stack after the instruction, if any.
    pub top_after: Option<String>,
}

/// Middleware that records every step for post-mortem analysis.
///
/// This is the most expensive tracer (it allocates per event), so use it for
/// short executions or debugging specific programs.
#[derive(Debug, Default)]
pub struct RecordingMiddleware {
    events: Vec<TraceEvent>,
    limit: Option<usize>,
}

impl RecordingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that stops recording after `limit` events.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl Middleware for RecordingMiddleware {
    fn on_instruction(&mut self, instruction: &Instruction, before: &Stack, after: &Stack) {
        if self.limit.is_some_and(|limit| self.events.len() >= limit) {
            return;
        }
        self.events.push(TraceEvent {
            op: instruction.op_name(),
            depth_before: before.depth(),
            depth_after: after.depth(),
            top_after: after.peek().map(ToString::to_string),
        });
    }
}
