//! Output abstraction for the `print` family of natives.
//!
//! Natives write through a thread-local [`PrintWriter`], which defaults to
//! stdout. Tests and embedders install a different writer with
//! [`install_writer`]; the returned guard restores the previous writer when
//! dropped. Each `run-concurrently` thread starts with the default writer.

use std::{
    cell::RefCell,
    io::{self, Write as _},
    sync::{Arc, Mutex},
};

/// Sink for program output.
pub trait PrintWriter: Send {
    /// Writes a fragment of output, no trailing newline.
    fn write_out(&mut self, text: &str);

    /// Writes a full line of output.
    fn write_line(&mut self, text: &str) {
        self.write_out(text);
        self.write_out("\n");
    }
}

/// Default writer: line-buffered stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_out(&mut self, text: &str) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Writer that collects all output into a shared string.
///
/// Cloning shares the buffer, so a test can keep one handle, install the
/// other, and read the output afterwards.
#[derive(Debug, Clone, Default)]
pub struct CollectStringPrint {
    buffer: Arc<Mutex<String>>,
}

impl CollectStringPrint {
    pub fn new() -> Self {
        Self::default()
    }

    /// The output collected so far.
    pub fn output(&self) -> String {
        self.buffer.lock().expect("print buffer poisoned").clone()
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_out(&mut self, text: &str) {
        self.buffer.lock().expect("print buffer poisoned").push_str(text);
    }
}

/// Writer that ignores all output. Useful for benchmarks and tests that only
/// care about the final stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_out(&mut self, _text: &str) {}
}

thread_local! {
    static CURRENT_WRITER: RefCell<Option<Box<dyn PrintWriter>>> = const { RefCell::new(None) };
}

/// Restores the previously installed writer on drop.
pub struct WriterGuard {
    previous: Option<Box<dyn PrintWriter>>,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        CURRENT_WRITER.with(|current| {
            *current.borrow_mut() = self.previous.take();
        });
    }
}

/// Routes this thread's program output through `writer` until the returned
/// guard is dropped.
#[must_use]
pub fn install_writer(writer: Box<dyn PrintWriter>) -> WriterGuard {
    CURRENT_WRITER.with(|current| WriterGuard {
        previous: current.borrow_mut().replace(writer),
    })
}

/// Runs `f` against the thread's current writer (stdout when none is
/// installed).
pub(crate) fn with_writer(f: impl FnOnce(&mut dyn PrintWriter)) {
    CURRENT_WRITER.with(|current| {
        let mut current = current.borrow_mut();
        match current.as_mut() {
            Some(writer) => f(writer.as_mut()),
            None => f(&mut StdPrint),
        }
    });
}
