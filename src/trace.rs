//! Operation traces and debug callbacks.
//!
//! Every operation a chain applies keeps a [`Tally`] that its lazily
//! produced output keeps counting into; [`OpTrace`] is a reading of it.
//! Callers that want to watch operations as they are applied install
//! [`DebugCallbacks`].

use std::cell::Cell;
use std::fmt;

/// Callback type for operation start events: `(op_index, op_name)`.
type OpStartCallback = Box<dyn Fn(usize, &str) + 'static>;
/// Callback type for operation complete events.
type OpCompleteCallback = Box<dyn Fn(&OpTrace) + 'static>;

/// Debug callbacks invoked around each operation.
#[derive(Default)]
pub struct DebugCallbacks {
    pub on_op_start: Option<OpStartCallback>,
    pub on_op_complete: Option<OpCompleteCallback>,
}

impl DebugCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start<F: Fn(usize, &str) + 'static>(mut self, f: F) -> Self {
        self.on_op_start = Some(Box::new(f));
        self
    }

    pub fn on_complete<F: Fn(&OpTrace) + 'static>(mut self, f: F) -> Self {
        self.on_op_complete = Some(Box::new(f));
        self
    }

    pub(crate) fn start(&self, index: usize, name: &str) {
        if let Some(on_start) = &self.on_op_start {
            on_start(index, name);
        }
    }

    pub(crate) fn complete(&self, trace: &OpTrace) {
        if let Some(on_complete) = &self.on_op_complete {
            on_complete(trace);
        }
    }
}

/// Live counters of one operation.
#[derive(Debug, Default)]
pub struct Tally {
    consumed: Cell<usize>,
    emitted: Cell<usize>,
    failed: Cell<bool>,
}

impl Tally {
    pub fn consumed(&self) -> usize {
        self.consumed.get()
    }

    pub fn emitted(&self) -> usize {
        self.emitted.get()
    }

    pub fn failed(&self) -> bool {
        self.failed.get()
    }

    pub(crate) fn count_consumed(&self) {
        self.consumed.set(self.consumed.get() + 1);
    }

    pub(crate) fn count_emitted(&self) {
        self.emitted.set(self.emitted.get() + 1);
    }

    pub(crate) fn fail(&self) {
        self.failed.set(true);
    }

    /// The counters as they stand now.
    pub fn reading(&self, index: usize, name: &'static str) -> OpTrace {
        OpTrace {
            index,
            name,
            consumed: self.consumed(),
            emitted: self.emitted(),
            failed: self.failed(),
        }
    }
}

/// Record of one applied operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpTrace {
    /// Position of the operation since the trace was last cleared.
    pub index: usize,
    pub name: &'static str,
    /// Working elements the operation has read so far.
    pub consumed: usize,
    /// Elements it has produced into outgoing so far.
    pub emitted: usize,
    pub failed: bool,
}

impl fmt::Display for OpTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} -> {}",
            self.index, self.name, self.consumed, self.emitted
        )?;
        if self.failed {
            f.write_str(" (failed)")?;
        }
        Ok(())
    }
}
