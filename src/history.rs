//! Snapshot history of the incoming buffer.
//!
//! Every checkpoint is a fork of `incoming` taken at push time, so later
//! insertions and operations never show up in it. Two pins sit beside the
//! stack: `baseline`, the reference state query mode returns to, and
//! `original`, the state the session started from.

use crate::buffer::Buffers;
use crate::tee::LazySeq;

/// Where [`History::undo`] restores incoming from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restore {
    /// Discard this many newer checkpoints, then restore the next one.
    /// `Steps(0)` restores the most recent checkpoint.
    Steps(usize),
    /// Restore the baseline and reset the history and both pins.
    Baseline,
    /// Restore the original and reset the history and the baseline.
    Original,
}

pub struct History<T: Clone + 'static> {
    /// Oldest first; the newest checkpoint is at the end.
    entries: Vec<LazySeq<T>>,
    baseline: Option<LazySeq<T>>,
    original: Option<LazySeq<T>>,
}

impl<T: Clone + 'static> History<T> {
    pub fn new() -> Self {
        History {
            entries: Vec::new(),
            baseline: None,
            original: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    #[cfg(test)]
    pub fn has_original(&self) -> bool {
        self.original.is_some()
    }

    /// Checkpoints `incoming`.
    ///
    /// The pins are only taken when the history already held a checkpoint,
    /// so an empty starting state is never pinned by a snapshot.
    pub fn push(&mut self, buffers: &Buffers<T>, as_baseline: bool, as_original: bool) {
        let had_entries = !self.entries.is_empty();
        let checkpoint = buffers.incoming().fork();
        if had_entries && as_baseline {
            self.baseline = Some(checkpoint.fork());
        }
        if had_entries && as_original {
            self.original = Some(checkpoint.fork());
        }
        self.entries.push(checkpoint);
    }

    /// Pins the current incoming as the baseline, regardless of history.
    pub fn pin_baseline(&mut self, buffers: &Buffers<T>) {
        self.baseline = Some(buffers.incoming().fork());
    }

    /// Pins the current incoming as the original, regardless of history.
    pub fn pin_original(&mut self, buffers: &Buffers<T>) {
        self.original = Some(buffers.incoming().fork());
    }

    /// Clears every buffer, then restores incoming from `target`.
    ///
    /// A missing target leaves incoming empty: undoing with nothing to undo
    /// silently discards the current buffers.
    pub fn undo(&mut self, buffers: &mut Buffers<T>, target: Restore) {
        buffers.clear_all();
        match target {
            Restore::Baseline => {
                if let Some(baseline) = self.baseline.take() {
                    buffers.replace_incoming(baseline);
                }
                self.entries.clear();
                self.original = None;
            }
            Restore::Original => {
                if let Some(original) = &self.original {
                    buffers.replace_incoming(original.fork());
                }
                self.entries.clear();
                self.baseline = None;
            }
            Restore::Steps(steps_back) => {
                if self.entries.is_empty() {
                    return;
                }
                let keep = self.entries.len().saturating_sub(steps_back);
                self.entries.truncate(keep);
                if let Some(checkpoint) = self.entries.pop() {
                    buffers.replace_incoming(checkpoint);
                }
            }
        }
    }

    /// Restores incoming from the baseline (or the original when no
    /// baseline is pinned) without giving up the pin, and drops the
    /// checkpoints taken since. Returns false when neither pin exists.
    pub fn revert(&mut self, buffers: &mut Buffers<T>) -> bool {
        let Some(pin) = self.baseline.as_ref().or(self.original.as_ref()) else {
            return false;
        };
        let restored = pin.fork();
        buffers.clear_all();
        buffers.replace_incoming(restored);
        self.entries.clear();
        true
    }

    /// Forgets every checkpoint and both pins.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.baseline = None;
        self.original = None;
    }
}

impl<T: Clone + 'static> Default for History<T> {
    fn default() -> Self {
        History::new()
    }
}
