//! Transaction scope around a single operation.
//!
//! Opening a [`Transaction`] checkpoints incoming and copies it into the
//! working buffer. An operation either emits elements, which are staged, or
//! holds a lazy sequence built over working, which is only read when its
//! results are. The end of the transaction always lands staged and held
//! output in holding and commits holding to outgoing: on success, on an
//! early `?` return and on unwinding. Partial output of a failed operation
//! is committed too.

use std::rc::Rc;

use crate::buffer::Buffers;
use crate::history::History;
use crate::tee::LazySeq;
use crate::trace::Tally;

pub struct Transaction<'a, T: Clone + 'static> {
    buffers: &'a mut Buffers<T>,
    staged: Vec<T>,
    tally: Rc<Tally>,
}

impl<'a, T: Clone + 'static> Transaction<'a, T> {
    /// Takes the implicit checkpoint and promotes incoming to working.
    pub fn begin(buffers: &'a mut Buffers<T>, history: &mut History<T>) -> Self {
        history.push(buffers, false, false);
        buffers.promote_to_working();
        Transaction {
            buffers,
            staged: Vec::new(),
            tally: Rc::new(Tally::default()),
        }
    }

    /// The working sequence. A second call yields the empty sequence.
    pub fn working(&mut self) -> Working<T> {
        Working {
            seq: self.buffers.take_working(),
            tally: Rc::clone(&self.tally),
        }
    }

    /// Stages one produced element.
    pub fn emit(&mut self, item: T) {
        self.tally.count_emitted();
        self.staged.push(item);
    }

    pub fn emit_all<I: IntoIterator<Item = T>>(&mut self, items: I) {
        for item in items {
            self.emit(item);
        }
    }

    /// Queues `items` after everything produced so far, without reading
    /// them.
    pub fn hold<I>(&mut self, items: I)
    where
        I: Iterator<Item = T> + 'static,
    {
        self.flush();
        self.buffers.push_holding(Counted {
            items,
            tally: Rc::clone(&self.tally),
        });
    }

    /// Counters of this operation, shared with its held output.
    pub fn tally(&self) -> Rc<Tally> {
        Rc::clone(&self.tally)
    }

    fn flush(&mut self) {
        if !self.staged.is_empty() {
            let staged = std::mem::take(&mut self.staged);
            self.buffers.push_holding(staged);
        }
    }
}

impl<T: Clone + 'static> Drop for Transaction<'_, T> {
    fn drop(&mut self) {
        self.flush();
        self.buffers.commit_from_holding();
    }
}

/// Working buffer handed to an operation; counts what the operation reads.
pub struct Working<T: Clone + 'static> {
    seq: LazySeq<T>,
    tally: Rc<Tally>,
}

impl<T: Clone + 'static> Iterator for Working<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.seq.next()?;
        self.tally.count_consumed();
        Some(item)
    }
}

/// Held output; counts what is read from it.
struct Counted<I> {
    items: I,
    tally: Rc<Tally>,
}

impl<I: Iterator> Iterator for Counted<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        let item = self.items.next()?;
        self.tally.count_emitted();
        Some(item)
    }
}
