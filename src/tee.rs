//! Replayable lazy sequences.
//!
//! A [`LazySeq`] reads from one or more logs. A log is an append-only store
//! shared by every handle derived from it: it owns the source iterators
//! (segments, read one after the other) and buffers only the elements that
//! some handle has not read yet. A handle is a cursor into the log (an
//! absolute position) plus a limit: the number of segments it sees.
//!
//! Duplicating a handle adds a cursor to the same log instead of stacking
//! another layer, and the buffer is trimmed from the front as soon as the
//! slowest live cursor moves past an element, so memory is proportional to
//! the gap between the fastest and slowest readers. Appending to a handle
//! adds a segment to its log that only this handle sees, as long as no
//! other live handle sees further; otherwise the handle continues into a
//! fresh log. Either way a sequence is a flat list of logs and reading it
//! never recurses through earlier duplications.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;

type Segment<T> = Box<dyn Iterator<Item = T>>;

/// Ordered multiset of positions.
#[derive(Default)]
struct Counts(BTreeMap<usize, usize>);

impl Counts {
    fn insert(&mut self, at: usize) {
        *self.0.entry(at).or_default() += 1;
    }

    fn remove(&mut self, at: usize) {
        if let Some(count) = self.0.get_mut(&at) {
            *count -= 1;
            if *count == 0 {
                self.0.remove(&at);
            }
        }
    }

    fn min(&self) -> Option<usize> {
        self.0.keys().next().copied()
    }

    fn max(&self) -> Option<usize> {
        self.0.keys().next_back().copied()
    }
}

#[derive(Clone, Copy)]
struct Cursor {
    position: usize,
    limit: usize,
}

struct Log<T> {
    /// Sources in read order; `None` once exhausted.
    segments: VecDeque<Option<Segment<T>>>,
    /// End position of every exhausted segment, in order. The segment being
    /// read is always `segments[bounds.len()]`.
    bounds: Vec<usize>,
    /// Elements from absolute position `base` onwards.
    buffer: VecDeque<T>,
    base: usize,
    cursors: Vec<Option<Cursor>>,
    free: Vec<usize>,
    positions: Counts,
    limits: Counts,
    live: usize,
}

impl<T: Clone> Log<T> {
    fn new(source: Segment<T>) -> Self {
        Log {
            segments: VecDeque::from([Some(source)]),
            bounds: Vec::new(),
            buffer: VecDeque::new(),
            base: 0,
            cursors: Vec::new(),
            free: Vec::new(),
            positions: Counts::default(),
            limits: Counts::default(),
            live: 0,
        }
    }

    fn attach(&mut self, cursor: Cursor) -> usize {
        self.positions.insert(cursor.position);
        self.limits.insert(cursor.limit);
        self.live += 1;
        match self.free.pop() {
            Some(slot) => {
                self.cursors[slot] = Some(cursor);
                slot
            }
            None => {
                self.cursors.push(Some(cursor));
                self.cursors.len() - 1
            }
        }
    }

    fn release(&mut self, slot: usize) {
        if let Some(cursor) = self.cursors.get_mut(slot).and_then(Option::take) {
            self.positions.remove(cursor.position);
            self.limits.remove(cursor.limit);
            self.live -= 1;
            self.free.push(slot);
            self.trim();
        }
    }

    fn cursor(&self, slot: usize) -> Option<Cursor> {
        self.cursors.get(slot).copied().flatten()
    }

    fn frontier(&self) -> usize {
        self.base + self.buffer.len()
    }

    fn fetch(&mut self, slot: usize) -> Option<T> {
        let Cursor { position, limit } = self.cursor(slot)?;
        loop {
            if limit == 0 {
                return None;
            }
            if let Some(&end) = self.bounds.get(limit - 1)
                && position >= end
            {
                return None;
            }
            if let Some(item) = self.buffer.get(position - self.base) {
                let item = item.clone();
                self.advance(slot, position);
                return Some(item);
            }
            let reading = self.bounds.len();
            let pulled = self
                .segments
                .get_mut(reading)
                .and_then(Option::as_mut)
                .and_then(|segment| segment.next());
            match pulled {
                Some(item) => self.buffer.push_back(item),
                None if reading < self.segments.len() => {
                    self.segments[reading] = None;
                    let end = self.frontier();
                    self.bounds.push(end);
                }
                None => return None,
            }
        }
    }

    fn advance(&mut self, slot: usize, from: usize) {
        if let Some(cursor) = self.cursors.get_mut(slot).and_then(Option::as_mut) {
            cursor.position = from + 1;
        }
        self.positions.remove(from);
        self.positions.insert(from + 1);
        self.trim();
    }

    fn set_limit(&mut self, slot: usize, limit: usize) {
        if let Some(cursor) = self.cursors.get_mut(slot).and_then(Option::as_mut) {
            self.limits.remove(cursor.limit);
            self.limits.insert(limit);
            cursor.limit = limit;
        }
    }

    /// Drops every buffered element that all live cursors have passed.
    fn trim(&mut self) {
        let slowest = self.positions.min().unwrap_or_else(|| self.frontier());
        while self.base < slowest && self.buffer.pop_front().is_some() {
            self.base += 1;
        }
    }

    /// Forgets the segments from `limit` on, with anything already pulled
    /// from them.
    fn truncate(&mut self, limit: usize) {
        if let Some(&end) = self.bounds.get(limit - 1) {
            self.buffer.truncate(end - self.base);
            self.bounds.truncate(limit);
        }
        self.segments.truncate(limit);
    }

    /// Adds `tail` as a segment seen by `slot` alone. Refused (and handed
    /// back) when another live cursor sees past this one.
    fn append(&mut self, slot: usize, tail: Segment<T>) -> Result<(), Segment<T>> {
        let Some(cursor) = self.cursor(slot) else {
            return Err(tail);
        };
        if cursor.limit == 0 || self.limits.max() != Some(cursor.limit) {
            return Err(tail);
        }
        self.truncate(cursor.limit);
        self.segments.push_back(Some(tail));
        self.set_limit(slot, cursor.limit + 1);
        Ok(())
    }

    /// Puts `head` in front of every segment. Only possible while `slot`
    /// is the sole cursor and nothing has been pulled.
    fn prepend(&mut self, slot: usize, head: Segment<T>) -> Result<(), Segment<T>> {
        let Some(cursor) = self.cursor(slot) else {
            return Err(head);
        };
        let untouched = self.base == 0 && self.buffer.is_empty() && self.bounds.is_empty();
        if self.live != 1 || !untouched {
            return Err(head);
        }
        self.segments.push_front(Some(head));
        self.set_limit(slot, cursor.limit + 1);
        Ok(())
    }
}

/// One cursor into a shared log.
struct View<T: Clone> {
    log: Rc<RefCell<Log<T>>>,
    slot: usize,
}

impl<T: Clone> View<T> {
    fn open(source: Segment<T>) -> Self {
        let mut log = Log::new(source);
        let slot = log.attach(Cursor {
            position: 0,
            limit: 1,
        });
        View {
            log: Rc::new(RefCell::new(log)),
            slot,
        }
    }

    fn fork(&self) -> Self {
        let mut log = self.log.borrow_mut();
        let cursor = log.cursor(self.slot).unwrap_or(Cursor {
            position: log.frontier(),
            limit: 0,
        });
        let slot = log.attach(cursor);
        View {
            log: Rc::clone(&self.log),
            slot,
        }
    }
}

impl<T: Clone> Drop for View<T> {
    fn drop(&mut self) {
        if let Ok(mut log) = self.log.try_borrow_mut() {
            log.release(self.slot);
        }
    }
}

/// A lazily evaluated, duplicable sequence handle.
///
/// Reading a handle (through [`Iterator`]) never advances any other handle,
/// even one that shares the same source.
pub struct LazySeq<T: Clone + 'static> {
    views: VecDeque<View<T>>,
}

impl<T: Clone + 'static> LazySeq<T> {
    /// The empty sequence.
    pub fn empty() -> Self {
        LazySeq {
            views: VecDeque::new(),
        }
    }

    /// Wraps any iterator. Nothing is pulled from it until a handle reads.
    pub fn new<I>(source: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        LazySeq {
            views: VecDeque::from([View::open(Box::new(source.into_iter()))]),
        }
    }

    /// Splits this handle into two independent handles positioned where
    /// this one was.
    pub fn duplicate(self) -> (Self, Self) {
        let other = self.fork();
        (self, other)
    }

    /// A new handle at this handle's position, leaving this one readable.
    pub fn fork(&self) -> Self {
        LazySeq {
            views: self.views.iter().map(View::fork).collect(),
        }
    }

    /// True when this handle was never attached to a source.
    pub fn is_unattached(&self) -> bool {
        self.views.is_empty()
    }

    /// Elements currently retained for slower readers of the same sources.
    pub fn buffered(&self) -> usize {
        self.views
            .iter()
            .map(|view| view.log.borrow().buffer.len())
            .sum()
    }

    /// Number of elements left, counted on a fork so this handle stays put.
    ///
    /// Never returns for an infinite source.
    pub fn remaining(&self) -> usize {
        self.fork().count()
    }

    /// Remaining elements, collected from a fork.
    pub fn snapshot_vec(&self) -> Vec<T> {
        self.fork().collect()
    }

    /// This sequence followed by `tail`, still lazy.
    pub fn followed_by<I>(mut self, tail: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let tail: Segment<T> = Box::new(tail.into_iter());
        let rejected = match self.views.back() {
            Some(last) => last.log.borrow_mut().append(last.slot, tail).err(),
            None => Some(tail),
        };
        if let Some(tail) = rejected {
            self.views.push_back(View::open(tail));
        }
        self
    }

    /// `head` followed by this sequence, still lazy.
    pub fn preceded_by<I>(mut self, head: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let head: Segment<T> = Box::new(head.into_iter());
        let rejected = match self.views.front() {
            Some(first) => first.log.borrow_mut().prepend(first.slot, head).err(),
            None => Some(head),
        };
        if let Some(head) = rejected {
            self.views.push_front(View::open(head));
        }
        self
    }
}

impl<T: Clone + 'static> Default for LazySeq<T> {
    fn default() -> Self {
        LazySeq::empty()
    }
}

impl<T: Clone + 'static> From<Vec<T>> for LazySeq<T> {
    fn from(items: Vec<T>) -> Self {
        if items.is_empty() {
            LazySeq::empty()
        } else {
            LazySeq::new(items)
        }
    }
}

impl<T: Clone + 'static> Iterator for LazySeq<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            let view = self.views.front()?;
            let item = view.log.borrow_mut().fetch(view.slot);
            if item.is_some() {
                return item;
            }
            if self.views.len() == 1 {
                return None;
            }
            self.views.pop_front();
        }
    }
}

impl<T: Clone + 'static> fmt::Debug for LazySeq<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySeq")
            .field("logs", &self.views.len())
            .field("buffered", &self.buffered())
            .finish()
    }
}
