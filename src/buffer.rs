//! The four buffers of a chain and the transitions between them.
//!
//! `incoming` holds the things waiting to be transformed, `working` is what
//! an operation in progress reads, `holding` is what it has produced so far
//! and `outgoing` is the result of the last committed operation. Outside a
//! transaction `working` and `holding` are always empty.

use crate::tee::LazySeq;

pub struct Buffers<T: Clone + 'static> {
    incoming: LazySeq<T>,
    working: LazySeq<T>,
    holding: LazySeq<T>,
    outgoing: LazySeq<T>,
}

impl<T: Clone + 'static> Buffers<T> {
    pub fn new() -> Self {
        Buffers {
            incoming: LazySeq::empty(),
            working: LazySeq::empty(),
            holding: LazySeq::empty(),
            outgoing: LazySeq::empty(),
        }
    }

    pub fn with_incoming(incoming: LazySeq<T>) -> Self {
        Buffers {
            incoming,
            ..Buffers::new()
        }
    }

    pub fn incoming(&self) -> &LazySeq<T> {
        &self.incoming
    }

    pub fn outgoing(&self) -> &LazySeq<T> {
        &self.outgoing
    }

    /// True while no operation is in flight.
    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.working.is_unattached() && self.holding.is_unattached()
    }

    pub fn replace_incoming(&mut self, incoming: LazySeq<T>) {
        self.incoming = incoming;
    }

    /// Appends `items` after the current incoming things.
    pub fn extend_incoming<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let current = std::mem::take(&mut self.incoming);
        self.incoming = current.followed_by(items);
    }

    /// Places `items` ahead of the current incoming things, last item
    /// first.
    pub fn extend_incoming_front<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut head: Vec<T> = items.into_iter().collect();
        head.reverse();
        let current = std::mem::take(&mut self.incoming);
        self.incoming = current.preceded_by(head);
    }

    /// Splits incoming into itself and a working copy.
    pub fn promote_to_working(&mut self) {
        self.working = self.incoming.fork();
    }

    /// Hands the working copy to the operation in progress.
    pub fn take_working(&mut self) -> LazySeq<T> {
        std::mem::take(&mut self.working)
    }

    /// Appends produced elements to holding, still lazy.
    pub fn push_holding<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let current = std::mem::take(&mut self.holding);
        self.holding = current.followed_by(items);
    }

    /// Makes holding the new outgoing and resets the transient buffers.
    pub fn commit_from_holding(&mut self) {
        self.outgoing = std::mem::take(&mut self.holding);
        self.working = LazySeq::empty();
    }

    /// Copies outgoing into incoming; outgoing stays readable.
    pub fn rebalance_out_to_in(&mut self) {
        self.incoming = self.outgoing.fork();
    }

    /// Copies incoming into outgoing; incoming stays readable.
    pub fn rebalance_in_to_out(&mut self) {
        self.outgoing = self.incoming.fork();
    }

    /// Compares forks of incoming and outgoing element by element.
    ///
    /// Never returns if both sides are infinite and equal.
    pub fn is_balanced(&self) -> bool
    where
        T: PartialEq,
    {
        self.incoming.fork().eq(self.outgoing.fork())
    }

    /// Remaining outgoing elements without consuming them.
    pub fn peek_outgoing(&self) -> Vec<T> {
        self.outgoing.snapshot_vec()
    }

    /// Drains outgoing.
    pub fn take_outgoing(&mut self) -> Vec<T> {
        std::mem::take(&mut self.outgoing).collect()
    }

    pub fn clear_all(&mut self) {
        *self = Buffers::new();
    }

    pub fn clear_incoming(&mut self) {
        self.incoming = LazySeq::empty();
    }

    pub fn clear_outgoing(&mut self) {
        self.outgoing = LazySeq::empty();
    }

    /// Forks of all four buffers, collected, in
    /// `(incoming, working, holding, outgoing)` order.
    pub fn contents(&self) -> (Vec<T>, Vec<T>, Vec<T>, Vec<T>) {
        (
            self.incoming.snapshot_vec(),
            self.working.snapshot_vec(),
            self.holding.snapshot_vec(),
            self.outgoing.snapshot_vec(),
        )
    }
}

impl<T: Clone + 'static> Default for Buffers<T> {
    fn default() -> Self {
        Buffers::new()
    }
}
