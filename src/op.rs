//! The closed set of operations a chain can apply.
//!
//! Operations come in eight families. Each one is either element-wise
//! (it streams over working, whatever the shape) or runs over a unit: all
//! of working with [`Shape::One`](crate::Shape::One), the items of each
//! working element with [`Shape::Many`](crate::Shape::Many).

use crate::error::{ChainError, Result};
use crate::value::Value;

/// Worker-driven transformation of each element.
#[derive(Debug, Clone, PartialEq)]
pub enum MapOp {
    /// Worker result for every element.
    Each,
    /// Worker result for every `(key, value)` entry of map elements;
    /// other elements are passed to the worker whole.
    Items,
    /// `(index, element)` tuples.
    Enumerate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Elements the worker finds truthy.
    Keep,
    /// Elements the worker finds falsy.
    Reject,
    /// The first element the worker finds truthy.
    Find,
    /// Member lookup on every element; misses are skipped.
    Pick(Value),
    /// `[falsy, truthy]` split of the unit.
    Partition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReduceOp {
    /// Concatenates the members of the unit one level deep.
    Merge,
    /// Flattens the unit completely.
    Smash,
    /// Transposes the unit's members into tuples.
    Zip,
    /// Left fold; the worker receives `(accumulator, item)`.
    Fold { initial: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SliceOp {
    /// One item by position, negative positions counting from the end.
    At { index: i64, default: Value },
    First(usize),
    Last(usize),
    /// Everything but the last item.
    Initial,
    /// Everything but the first item.
    Rest,
    /// Fixed-size tuples, the last one padded with `fill` when given.
    Dice { size: usize, fill: Option<Value> },
}

/// Set algebra over the members of the unit.
#[derive(Debug, Clone, PartialEq)]
pub enum CompareOp {
    Union,
    Intersection,
    /// Members of the first that no other member holds.
    Difference,
    SymmetricDifference,
    /// Drops repeats, keeping first occurrences in order.
    Unique,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepeatOp {
    /// Every element `n` times in a row.
    Each(usize),
    /// The whole unit `n` times.
    Times(usize),
    /// Integers from `start` towards `stop` (exclusive); working is ignored.
    Range { start: i64, stop: i64, step: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderOp {
    /// Stable sort, by worker result when `by_worker` is set.
    Sort { by_worker: bool, descending: bool },
    Reverse,
    /// `(key, [items])` tuples keyed by worker result, in key order.
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Sum,
    Count,
    Min,
    Max,
    Average,
    Median,
}

/// One operation from the catalogue.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Map(MapOp),
    Filter(FilterOp),
    Reduce(ReduceOp),
    Slice(SliceOp),
    Compare(CompareOp),
    Repeat(RepeatOp),
    Order(OrderOp),
    Math(MathOp),
}

/// How an operation consumes working.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Streams element by element; shape does not matter.
    ElementWise,
    /// Produces a sequence from a unit.
    Unit,
    /// Produces one value from a unit.
    Aggregate,
    /// Produces elements without reading working.
    Generator,
}

impl Op {
    /// Operation name used in traces and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Map(MapOp::Each) => "MAP",
            Op::Map(MapOp::Items) => "ITEMS",
            Op::Map(MapOp::Enumerate) => "ENUMERATE",
            Op::Filter(FilterOp::Keep) => "FILTER",
            Op::Filter(FilterOp::Reject) => "REJECT",
            Op::Filter(FilterOp::Find) => "FIND",
            Op::Filter(FilterOp::Pick(_)) => "PICK",
            Op::Filter(FilterOp::Partition) => "PARTITION",
            Op::Reduce(ReduceOp::Merge) => "MERGE",
            Op::Reduce(ReduceOp::Smash) => "SMASH",
            Op::Reduce(ReduceOp::Zip) => "ZIP",
            Op::Reduce(ReduceOp::Fold { .. }) => "FOLD",
            Op::Slice(SliceOp::At { .. }) => "AT",
            Op::Slice(SliceOp::First(_)) => "FIRST",
            Op::Slice(SliceOp::Last(_)) => "LAST",
            Op::Slice(SliceOp::Initial) => "INITIAL",
            Op::Slice(SliceOp::Rest) => "REST",
            Op::Slice(SliceOp::Dice { .. }) => "DICE",
            Op::Compare(CompareOp::Union) => "UNION",
            Op::Compare(CompareOp::Intersection) => "INTERSECTION",
            Op::Compare(CompareOp::Difference) => "DIFFERENCE",
            Op::Compare(CompareOp::SymmetricDifference) => "SYMDIFF",
            Op::Compare(CompareOp::Unique) => "UNIQUE",
            Op::Repeat(RepeatOp::Each(_)) => "EACH",
            Op::Repeat(RepeatOp::Times(_)) => "TIMES",
            Op::Repeat(RepeatOp::Range { .. }) => "RANGE",
            Op::Order(OrderOp::Sort { .. }) => "SORT",
            Op::Order(OrderOp::Reverse) => "REVERSE",
            Op::Order(OrderOp::Group) => "GROUP",
            Op::Math(MathOp::Sum) => "SUM",
            Op::Math(MathOp::Count) => "COUNT",
            Op::Math(MathOp::Min) => "MIN",
            Op::Math(MathOp::Max) => "MAX",
            Op::Math(MathOp::Average) => "AVERAGE",
            Op::Math(MathOp::Median) => "MEDIAN",
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Op::Map(_) => Kind::ElementWise,
            Op::Filter(FilterOp::Partition) => Kind::Aggregate,
            Op::Filter(_) => Kind::ElementWise,
            Op::Reduce(ReduceOp::Fold { .. }) => Kind::Aggregate,
            Op::Reduce(_) => Kind::Unit,
            Op::Slice(SliceOp::At { .. }) => Kind::Aggregate,
            Op::Slice(_) => Kind::Unit,
            Op::Compare(_) => Kind::Unit,
            Op::Repeat(RepeatOp::Each(_)) => Kind::ElementWise,
            Op::Repeat(RepeatOp::Times(_)) => Kind::Unit,
            Op::Repeat(RepeatOp::Range { .. }) => Kind::Generator,
            Op::Order(_) => Kind::Unit,
            Op::Math(_) => Kind::Aggregate,
        }
    }

    pub fn needs_worker(&self) -> bool {
        matches!(
            self,
            Op::Map(MapOp::Each | MapOp::Items)
                | Op::Filter(
                    FilterOp::Keep | FilterOp::Reject | FilterOp::Find | FilterOp::Partition
                )
                | Op::Reduce(ReduceOp::Fold { .. })
                | Op::Order(OrderOp::Sort {
                    by_worker: true,
                    ..
                })
                | Op::Order(OrderOp::Group)
        )
    }

    /// Configuration checks run before any buffer is touched.
    pub fn validate(&self, has_worker: bool) -> Result<()> {
        if self.needs_worker() && !has_worker {
            return Err(ChainError::NoWorker { op: self.name() });
        }
        match self {
            Op::Slice(SliceOp::Dice { size: 0, .. }) => Err(ChainError::InvalidOperation {
                op: self.name(),
                reason: "size must be at least 1".to_string(),
            }),
            Op::Repeat(RepeatOp::Range { step: 0, .. }) => Err(ChainError::InvalidOperation {
                op: self.name(),
                reason: "step must not be zero".to_string(),
            }),
            _ => Ok(()),
        }
    }
}
