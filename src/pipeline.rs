//! Execution of a single [`Op`] inside a transaction.
//!
//! Operations read the working buffer and produce into the transaction;
//! they never see incoming, outgoing or the history. Element-wise
//! operations, and every operation in the many shape, hold a lazy stream
//! over working: nothing is read until their results are. A failing
//! element ends the stream, keeps what came before it and leaves the error
//! in the chain's [`Fault`] slot for whoever reads the results. Operations
//! over the whole sequence read working when applied, except the ones that
//! only need a prefix of it.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use crate::config::Shape;
use crate::error::{ChainError, Result};
use crate::op::{CompareOp, FilterOp, Kind, MapOp, MathOp, Op, OrderOp, ReduceOp, RepeatOp, SliceOp};
use crate::scope::{Transaction, Working};
use crate::trace::Tally;
use crate::value::Value;
use crate::worker::{Params, Worker};

/// The first element error raised by a lazy stream, until it is reported.
#[derive(Clone, Default)]
pub struct Fault(Rc<RefCell<Option<ChainError>>>);

impl Fault {
    /// Keeps the first error; later ones are dropped.
    pub fn raise(&self, err: ChainError) {
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn pending(&self) -> Option<ChainError> {
        self.0.borrow().clone()
    }

    pub fn take(&self) -> Option<ChainError> {
        self.0.borrow_mut().take()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().take();
    }

    /// Reports and forgets the pending error.
    pub fn check(&self) -> Result<()> {
        match self.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// What an operation may use besides the working buffer.
#[derive(Clone)]
pub struct OpContext {
    pub worker: Option<Rc<Worker>>,
    pub params: Rc<Params>,
    pub shape: Shape,
    pub fault: Fault,
}

impl OpContext {
    fn worker(&self, op: &Op) -> Result<&Worker> {
        self.worker.as_deref().ok_or(ChainError::NoWorker { op: op.name() })
    }

    fn call(&self, op: &Op, value: &Value) -> Result<Value> {
        self.worker(op)?.apply(value, &self.params)
    }

    fn test(&self, op: &Op, value: &Value) -> Result<bool> {
        self.worker(op)?.test(value, &self.params)
    }
}

/// Result of one unit.
enum UnitOutput {
    Items(Vec<Value>),
    Aggregate(Value),
}

fn not_supported(op: &Op, kind: &str) -> ChainError {
    ChainError::InvalidOperation {
        op: op.name(),
        reason: format!("cannot run as a {kind} operation"),
    }
}

fn repeated_len(op: &Op, len: usize, times: usize) -> Result<usize> {
    len.checked_mul(times)
        .ok_or(ChainError::Overflow { op: op.name() })
}

/// Runs `op` over the transaction's working buffer.
pub fn execute(op: &Op, tx: &mut Transaction<'_, Value>, ctx: &OpContext) -> Result<()> {
    match (op.kind(), ctx.shape) {
        (Kind::Generator, _) => {
            if let Op::Repeat(RepeatOp::Range { start, stop, step }) = op {
                tx.hold(range(*start, *stop, *step));
            }
            Ok(())
        }
        (Kind::ElementWise, _) | (_, Shape::Many) => {
            let stream = Stream::new(op.clone(), tx.working(), ctx.clone(), tx.tally());
            tx.hold(stream);
            Ok(())
        }
        (_, Shape::One) => apply_whole(op, tx, ctx),
    }
}

/// The whole working buffer as one unit.
fn apply_whole(op: &Op, tx: &mut Transaction<'_, Value>, ctx: &OpContext) -> Result<()> {
    let working = tx.working();
    match op {
        Op::Slice(SliceOp::First(n)) => tx.hold(working.take(*n)),
        Op::Slice(SliceOp::Rest) => tx.hold(working.skip(1)),
        Op::Reduce(ReduceOp::Merge) => tx.hold(working.flat_map(Value::into_unit)),
        _ => {
            let unit: Vec<Value> = working.collect();
            // an upstream stream may have stopped short
            ctx.fault.check()?;
            match op {
                Op::Repeat(RepeatOp::Times(n)) => {
                    let total = repeated_len(op, unit.len(), *n)?;
                    tx.hold(unit.into_iter().cycle().take(total));
                }
                _ => match apply_unit(op, unit, ctx)? {
                    UnitOutput::Items(items) => tx.emit_all(items),
                    UnitOutput::Aggregate(value) => tx.emit(value),
                },
            }
        }
    }
    Ok(())
}

fn range(start: i64, stop: i64, step: i64) -> impl Iterator<Item = Value> {
    std::iter::successors(Some(start), move |current| current.checked_add(step))
        .take_while(move |&current| if step > 0 { current < stop } else { current > stop })
        .map(Value::Int)
}

/// Lazy output of an element-wise operation, or of a unit operation run
/// once per element.
struct Stream {
    op: Op,
    input: Option<Working<Value>>,
    ctx: OpContext,
    tally: Rc<Tally>,
    queue: VecDeque<Value>,
    index: i64,
}

impl Stream {
    fn new(op: Op, input: Working<Value>, ctx: OpContext, tally: Rc<Tally>) -> Self {
        Stream {
            op,
            input: Some(input),
            ctx,
            tally,
            queue: VecDeque::new(),
            index: 0,
        }
    }

    /// Queues whatever `item` produces. Returns false once the stream is
    /// complete.
    fn step(&mut self, item: Value) -> Result<bool> {
        let op = &self.op;
        match op {
            Op::Map(MapOp::Each) => self.queue.push_back(self.ctx.call(op, &item)?),
            Op::Map(MapOp::Items) => match item {
                Value::Map(entries) => {
                    for (key, value) in entries {
                        let pair = Value::Tuple(vec![key, value]);
                        self.queue.push_back(self.ctx.call(op, &pair)?);
                    }
                }
                other => self.queue.push_back(self.ctx.call(op, &other)?),
            },
            Op::Map(MapOp::Enumerate) => {
                self.queue.push_back(Value::Tuple(vec![Value::Int(self.index), item]));
                self.index += 1;
            }
            Op::Filter(FilterOp::Keep) => {
                if self.ctx.test(op, &item)? {
                    self.queue.push_back(item);
                }
            }
            Op::Filter(FilterOp::Reject) => {
                if !self.ctx.test(op, &item)? {
                    self.queue.push_back(item);
                }
            }
            Op::Filter(FilterOp::Find) => {
                if self.ctx.test(op, &item)? {
                    self.queue.push_back(item);
                    return Ok(false);
                }
            }
            Op::Filter(FilterOp::Pick(key)) => {
                if let Some(found) = item.member(key) {
                    self.queue.push_back(found.clone());
                }
            }
            Op::Repeat(RepeatOp::Each(n)) => {
                self.queue.extend(std::iter::repeat_n(item, *n));
            }
            _ => {
                let out = match apply_unit(op, item.into_unit(), &self.ctx)? {
                    UnitOutput::Items(items) => Value::List(items),
                    UnitOutput::Aggregate(value) => value,
                };
                self.queue.push_back(out);
            }
        }
        Ok(true)
    }
}

impl Iterator for Stream {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Some(item);
            }
            let item = self.input.as_mut()?.next();
            let Some(item) = item else {
                self.input = None;
                return None;
            };
            match self.step(item) {
                Ok(true) => {}
                Ok(false) => self.input = None,
                Err(err) => {
                    self.input = None;
                    self.tally.fail();
                    self.ctx.fault.raise(err);
                }
            }
        }
    }
}

fn apply_unit(op: &Op, unit: Vec<Value>, ctx: &OpContext) -> Result<UnitOutput> {
    use UnitOutput::{Aggregate, Items};

    Ok(match op {
        Op::Filter(FilterOp::Partition) => {
            let (mut falsy, mut truthy) = (Vec::new(), Vec::new());
            for item in unit {
                if ctx.test(op, &item)? {
                    truthy.push(item);
                } else {
                    falsy.push(item);
                }
            }
            Aggregate(Value::List(vec![Value::List(falsy), Value::List(truthy)]))
        }
        Op::Reduce(reduce) => reduce_unit(op, reduce, unit, ctx)?,
        Op::Slice(slice) => slice_unit(slice, unit),
        Op::Compare(compare) => Items(compare_unit(compare, unit)),
        Op::Repeat(RepeatOp::Times(n)) => {
            repeated_len(op, unit.len(), *n)?;
            let mut out = Vec::new();
            for _ in 0..*n {
                out.extend(unit.iter().cloned());
            }
            Items(out)
        }
        Op::Order(order) => Items(order_unit(op, order, unit, ctx)?),
        Op::Math(math) => Aggregate(math_unit(op.name(), *math, unit)?),
        _ => return Err(not_supported(op, "unit")),
    })
}

fn reduce_unit(op: &Op, reduce: &ReduceOp, unit: Vec<Value>, ctx: &OpContext) -> Result<UnitOutput> {
    Ok(match reduce {
        ReduceOp::Merge => UnitOutput::Items(unit.into_iter().flat_map(Value::into_unit).collect()),
        ReduceOp::Smash => {
            let mut out = Vec::new();
            smash_into(unit, &mut out);
            UnitOutput::Items(out)
        }
        ReduceOp::Zip => {
            let mut columns = Vec::with_capacity(unit.len());
            for member in unit {
                match member.into_items() {
                    Ok(items) => columns.push(items.into_iter()),
                    Err(scalar) => {
                        return Err(ChainError::Type {
                            op: op.name(),
                            expected: "container",
                            found: scalar.type_name(),
                        });
                    }
                }
            }
            let mut rows = Vec::new();
            if !columns.is_empty() {
                'rows: loop {
                    let mut row = Vec::with_capacity(columns.len());
                    for column in columns.iter_mut() {
                        match column.next() {
                            Some(item) => row.push(item),
                            None => break 'rows,
                        }
                    }
                    rows.push(Value::Tuple(row));
                }
            }
            UnitOutput::Items(rows)
        }
        ReduceOp::Fold { initial } => {
            let mut acc = initial.clone();
            for item in unit {
                acc = ctx.call(op, &Value::Tuple(vec![acc, item]))?;
            }
            UnitOutput::Aggregate(acc)
        }
    })
}

fn smash_into(items: Vec<Value>, out: &mut Vec<Value>) {
    for item in items {
        match item.into_items() {
            Ok(nested) => smash_into(nested, out),
            Err(scalar) => out.push(scalar),
        }
    }
}

fn slice_unit(slice: &SliceOp, mut unit: Vec<Value>) -> UnitOutput {
    match slice {
        SliceOp::At { index, default } => {
            let len = unit.len();
            let position = if *index < 0 {
                len.checked_sub(index.unsigned_abs() as usize)
            } else {
                Some(*index as usize)
            };
            let found = position.filter(|&p| p < len).map(|p| unit.swap_remove(p));
            UnitOutput::Aggregate(found.unwrap_or_else(|| default.clone()))
        }
        SliceOp::First(n) => {
            unit.truncate(*n);
            UnitOutput::Items(unit)
        }
        SliceOp::Last(n) => {
            let skip = unit.len().saturating_sub(*n);
            UnitOutput::Items(unit.split_off(skip))
        }
        SliceOp::Initial => {
            unit.pop();
            UnitOutput::Items(unit)
        }
        SliceOp::Rest => UnitOutput::Items(unit.into_iter().skip(1).collect()),
        SliceOp::Dice { size, fill } => {
            let mut chunks = Vec::with_capacity(unit.len().div_ceil(*size));
            for chunk in unit.chunks(*size) {
                let mut chunk = chunk.to_vec();
                if let Some(fill) = fill {
                    chunk.resize(*size, fill.clone());
                }
                chunks.push(Value::Tuple(chunk));
            }
            UnitOutput::Items(chunks)
        }
    }
}

fn compare_unit(compare: &CompareOp, unit: Vec<Value>) -> Vec<Value> {
    if let CompareOp::Unique = compare {
        let mut seen = BTreeSet::new();
        return unit
            .into_iter()
            .filter(|item| seen.insert(item.clone()))
            .collect();
    }

    let mut sets = unit
        .into_iter()
        .map(|member| member.into_unit().into_iter().collect::<BTreeSet<Value>>());
    let Some(first) = sets.next() else {
        return Vec::new();
    };
    let result = sets.fold(first, |acc, set| match compare {
        CompareOp::Union => &acc | &set,
        CompareOp::Intersection => &acc & &set,
        CompareOp::Difference => &acc - &set,
        CompareOp::SymmetricDifference => &acc ^ &set,
        CompareOp::Unique => acc,
    });
    result.into_iter().collect()
}

fn order_unit(op: &Op, order: &OrderOp, mut unit: Vec<Value>, ctx: &OpContext) -> Result<Vec<Value>> {
    match order {
        OrderOp::Sort {
            by_worker,
            descending,
        } => {
            if *by_worker {
                let mut keyed = Vec::with_capacity(unit.len());
                for item in unit {
                    keyed.push((ctx.call(op, &item)?, item));
                }
                if *descending {
                    keyed.sort_by(|a, b| b.0.cmp(&a.0));
                } else {
                    keyed.sort_by(|a, b| a.0.cmp(&b.0));
                }
                unit = keyed.into_iter().map(|(_, item)| item).collect();
            } else if *descending {
                unit.sort_by(|a, b| b.cmp(a));
            } else {
                unit.sort();
            }
            Ok(unit)
        }
        OrderOp::Reverse => {
            unit.reverse();
            Ok(unit)
        }
        OrderOp::Group => {
            let mut groups: BTreeMap<Value, Vec<Value>> = BTreeMap::new();
            for item in unit {
                let key = ctx.call(op, &item)?;
                groups.entry(key).or_default().push(item);
            }
            Ok(groups
                .into_iter()
                .map(|(key, items)| Value::Tuple(vec![key, Value::List(items)]))
                .collect())
        }
    }
}

/// A number pulled out of the unit for arithmetic.
#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Number::Int(n) => Value::Int(n),
            Number::Float(f) => Value::Float(f),
        }
    }
}

fn numbers(op: &'static str, unit: Vec<Value>) -> Result<Vec<Number>> {
    unit.into_iter()
        .map(|item| match item {
            Value::Int(n) => Ok(Number::Int(n)),
            Value::Float(f) => Ok(Number::Float(f)),
            other => Err(ChainError::Type {
                op,
                expected: "number",
                found: other.type_name(),
            }),
        })
        .collect()
}

fn sum(op: &'static str, numbers: &[Number]) -> Result<Number> {
    let mut total = Number::Int(0);
    for n in numbers {
        total = match (total, *n) {
            (Number::Int(a), Number::Int(b)) => {
                Number::Int(a.checked_add(b).ok_or(ChainError::Overflow { op })?)
            }
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        };
    }
    Ok(total)
}

fn math_unit(op: &'static str, math: MathOp, unit: Vec<Value>) -> Result<Value> {
    match math {
        MathOp::Count => Ok(Value::from(unit.len())),
        MathOp::Min => unit.into_iter().min().ok_or(ChainError::Empty { op }),
        MathOp::Max => unit.into_iter().max().ok_or(ChainError::Empty { op }),
        MathOp::Sum => Ok(sum(op, &numbers(op, unit)?)?.into_value()),
        MathOp::Average => {
            let numbers = numbers(op, unit)?;
            if numbers.is_empty() {
                return Err(ChainError::Empty { op });
            }
            let total: f64 = numbers.iter().map(|n| n.as_f64()).sum();
            Ok(Value::Float(total / numbers.len() as f64))
        }
        MathOp::Median => {
            let mut numbers = numbers(op, unit)?;
            if numbers.is_empty() {
                return Err(ChainError::Empty { op });
            }
            numbers.sort_by(|a, b| a.as_f64().total_cmp(&b.as_f64()));
            let mid = numbers.len() / 2;
            if numbers.len() % 2 == 1 {
                Ok(numbers[mid].into_value())
            } else {
                Ok(Value::Float(
                    (numbers[mid - 1].as_f64() + numbers[mid].as_f64()) / 2.0,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffers;
    use crate::history::History;
    use crate::tee::LazySeq;

    fn ints(items: &[i64]) -> Vec<Value> {
        items.iter().map(|&n| Value::Int(n)).collect()
    }

    fn run_with(op: Op, input: Vec<Value>, worker: Option<&Rc<Worker>>, shape: Shape) -> (Result<()>, Vec<Value>) {
        let mut buffers = Buffers::with_incoming(LazySeq::from(input));
        let mut history = History::new();
        let ctx = OpContext {
            worker: worker.cloned(),
            params: Rc::new(Params::default()),
            shape,
            fault: Fault::default(),
        };
        let result = {
            let mut tx = Transaction::begin(&mut buffers, &mut history);
            execute(&op, &mut tx, &ctx)
        };
        let out = buffers.take_outgoing();
        (result.and(ctx.fault.check()), out)
    }

    fn run(op: Op, input: Vec<Value>) -> Vec<Value> {
        let (result, out) = run_with(op, input, None, Shape::One);
        assert!(result.is_ok());
        out
    }

    fn double() -> Rc<Worker> {
        Rc::new(Worker::call(|value, _| match value {
            Value::Int(n) => Ok(Value::Int(n * 2)),
            other => Err(ChainError::Worker(format!("not a number: {other}"))),
        }))
    }

    fn is_even() -> Rc<Worker> {
        Rc::new(Worker::call(|value, _| Ok(Value::Bool(value.as_i64().is_some_and(|n| n % 2 == 0)))))
    }

    #[test]
    fn test_map_keeps_partial_output_on_error() {
        let worker = double();
        let input = vec![Value::Int(1), Value::Int(2), Value::from("x"), Value::Int(4)];
        let (result, out) = run_with(Op::Map(MapOp::Each), input, Some(&worker), Shape::One);
        assert!(matches!(result, Err(ChainError::Worker(_))));
        assert_eq!(out, ints(&[2, 4]));
    }

    #[test]
    fn test_map_reads_only_what_is_asked_for() {
        let mut buffers = Buffers::with_incoming(LazySeq::new((1..).map(Value::Int)));
        let mut history = History::new();
        let ctx = OpContext {
            worker: Some(double()),
            params: Rc::new(Params::default()),
            shape: Shape::One,
            fault: Fault::default(),
        };
        let tally = {
            let mut tx = Transaction::begin(&mut buffers, &mut history);
            assert!(execute(&Op::Map(MapOp::Each), &mut tx, &ctx).is_ok());
            tx.tally()
        };
        assert_eq!(tally.consumed(), 0);

        let head: Vec<Value> = buffers.outgoing().fork().take(3).collect();
        assert_eq!(head, ints(&[2, 4, 6]));
        assert_eq!((tally.consumed(), tally.emitted()), (3, 3));
        assert!(ctx.fault.pending().is_none());
    }

    #[test]
    fn test_first_stops_reading_an_endless_input() {
        let mut buffers = Buffers::with_incoming(LazySeq::new((1..).map(Value::Int)));
        let mut history = History::new();
        let ctx = OpContext {
            worker: None,
            params: Rc::new(Params::default()),
            shape: Shape::One,
            fault: Fault::default(),
        };
        {
            let mut tx = Transaction::begin(&mut buffers, &mut history);
            assert!(execute(&Op::Slice(SliceOp::First(2)), &mut tx, &ctx).is_ok());
        }
        assert_eq!(buffers.take_outgoing(), ints(&[1, 2]));
    }

    #[test]
    fn test_fault_keeps_first_error() {
        let fault = Fault::default();
        assert!(fault.check().is_ok());
        fault.raise(ChainError::Worker("first".into()));
        fault.raise(ChainError::Worker("second".into()));
        assert!(matches!(fault.pending(), Some(ChainError::Worker(m)) if m == "first"));
        assert!(matches!(fault.check(), Err(ChainError::Worker(m)) if m == "first"));
        assert!(fault.take().is_none());
    }

    #[test]
    fn test_map_items_and_enumerate() {
        let worker = Rc::new(Worker::call(|value, _| Ok(value.member(&Value::Int(1)).cloned().unwrap_or_default())));
        let map: Value = Value::Map(BTreeMap::from([(Value::from("a"), Value::Int(1)), (Value::from("b"), Value::Int(2))]));
        let (result, out) = run_with(Op::Map(MapOp::Items), vec![map], Some(&worker), Shape::One);
        assert!(result.is_ok());
        assert_eq!(out, ints(&[1, 2]));

        assert_eq!(
            run(Op::Map(MapOp::Enumerate), vec![Value::from("a"), Value::from("b")]),
            vec![Value::from((0i64, "a")), Value::from((1i64, "b"))]
        );
    }

    #[test]
    fn test_filters() {
        let worker = is_even();
        let input = ints(&[1, 2, 3, 4]);
        let (_, kept) = run_with(Op::Filter(FilterOp::Keep), input.clone(), Some(&worker), Shape::One);
        assert_eq!(kept, ints(&[2, 4]));
        let (_, rejected) = run_with(Op::Filter(FilterOp::Reject), input.clone(), Some(&worker), Shape::One);
        assert_eq!(rejected, ints(&[1, 3]));
        let (_, found) = run_with(Op::Filter(FilterOp::Find), input.clone(), Some(&worker), Shape::One);
        assert_eq!(found, ints(&[2]));
        let (_, parts) = run_with(Op::Filter(FilterOp::Partition), input, Some(&worker), Shape::One);
        assert_eq!(parts, vec![Value::List(vec![Value::List(ints(&[1, 3])), Value::List(ints(&[2, 4]))])]);
    }

    #[test]
    fn test_pick_skips_misses() {
        let input = vec![Value::from(vec![1, 2]), Value::from(vec![3]), Value::Int(9)];
        assert_eq!(run(Op::Filter(FilterOp::Pick(Value::Int(1))), input), ints(&[2]));
    }

    #[test]
    fn test_merge_and_smash() {
        let input = vec![Value::from(vec![1, 2]), Value::from(vec![3, 4])];
        assert_eq!(run(Op::Reduce(ReduceOp::Merge), input), ints(&[1, 2, 3, 4]));

        let nested = vec![Value::Int(1), Value::List(vec![Value::Int(2), Value::from(vec![3, 4])])];
        assert_eq!(run(Op::Reduce(ReduceOp::Smash), nested), ints(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_zip() {
        let input = vec![Value::from(vec![1, 2, 3]), Value::from(vec![4, 5])];
        assert_eq!(
            run(Op::Reduce(ReduceOp::Zip), input),
            vec![Value::from((1, 4)), Value::from((2, 5))]
        );
        let (result, _) = run_with(Op::Reduce(ReduceOp::Zip), ints(&[1]), None, Shape::One);
        assert!(matches!(result, Err(ChainError::Type { op: "ZIP", .. })));
    }

    #[test]
    fn test_fold() {
        let worker = Rc::new(Worker::call(|pair, _| {
            let acc = pair.member(&Value::Int(0)).and_then(Value::as_i64).unwrap_or(0);
            let item = pair.member(&Value::Int(1)).and_then(Value::as_i64).unwrap_or(0);
            Ok(Value::Int(acc * 10 + item))
        }));
        let op = Op::Reduce(ReduceOp::Fold {
            initial: Value::Int(0),
        });
        let (_, out) = run_with(op, ints(&[1, 2, 3]), Some(&worker), Shape::One);
        assert_eq!(out, ints(&[123]));
    }

    #[test]
    fn test_slices() {
        let input = ints(&[1, 2, 3, 4, 5]);
        let at = |index, default| Op::Slice(SliceOp::At { index, default });
        assert_eq!(run(at(1, Value::Null), input.clone()), ints(&[2]));
        assert_eq!(run(at(-1, Value::Null), input.clone()), ints(&[5]));
        assert_eq!(run(at(9, Value::from("none")), input.clone()), vec![Value::from("none")]);
        assert_eq!(run(at(-9, Value::Int(0)), input.clone()), ints(&[0]));
        assert_eq!(run(Op::Slice(SliceOp::First(2)), input.clone()), ints(&[1, 2]));
        assert_eq!(run(Op::Slice(SliceOp::Last(2)), input.clone()), ints(&[4, 5]));
        assert_eq!(run(Op::Slice(SliceOp::Last(9)), input.clone()), input);
        assert_eq!(run(Op::Slice(SliceOp::Initial), input.clone()), ints(&[1, 2, 3, 4]));
        assert_eq!(run(Op::Slice(SliceOp::Rest), input.clone()), ints(&[2, 3, 4, 5]));
        let dice = Op::Slice(SliceOp::Dice {
            size: 2,
            fill: Some(Value::Int(0)),
        });
        assert_eq!(
            run(dice, input),
            vec![Value::from((1, 2)), Value::from((3, 4)), Value::from((5, 0))]
        );
    }

    #[test]
    fn test_set_algebra() {
        let input = vec![Value::from(vec![3, 1, 2]), Value::from(vec![2, 3, 4])];
        assert_eq!(run(Op::Compare(CompareOp::Union), input.clone()), ints(&[1, 2, 3, 4]));
        assert_eq!(run(Op::Compare(CompareOp::Intersection), input.clone()), ints(&[2, 3]));
        assert_eq!(run(Op::Compare(CompareOp::Difference), input.clone()), ints(&[1]));
        assert_eq!(run(Op::Compare(CompareOp::SymmetricDifference), input), ints(&[1, 4]));
        assert_eq!(run(Op::Compare(CompareOp::Unique), ints(&[3, 1, 3, 2, 1])), ints(&[3, 1, 2]));
    }

    #[test]
    fn test_repeat_and_range() {
        assert_eq!(run(Op::Repeat(RepeatOp::Each(2)), ints(&[1, 2])), ints(&[1, 1, 2, 2]));
        assert_eq!(run(Op::Repeat(RepeatOp::Times(2)), ints(&[1, 2])), ints(&[1, 2, 1, 2]));
        let range = |start, stop, step| Op::Repeat(RepeatOp::Range { start, stop, step });
        assert_eq!(run(range(0, 5, 2), ints(&[9])), ints(&[0, 2, 4]));
        assert_eq!(run(range(3, 0, -1), vec![]), ints(&[3, 2, 1]));
        assert!(run(range(3, 0, 1), vec![]).is_empty());
    }

    #[test]
    fn test_times_rejects_an_unrepresentable_count() {
        let (result, out) = run_with(Op::Repeat(RepeatOp::Times(usize::MAX)), ints(&[1, 2]), None, Shape::One);
        assert!(matches!(result, Err(ChainError::Overflow { op: "TIMES" })));
        assert!(out.is_empty());
        let (result, _) = run_with(
            Op::Repeat(RepeatOp::Times(usize::MAX)),
            vec![Value::from(vec![1, 2])],
            None,
            Shape::Many,
        );
        assert!(matches!(result, Err(ChainError::Overflow { op: "TIMES" })));
    }

    #[test]
    fn test_ordering() {
        let sort = |by_worker, descending| Op::Order(OrderOp::Sort { by_worker, descending });
        assert_eq!(run(sort(false, false), ints(&[3, 1, 2])), ints(&[1, 2, 3]));
        assert_eq!(run(sort(false, true), ints(&[3, 1, 2])), ints(&[3, 2, 1]));
        assert_eq!(run(Op::Order(OrderOp::Reverse), ints(&[1, 2, 3])), ints(&[3, 2, 1]));

        let worker = is_even();
        let (_, by_parity) = run_with(sort(true, false), ints(&[2, 1, 4, 3]), Some(&worker), Shape::One);
        assert_eq!(by_parity, ints(&[1, 3, 2, 4]));

        let (_, groups) = run_with(Op::Order(OrderOp::Group), ints(&[1, 2, 3, 4]), Some(&worker), Shape::One);
        assert_eq!(
            groups,
            vec![
                Value::Tuple(vec![Value::Bool(false), Value::from(vec![1, 3])]),
                Value::Tuple(vec![Value::Bool(true), Value::from(vec![2, 4])]),
            ]
        );
    }

    #[test]
    fn test_math() {
        let input = ints(&[4, 1, 3, 2]);
        assert_eq!(run(Op::Math(MathOp::Sum), input.clone()), ints(&[10]));
        assert_eq!(run(Op::Math(MathOp::Count), input.clone()), ints(&[4]));
        assert_eq!(run(Op::Math(MathOp::Min), input.clone()), ints(&[1]));
        assert_eq!(run(Op::Math(MathOp::Max), input.clone()), ints(&[4]));
        assert_eq!(run(Op::Math(MathOp::Average), input.clone()), vec![Value::Float(2.5)]);
        assert_eq!(run(Op::Math(MathOp::Median), input), vec![Value::Float(2.5)]);
        assert_eq!(run(Op::Math(MathOp::Median), ints(&[5, 1, 3])), ints(&[3]));
        assert_eq!(
            run(Op::Math(MathOp::Sum), vec![Value::Int(1), Value::Float(0.5)]),
            vec![Value::Float(1.5)]
        );
        assert_eq!(run(Op::Math(MathOp::Sum), vec![]), ints(&[0]));
    }

    #[test]
    fn test_math_errors() {
        let (result, out) = run_with(Op::Math(MathOp::Min), vec![], None, Shape::One);
        assert!(matches!(result, Err(ChainError::Empty { op: "MIN" })));
        assert!(out.is_empty());
        let (result, _) = run_with(Op::Math(MathOp::Sum), vec![Value::from("a")], None, Shape::One);
        assert!(matches!(result, Err(ChainError::Type { op: "SUM", .. })));
        let (result, _) = run_with(Op::Math(MathOp::Sum), ints(&[i64::MAX, 1]), None, Shape::One);
        assert!(matches!(result, Err(ChainError::Overflow { op: "SUM" })));
    }

    #[test]
    fn test_many_shape_runs_per_element() {
        let input = vec![Value::from(vec![1, 2]), Value::from(vec![3, 4, 5])];
        let (_, sums) = run_with(Op::Math(MathOp::Sum), input.clone(), None, Shape::Many);
        assert_eq!(sums, ints(&[3, 12]));
        let (_, reversed) = run_with(Op::Order(OrderOp::Reverse), input, None, Shape::Many);
        assert_eq!(reversed, vec![Value::from(vec![2, 1]), Value::from(vec![5, 4, 3])]);
        let (_, scalars) = run_with(Op::Math(MathOp::Count), ints(&[7, 8]), None, Shape::Many);
        assert_eq!(scalars, ints(&[1, 1]));
    }
}
