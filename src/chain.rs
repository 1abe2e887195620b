//! The chain: a caller-owned session over the four buffers.
//!
//! Things are inserted into incoming, operations run inside a transaction
//! and leave their results in outgoing, and reads package outgoing with
//! the current wrapper. Every operation checkpoints incoming first, so
//! [`Chain::undo`] can step back.
//!
//! Most operations are lazy: applying one only queues it, and its work is
//! done as its results are read. An element error met on the way is kept
//! by the chain and reported by the next `peek`, `read` or `close`, or by
//! the next operation that reads the failed results.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::buffer::Buffers;
use crate::config::{Balance, ChainConfig, Context, Shape};
use crate::error::Result;
use crate::history::{History, Restore};
use crate::op::{FilterOp, MapOp, Op, ReduceOp};
use crate::output::{self, ErrorPolicy, OutputWrapper};
use crate::pipeline::{self, Fault, OpContext};
use crate::scope::Transaction;
use crate::tee::LazySeq;
use crate::trace::{DebugCallbacks, OpTrace, Tally};
use crate::value::Value;
use crate::worker::{Engine, Params, PatternFlags, Worker};

pub struct Chain {
    buffers: Buffers<Value>,
    history: History<Value>,
    worker: Option<Rc<Worker>>,
    params: Rc<Params>,
    wrapper: Option<OutputWrapper>,
    config: ChainConfig,
    traces: Vec<(&'static str, Rc<Tally>)>,
    debug: Option<DebugCallbacks>,
    fault: Fault,
}

impl Chain {
    /// A chain with nothing in it.
    pub fn new() -> Self {
        Chain::start(LazySeq::empty())
    }

    /// A chain whose incoming things are the items of `things`, pulled
    /// lazily.
    pub fn from_things<I>(things: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value> + 'static,
        I::IntoIter: 'static,
    {
        Chain::start(LazySeq::new(things.into_iter().map(Into::into)))
    }

    /// A chain holding exactly one thing, never expanded even when it is a
    /// container.
    pub fn single(thing: impl Into<Value>) -> Self {
        Chain::start(LazySeq::from(vec![thing.into()]))
    }

    fn start(incoming: LazySeq<Value>) -> Self {
        let mut chain = Chain {
            buffers: Buffers::with_incoming(incoming),
            history: History::new(),
            worker: None,
            params: Rc::default(),
            wrapper: None,
            config: ChainConfig::default(),
            traces: Vec::new(),
            debug: None,
            fault: Fault::default(),
        };
        chain.history.pin_original(&chain.buffers);
        chain.after_insert();
        chain
    }

    /// Applies every mode in `config`.
    pub fn with_config(mut self, config: ChainConfig) -> Self {
        self.set_config(config);
        self
    }

    pub fn set_config(&mut self, config: ChainConfig) -> &mut Self {
        match config.shape {
            Shape::One => self.as_one(),
            Shape::Many => self.as_many(),
        };
        match config.context {
            Context::Edit => self.as_edit(),
            Context::Query => self.as_query(),
        };
        match config.balance {
            Balance::Auto => self.as_auto(),
            Balance::Manual => self.as_manual(),
        }
    }

    pub fn config(&self) -> ChainConfig {
        self.config
    }

    // --- worker ---
    //
    // Operations already queued keep the worker and params they were
    // applied with.

    pub fn set_worker<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Value, &Params) -> Result<Value> + 'static,
    {
        self.worker = Some(Rc::new(Worker::call(f)));
        self
    }

    /// Compiles `pattern` and installs it as the worker. A pattern that
    /// does not compile leaves the current worker in place.
    pub fn set_pattern(&mut self, pattern: &str, engine: Engine, flags: PatternFlags) -> Result<&mut Self> {
        self.worker = Some(Rc::new(Worker::pattern(pattern, engine, flags)?));
        Ok(self)
    }

    pub fn clear_worker(&mut self) -> &mut Self {
        self.worker = None;
        self
    }

    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Extra arguments passed to every worker call.
    pub fn set_params(&mut self, args: Vec<Value>, kwargs: BTreeMap<String, Value>) -> &mut Self {
        self.params = Rc::new(Params::new(args, kwargs));
        self
    }

    pub fn clear_params(&mut self) -> &mut Self {
        self.params = Rc::default();
        self
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    // --- insertion ---

    fn after_insert(&mut self) {
        if self.config.balance == Balance::Auto {
            self.buffers.rebalance_in_to_out();
        }
    }

    fn before_insert(&mut self) {
        // Drop the mirrored outgoing so incoming can grow in place.
        if self.config.balance == Balance::Auto {
            self.buffers.clear_outgoing();
        }
    }

    /// Appends every item of `things` to incoming, lazily.
    pub fn extend<I>(&mut self, things: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Value> + 'static,
        I::IntoIter: 'static,
    {
        self.before_insert();
        self.buffers.extend_incoming(things.into_iter().map(Into::into));
        self.after_insert();
        self
    }

    /// Places every item of `things` ahead of incoming, each one in front
    /// of the previous: `[1, 2]` before `[9]` gives `[2, 1, 9]`.
    pub fn extend_front<I>(&mut self, things: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.before_insert();
        self.buffers
            .extend_incoming_front(things.into_iter().map(Into::into));
        self.after_insert();
        self
    }

    /// Appends one thing, unexpanded.
    pub fn append(&mut self, thing: impl Into<Value>) -> &mut Self {
        self.extend(std::iter::once(thing.into()))
    }

    /// Puts one thing in front of incoming, unexpanded.
    pub fn prepend(&mut self, thing: impl Into<Value>) -> &mut Self {
        self.extend_front(std::iter::once(thing.into()))
    }

    // --- modes ---

    pub fn as_one(&mut self) -> &mut Self {
        self.config.shape = Shape::One;
        self
    }

    pub fn as_many(&mut self) -> &mut Self {
        self.config.shape = Shape::Many;
        self
    }

    pub fn as_edit(&mut self) -> &mut Self {
        self.config.context = Context::Edit;
        self
    }

    /// Switches to query mode and pins the current incoming as the state
    /// every read returns to.
    pub fn as_query(&mut self) -> &mut Self {
        self.config.context = Context::Query;
        self.history.pin_baseline(&self.buffers);
        self
    }

    pub fn as_auto(&mut self) -> &mut Self {
        self.config.balance = Balance::Auto;
        self
    }

    pub fn as_manual(&mut self) -> &mut Self {
        self.config.balance = Balance::Manual;
        self
    }

    // --- snapshots ---

    /// Checkpoints incoming, optionally pinning it as baseline and/or
    /// original. Pins are only taken once the history holds a checkpoint.
    pub fn snapshot(&mut self, baseline: bool, original: bool) -> &mut Self {
        self.history.push(&self.buffers, baseline, original);
        self
    }

    /// Clears every buffer and restores incoming from the checkpoint
    /// `steps` below the newest. Nothing to restore leaves incoming empty.
    pub fn undo(&mut self, steps: usize) -> &mut Self {
        self.restore(Restore::Steps(steps))
    }

    pub fn undo_baseline(&mut self) -> &mut Self {
        self.restore(Restore::Baseline)
    }

    pub fn undo_original(&mut self) -> &mut Self {
        self.restore(Restore::Original)
    }

    fn restore(&mut self, target: Restore) -> &mut Self {
        self.history.undo(&mut self.buffers, target);
        self.fault.clear();
        self
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    // --- balance ---

    /// Copies outgoing into incoming.
    pub fn out_in(&mut self) -> &mut Self {
        self.buffers.rebalance_out_to_in();
        self
    }

    /// Copies incoming into outgoing.
    pub fn in_out(&mut self) -> &mut Self {
        self.buffers.rebalance_in_to_out();
        self
    }

    /// Whether incoming and outgoing hold equal things. Reads neither.
    pub fn is_balanced(&self) -> bool {
        self.buffers.is_balanced()
    }

    pub fn clear(&mut self) -> &mut Self {
        self.buffers.clear_all();
        self.fault.clear();
        self
    }

    pub fn clear_in(&mut self) -> &mut Self {
        self.buffers.clear_incoming();
        self
    }

    pub fn clear_out(&mut self) -> &mut Self {
        self.buffers.clear_outgoing();
        self
    }

    // --- output shaping ---

    pub fn set_wrapper<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + 'static,
    {
        self.wrapper = Some(Box::new(f));
        self
    }

    /// Back to the default list wrapper.
    pub fn clear_wrapper(&mut self) -> &mut Self {
        self.wrapper = None;
        self
    }

    pub fn as_list(&mut self) -> &mut Self {
        self.wrapper = Some(output::to_list());
        self
    }

    pub fn as_set(&mut self) -> &mut Self {
        self.wrapper = Some(output::to_set());
        self
    }

    pub fn as_tuple(&mut self) -> &mut Self {
        self.wrapper = Some(output::to_tuple());
        self
    }

    pub fn as_map(&mut self) -> &mut Self {
        self.wrapper = Some(output::to_map());
        self
    }

    pub fn as_ascii(&mut self, policy: ErrorPolicy) -> &mut Self {
        self.wrapper = Some(output::to_ascii(policy));
        self
    }

    pub fn as_utf8(&mut self, policy: ErrorPolicy) -> &mut Self {
        self.wrapper = Some(output::to_utf8(policy));
        self
    }

    pub fn as_text(&mut self, policy: ErrorPolicy) -> &mut Self {
        self.wrapper = Some(output::to_text(policy));
        self
    }

    // --- operations ---

    /// Runs `op` inside a transaction.
    ///
    /// Configuration problems are reported before anything is touched.
    /// Lazy operations only queue their work. The others read their input
    /// now, and report an element error met upstream or in their own work
    /// after whatever was produced before it has been committed to
    /// outgoing.
    pub fn apply(&mut self, op: Op) -> Result<&mut Self> {
        op.validate(self.worker.is_some())?;

        let index = self.traces.len();
        if let Some(debug) = &self.debug {
            debug.start(index, op.name());
        }

        let ctx = OpContext {
            worker: self.worker.clone(),
            params: Rc::clone(&self.params),
            shape: self.config.shape,
            fault: self.fault.clone(),
        };
        let (result, tally) = {
            let mut tx = Transaction::begin(&mut self.buffers, &mut self.history);
            (pipeline::execute(&op, &mut tx, &ctx), tx.tally())
        };
        if result.is_err() {
            tally.fail();
        }

        if let Some(debug) = &self.debug {
            debug.complete(&tally.reading(index, op.name()));
        }
        self.traces.push((op.name(), tally));

        if self.config.balance == Balance::Auto {
            self.buffers.rebalance_out_to_in();
        }
        result?;
        Ok(self)
    }

    /// Worker result for every thing.
    pub fn map(&mut self) -> Result<&mut Self> {
        self.apply(Op::Map(MapOp::Each))
    }

    /// Things the worker finds truthy.
    pub fn filter(&mut self) -> Result<&mut Self> {
        self.apply(Op::Filter(FilterOp::Keep))
    }

    pub fn merge(&mut self) -> Result<&mut Self> {
        self.apply(Op::Reduce(ReduceOp::Merge))
    }

    // --- tracing ---

    /// One record per applied operation. The counts of a lazy operation
    /// grow as its results are read.
    pub fn trace(&self) -> Vec<OpTrace> {
        self.traces
            .iter()
            .enumerate()
            .map(|(index, (name, tally))| tally.reading(index, *name))
            .collect()
    }

    pub fn clear_trace(&mut self) -> &mut Self {
        self.traces.clear();
        self
    }

    pub fn set_debug(&mut self, debug: DebugCallbacks) -> &mut Self {
        self.debug = Some(debug);
        self
    }

    pub fn clear_debug(&mut self) -> &mut Self {
        self.debug = None;
        self
    }

    // --- results ---

    fn wrap(&self, items: Vec<Value>) -> Result<Value> {
        let wrapped = match &self.wrapper {
            Some(wrapper) => wrapper(items)?,
            None => Value::List(items),
        };
        Ok(match self.config.shape {
            Shape::One => output::unwrap_single(wrapped),
            Shape::Many => wrapped,
        })
    }

    /// The current results, leaving outgoing untouched. A pending element
    /// error is reported and stays pending.
    pub fn peek(&self) -> Result<Value> {
        let items = self.buffers.peek_outgoing();
        if let Some(err) = self.fault.pending() {
            return Err(err);
        }
        self.wrap(items)
    }

    /// The current results, draining outgoing. In query mode incoming
    /// then reverts to the baseline.
    pub fn read(&mut self) -> Result<Value> {
        let items = self.buffers.take_outgoing();
        let result = self.fault.check().and_then(|()| self.wrap(items));
        if self.config.context == Context::Query {
            self.history.revert(&mut self.buffers);
        }
        result
    }

    /// The current results, then a clean slate: buffers, history and pins
    /// are all cleared.
    pub fn close(&mut self) -> Result<Value> {
        let items = self.buffers.take_outgoing();
        let result = self.fault.check().and_then(|()| self.wrap(items));
        self.buffers.clear_all();
        self.history.clear();
        result
    }

    /// Number of incoming things.
    ///
    /// Never returns for an infinite source.
    pub fn len(&self) -> usize {
        self.buffers.incoming().remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Chain {
    fn default() -> Self {
        Chain::new()
    }
}

fn write_buffer(f: &mut fmt::Formatter<'_>, label: &str, items: &[Value]) -> fmt::Result {
    write!(f, " {label}={}", Value::List(items.to_vec()))
}

impl fmt::Display for Chain {
    /// `<Chain in=[..] work=[..] hold=[..] out=[..]>`, read from forks.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (incoming, working, holding, outgoing) = self.buffers.contents();
        f.write_str("<Chain")?;
        write_buffer(f, "in", &incoming)?;
        write_buffer(f, "work", &working)?;
        write_buffer(f, "hold", &holding)?;
        write_buffer(f, "out", &outgoing)?;
        f.write_str(">")
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("config", &self.config)
            .field("worker", &self.worker)
            .field("history", &self.history.len())
            .field("traces", &self.traces.len())
            .finish()
    }
}
