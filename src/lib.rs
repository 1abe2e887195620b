//! # lazychain-rs
//!
//! Lazy, replayable chain pipelines with snapshots and undo.
//!
//! A [`Chain`] is a session over four buffers. Things are inserted into
//! *incoming*; each operation copies incoming into *working*, produces into
//! *holding* and commits holding to *outgoing*. Reading packages outgoing
//! with the current output wrapper.
//!
//! ## Overview
//!
//! - **Lazy sequences**: buffers are duplicable lazy handles over a shared
//!   backing store, so copying a buffer never reads its source
//! - **Snapshots**: every operation checkpoints incoming; `undo` restores
//!   an earlier state, a pinned baseline, or the original input
//! - **Lazy operations**: element-wise operations and prefixes are queued
//!   and only run as their results are read, so endless sources work; an
//!   element error surfaces at the read that reaches it
//! - **Transactions**: results are committed even when an operation fails
//!   part way
//! - **Workers**: operations are driven by a callable or a compiled
//!   pattern (regex, glob or parse templates)
//!
//! ## Example
//!
//! ```
//! use lazychain_rs::{Chain, MathOp, Op, Value};
//!
//! let mut chain = Chain::from_things(vec![1, 2, 3, 4]);
//! chain.set_worker(|value, _| Ok(Value::Int(value.as_i64().unwrap_or(0) * 10)));
//!
//! chain.map()?.apply(Op::Math(MathOp::Sum))?;
//! assert_eq!(chain.read()?, Value::Int(100));
//!
//! chain.undo_original().in_out();
//! assert_eq!(chain.read()?, Value::from(vec![1, 2, 3, 4]));
//! # Ok::<(), lazychain_rs::ChainError>(())
//! ```

pub mod buffer;
pub mod chain;
pub mod config;
pub mod dsl;
pub mod error;
pub mod history;
pub mod op;
pub mod output;
pub mod pipeline;
pub mod scope;
pub mod tee;
pub mod trace;
pub mod value;
pub mod worker;

pub use chain::Chain;
pub use config::{Balance, ChainConfig, Context, Mode, Shape};
pub use dsl::{execute_script, execute_script_traced};
pub use error::{ChainError, Result};
pub use op::{CompareOp, FilterOp, MapOp, MathOp, Op, OrderOp, ReduceOp, RepeatOp, SliceOp};
pub use output::{ErrorPolicy, OutputWrapper};
pub use tee::LazySeq;
pub use trace::{DebugCallbacks, OpTrace};
pub use value::Value;
pub use worker::{Engine, Matcher, Params, PatternFlags, Worker};
