//! End-to-end behaviour of a chain session.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use lazychain_rs::{
    Chain, ChainError, DebugCallbacks, ErrorPolicy, MathOp, Op, OrderOp, ReduceOp,
    RepeatOp, SliceOp, Value,
};

fn ints(items: &[i64]) -> Value {
    Value::List(items.iter().map(|&n| Value::Int(n)).collect())
}

#[test]
fn test_append_then_read_unwraps_single_thing() {
    let mut chain = Chain::new();
    chain.append("x");
    assert_eq!(chain.read().unwrap(), Value::from("x"));
}

#[test]
fn test_append_keeps_containers_whole() {
    let mut chain = Chain::new();
    chain.append(vec![1, 2]);
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.read().unwrap(), ints(&[1, 2]));
}

#[test]
fn test_len_counts_inserted_minus_cleared() {
    let mut chain = Chain::new();
    chain.extend(vec![1, 2, 3]).append(4).prepend(0);
    assert_eq!(chain.len(), 5);
    chain.clear_in();
    assert_eq!(chain.len(), 0);
    chain.extend(vec![7, 8]);
    assert_eq!(chain.len(), 2);
}

#[test]
fn test_snapshot_then_undo_restores_incoming() {
    let mut chain = Chain::from_things(vec![1, 2]);
    chain.snapshot(false, false);
    chain.extend(vec![3, 4]).append(5);
    chain.undo(0).in_out();
    assert_eq!(chain.read().unwrap(), ints(&[1, 2]));
}

#[test]
fn test_undo_one_step_after_two_snapshots() {
    let mut chain = Chain::from_things(vec![1]);
    chain.snapshot(false, false);
    chain.append(2);
    chain.snapshot(false, false);
    chain.append(3);
    chain.undo(1).in_out();
    assert_eq!(chain.read().unwrap(), Value::Int(1));
}

#[test]
fn test_undo_with_empty_history_clears_silently() {
    let mut chain = Chain::from_things(vec![1, 2]);
    chain.undo(0);
    assert!(chain.is_empty());
    assert_eq!(chain.read().unwrap(), Value::List(vec![]));
}

#[test]
fn test_peek_is_repeatable_and_second_read_is_empty() {
    let mut chain = Chain::from_things(vec![1, 2, 3]);
    let first = chain.peek().unwrap();
    assert_eq!(first, chain.peek().unwrap());
    assert_eq!(chain.read().unwrap(), first);
    assert_eq!(chain.read().unwrap(), Value::List(vec![]));
}

#[test]
fn test_manual_balance() {
    let mut chain = Chain::from_things(vec![1, 2]);
    chain.as_manual().in_out();
    assert!(chain.is_balanced());
    chain.append(3);
    assert!(!chain.is_balanced());
    chain.in_out();
    assert!(chain.is_balanced());
}

#[test]
fn test_is_balanced_reads_nothing() {
    let mut chain = Chain::from_things(vec![1, 2]);
    chain.as_manual().in_out();
    assert!(chain.is_balanced());
    assert!(chain.is_balanced());
    assert_eq!(chain.peek().unwrap(), ints(&[1, 2]));
    assert_eq!(chain.len(), 2);
}

#[test]
fn test_extend_front_places_items_in_reverse() {
    let mut chain = Chain::from_things(vec![5, 4, 3, 2, 1, 1, 2, 3]);
    chain.extend_front(vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(
        chain.read().unwrap(),
        ints(&[6, 5, 4, 3, 2, 1, 5, 4, 3, 2, 1, 1, 2, 3])
    );
}

#[test]
fn test_generic_wrapper_builds_set() {
    let mut chain = Chain::from_things(vec![1, 2, 2, 3]);
    chain.set_wrapper(|items| Ok(Value::Set(items.into_iter().collect())));
    let expected: BTreeSet<Value> = [1, 2, 3].into_iter().map(Value::from).collect();
    assert_eq!(chain.read().unwrap(), Value::Set(expected));
}

#[test]
fn test_merge_whole_sequence() {
    let mut chain = Chain::from_things(vec![vec![1, 2], vec![3, 4]]);
    chain.merge().unwrap();
    assert_eq!(chain.read().unwrap(), ints(&[1, 2, 3, 4]));
}

#[test]
fn test_built_in_wrappers() {
    let mut chain = Chain::from_things(vec![("a", 1), ("b", 2)]);
    chain.as_map();
    let Value::Map(entries) = chain.peek().unwrap() else {
        panic!("expected a map");
    };
    assert_eq!(entries.len(), 2);

    chain.as_tuple();
    assert!(matches!(chain.peek().unwrap(), Value::Tuple(items) if items.len() == 2));

    let mut chain = Chain::from_things(vec!["naïve"]);
    chain.as_ascii(ErrorPolicy::Replace);
    assert_eq!(chain.peek().unwrap(), Value::Bytes(b"na?ve".to_vec()));
    chain.as_ascii(ErrorPolicy::Strict);
    assert!(matches!(chain.peek(), Err(ChainError::Encode { .. })));
    chain.clear_wrapper();
    assert_eq!(chain.peek().unwrap(), Value::from("naïve"));
}

#[test]
fn test_params_reach_the_worker() {
    let mut chain = Chain::from_things(vec![1, 2, 3]);
    chain
        .set_worker(|value, params| {
            let by = params.kwarg("by").and_then(Value::as_i64).unwrap_or(1);
            Ok(Value::Int(value.as_i64().unwrap_or(0) * by))
        })
        .set_params(vec![], [("by".to_string(), Value::Int(5))].into());
    chain.map().unwrap();
    assert_eq!(chain.read().unwrap(), ints(&[5, 10, 15]));

    chain.clear_params().extend(vec![1]).map().unwrap();
    assert_eq!(chain.read().unwrap(), ints(&[5, 10, 15, 1]));
}

#[test]
fn test_failure_commits_partial_output_and_chains_on() {
    let mut chain = Chain::from_things(vec![1, 2, 0, 4]);
    chain.set_worker(|value, _| match value.as_i64() {
        Some(0) => Err(ChainError::Worker("division by zero".to_string())),
        Some(n) => Ok(Value::Int(12 / n)),
        None => Ok(Value::Null),
    });
    chain.map().unwrap();
    let err = chain.read().unwrap_err();
    assert_eq!(err.to_string(), "worker failed: division by zero");

    // auto balance mirrored the partial result into incoming
    chain.apply(Op::Math(MathOp::Sum)).unwrap();
    assert_eq!(chain.read().unwrap(), Value::Int(18));
}

#[test]
fn test_failure_upstream_fails_the_reading_operation() {
    let mut chain = Chain::from_things(vec![1, 0, 3]);
    chain.set_worker(|value, _| match value.as_i64() {
        Some(0) => Err(ChainError::Worker("zero".to_string())),
        _ => Ok(value.clone()),
    });
    chain.map().unwrap();
    let err = chain.apply(Op::Math(MathOp::Sum)).unwrap_err();
    assert!(matches!(err, ChainError::Worker(_)));

    let traces = chain.trace();
    assert!(traces.iter().all(|t| t.failed));
    assert_eq!((traces[1].consumed, traces[1].emitted), (1, 0));
    // reported once
    assert_eq!(chain.read().unwrap(), Value::List(vec![]));
}

#[test]
fn test_operations_wait_for_a_read() {
    let pulled = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&pulled);
    let source = (1..=6).map(move |n| {
        *counter.borrow_mut() += 1;
        n
    });
    let mut chain = Chain::from_things(source);
    chain.set_worker(|value, _| Ok(Value::Int(value.as_i64().unwrap_or(0) * 10)));
    chain.map().unwrap();
    chain.set_worker(|value, _| Ok(Value::Bool(value.as_i64().unwrap_or(0) > 20)));
    chain.filter().unwrap();
    assert_eq!(*pulled.borrow(), 0);

    assert_eq!(chain.read().unwrap(), ints(&[30, 40, 50, 60]));
    assert_eq!(*pulled.borrow(), 6);
}

#[test]
fn test_endless_source_through_map_and_first() {
    let mut chain = Chain::from_things(1..);
    chain.set_worker(|value, _| Ok(Value::Int(value.as_i64().unwrap_or(0) * 2)));
    chain.map().unwrap();
    chain.apply(Op::Slice(SliceOp::First(3))).unwrap();
    assert_eq!(chain.read().unwrap(), ints(&[2, 4, 6]));
}

#[test]
fn test_snapshot_before_every_append_stays_flat() {
    let mut chain = Chain::new();
    chain.as_manual();
    for n in 0..100_000 {
        chain.snapshot(false, false).append(n);
    }
    assert_eq!(chain.len(), 100_000);
    assert_eq!(chain.history_len(), 100_000);

    chain.undo(0);
    assert_eq!(chain.len(), 99_999);
}

#[test]
fn test_set_wrapper_unwraps_a_single_member() {
    let mut chain = Chain::from_things(vec![2, 2]);
    chain.as_set();
    assert_eq!(chain.read().unwrap(), Value::Int(2));

    let mut chain = Chain::from_things(vec![1, 2, 2, 3]);
    chain.as_set();
    let expected: BTreeSet<Value> = [1, 2, 3].into_iter().map(Value::from).collect();
    assert_eq!(chain.read().unwrap(), Value::Set(expected));
}

#[test]
fn test_configuration_errors_leave_state_alone() {
    let mut chain = Chain::from_things(vec![1, 2]);
    let dice = Op::Slice(SliceOp::Dice {
        size: 0,
        fill: None,
    });
    assert!(matches!(
        chain.apply(dice),
        Err(ChainError::InvalidOperation { op: "DICE", .. })
    ));
    assert!(matches!(
        chain.apply(Op::Order(OrderOp::Group)),
        Err(ChainError::NoWorker { op: "GROUP" })
    ));
    assert_eq!(chain.history_len(), 0);
    assert_eq!(chain.read().unwrap(), ints(&[1, 2]));
}

#[test]
fn test_baseline_pins_and_undo_baseline() {
    let mut chain = Chain::from_things(vec![1]);
    chain.snapshot(false, false);
    chain.append(2);
    chain.snapshot(true, false);
    chain.append(3);
    chain.undo_baseline().in_out();
    assert_eq!(chain.read().unwrap(), ints(&[1, 2]));
    assert_eq!(chain.history_len(), 0);

    // the baseline is spent
    chain.undo_baseline();
    assert!(chain.is_empty());
}

#[test]
fn test_first_snapshot_does_not_pin() {
    let mut chain = Chain::from_things(vec![1]);
    chain.snapshot(true, false);
    chain.append(2);
    chain.undo_baseline();
    assert!(chain.is_empty());
}

#[test]
fn test_query_mode_answers_from_baseline() {
    let mut chain = Chain::from_things(vec![4, 8, 15, 16, 23, 42]);
    chain.as_query();

    chain.apply(Op::Math(MathOp::Max)).unwrap();
    assert_eq!(chain.read().unwrap(), Value::Int(42));

    chain
        .apply(Op::Slice(SliceOp::First(2)))
        .unwrap()
        .apply(Op::Math(MathOp::Sum))
        .unwrap();
    assert_eq!(chain.read().unwrap(), Value::Int(12));

    chain.apply(Op::Math(MathOp::Count)).unwrap();
    assert_eq!(chain.read().unwrap(), Value::Int(6));
}

#[test]
fn test_many_shape_runs_unit_operations_per_thing() {
    let mut chain = Chain::from_things(vec![vec![3, 1, 2], vec![9, 7]]);
    chain.as_many();
    chain.apply(Op::Order(OrderOp::Sort {
        by_worker: false,
        descending: false,
    }))
    .unwrap();
    assert_eq!(
        chain.peek().unwrap(),
        Value::List(vec![ints(&[1, 2, 3]), ints(&[7, 9])])
    );
    chain.apply(Op::Math(MathOp::Max)).unwrap();
    assert_eq!(chain.read().unwrap(), ints(&[3, 9]));
}

#[test]
fn test_lazy_source_is_not_pulled_early() {
    let pulled = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&pulled);
    let source = (1..=5).map(move |n| {
        *counter.borrow_mut() += 1;
        n
    });
    let mut chain = Chain::from_things(source);
    chain.snapshot(false, false).extend(vec![6]);
    assert_eq!(*pulled.borrow(), 0);

    assert_eq!(chain.peek().unwrap(), ints(&[1, 2, 3, 4, 5, 6]));
    assert_eq!(chain.len(), 6);
    assert_eq!(*pulled.borrow(), 5);
}

#[test]
fn test_range_generator_and_repeat() {
    let mut chain = Chain::new();
    chain
        .apply(Op::Repeat(RepeatOp::Range {
            start: 1,
            stop: 4,
            step: 1,
        }))
        .unwrap()
        .apply(Op::Repeat(RepeatOp::Times(2)))
        .unwrap();
    assert_eq!(chain.read().unwrap(), ints(&[1, 2, 3, 1, 2, 3]));
}

#[test]
fn test_many_appends_stay_readable() {
    let mut chain = Chain::new();
    for n in 0..20_000 {
        chain.append(n);
    }
    assert_eq!(chain.len(), 20_000);
    chain.apply(Op::Math(MathOp::Sum)).unwrap();
    assert_eq!(chain.read().unwrap(), Value::Int((0..20_000).sum::<i64>()));
}

#[test]
fn test_debug_callbacks_and_trace() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let starts = Rc::clone(&events);
    let completes = Rc::clone(&events);

    let mut chain = Chain::from_things(vec![vec![1], vec![2, 3]]);
    chain.set_debug(
        DebugCallbacks::new()
            .on_start(move |idx, name| starts.borrow_mut().push(format!("{idx}:{name}")))
            .on_complete(move |trace| completes.borrow_mut().push(trace.to_string())),
    );
    chain.apply(Op::Reduce(ReduceOp::Smash)).unwrap();
    chain.apply(Op::Math(MathOp::Count)).unwrap();

    assert_eq!(
        *events.borrow(),
        vec!["0:SMASH", "[0] SMASH: 2 -> 3", "1:COUNT", "[1] COUNT: 3 -> 1"]
    );
    assert_eq!(chain.trace().len(), 2);
    chain.clear_trace();
    assert!(chain.trace().is_empty());
}

#[test]
fn test_close_returns_result_and_resets() {
    let mut chain = Chain::from_things(vec![2, 4]);
    chain.apply(Op::Math(MathOp::Average)).unwrap();
    assert_eq!(chain.close().unwrap(), Value::Float(3.0));
    assert!(chain.is_empty());
    assert_eq!(chain.history_len(), 0);
    assert_eq!(chain.to_string(), "<Chain in=[] work=[] hold=[] out=[]>");
}
