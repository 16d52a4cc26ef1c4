//-
// Copyright 2024 The proptest developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Strategy and shrinking for state-consistent call sequences.
//!
//! Shrinking a stateful sequence as a plain vector is unsound: deleting a
//! call can invalidate the `requires`/`precondition` of every call after
//! it. The value tree here therefore filters every shrink candidate through
//! a full state replay ([`Model::replay`]) and only keeps candidates that
//! are still valid executions of the state machine. Every sequence that
//! reaches a driver, generated or shrunk, replays cleanly.

use std::fmt;
use std::ops::{Bound, RangeBounds};

use proptest::strategy::{NewTree, Strategy, ValueTree};
use proptest::test_runner::{Reason, TestRunner};

use crate::model::{CallArgs, Method, Model, Return};

/// The maximum sequence length used when the size range leaves its upper
/// end unbounded.
pub const DEFAULT_MAX_CALLS: usize = 10;

/// One generated call: the chosen method, its arguments, the model's
/// predicted [`Return`], and the model state after the call.
pub struct CallRecord<S, A, T> {
    method_id: &'static str,
    args: A,
    ret: Return<S, T>,
    state_after: S,
}

impl<S, A, T> CallRecord<S, A, T> {
    pub(crate) fn new(
        method_id: &'static str,
        args: A,
        ret: Return<S, T>,
        state_after: S,
    ) -> Self {
        CallRecord {
            method_id,
            args,
            ret,
            state_after,
        }
    }

    /// The identifier of the called method.
    pub fn method_id(&self) -> &'static str {
        self.method_id
    }

    /// The generated arguments.
    pub fn args(&self) -> &A {
        &self.args
    }

    /// The model's return descriptor for this call.
    pub fn ret(&self) -> &Return<S, T> {
        &self.ret
    }

    /// The model state after this call.
    pub fn state_after(&self) -> &S {
        &self.state_after
    }
}

impl<S, A: fmt::Debug, T> fmt::Debug for CallRecord<S, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({:?})", self.method_id, self.args)
    }
}

/// An ordered, state-consistent sequence of calls.
pub struct CallSequence<S, A, T> {
    calls: Vec<CallRecord<S, A, T>>,
}

impl<S, A, T> CallSequence<S, A, T> {
    pub(crate) fn new(calls: Vec<CallRecord<S, A, T>>) -> Self {
        CallSequence { calls }
    }

    /// The calls in execution order.
    pub fn calls(&self) -> &[CallRecord<S, A, T>] {
        &self.calls
    }

    /// Number of calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl<S, A: fmt::Debug, T> fmt::Debug for CallSequence<S, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.calls.iter()).finish()
    }
}

/// Strategy for call sequences; see [`Model::sequential_strategy`].
#[must_use = "strategies do nothing unless used"]
pub struct CallSequenceStrategy<S, A, T> {
    model: Model<S, A, T>,
    min_len: usize,
    max_len: usize,
}

impl<S, A, T> fmt::Debug for CallSequenceStrategy<S, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CallSequenceStrategy")
            .field("model", &"<model>")
            .field("size", &(self.min_len..=self.max_len))
            .finish()
    }
}

impl<S, A, T> CallSequenceStrategy<S, A, T> {
    pub(crate) fn new(
        model: Model<S, A, T>,
        size: impl RangeBounds<usize>,
    ) -> Self {
        let min_len = match size.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
            Bound::Unbounded => 1,
        }
        .max(1);
        let max_len = match size.end_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_sub(1),
            Bound::Unbounded => DEFAULT_MAX_CALLS,
        }
        .max(min_len);
        CallSequenceStrategy {
            model,
            min_len,
            max_len,
        }
    }
}

impl<S, A, T> Strategy for CallSequenceStrategy<S, A, T>
where
    S: Clone + fmt::Debug + 'static,
    A: CallArgs + Clone + fmt::Debug + 'static,
    T: Clone + fmt::Debug + 'static,
{
    type Tree = CallSequenceValueTree<S, A, T>;
    type Value = CallSequence<S, A, T>;

    fn new_tree(&self, runner: &mut TestRunner) -> NewTree<Self> {
        let min_len = self.min_len;
        let target =
            (min_len..=self.max_len).new_tree(runner)?.current();

        let mut state = self.model.initial_state();
        let mut steps: Vec<Step<A>> = Vec::with_capacity(target);
        while steps.len() < target {
            let selector = self
                .model
                .select_method(&state)
                .map_err(|e| Reason::from(e.to_string()))?;
            let id = selector.new_tree(runner)?.current();
            let ix = self.model.method_index(id).ok_or_else(|| {
                Reason::from(format!(
                    "gen_method produced unknown method `{}`",
                    id
                ))
            })?;
            let method: &Method<S, A, T> = &self.model.methods()[ix];
            if !method.enabled(&state) {
                // A gen_method override may propose disabled methods.
                runner.reject_local(format!(
                    "method `{}` is not enabled in the current state",
                    id
                ))?;
                continue;
            }

            let args = loop {
                let tree = method.args(&state).new_tree(runner)?;
                if method.accepts(&state, &tree.current()) {
                    break tree;
                }
                runner.reject_local(format!(
                    "`{}` precondition rejected generated args",
                    id
                ))?;
            };

            let ret = method.apply(&state, &args.current());
            state = ret.state_after(&state);
            steps.push(Step { args });
        }

        let len = steps.len();
        Ok(CallSequenceValueTree {
            model: self.model.clone(),
            steps,
            included: vec![true; len],
            min_len,
            shrink: Shrink::DeleteCall(0),
            prev_shrink: None,
        })
    }
}

struct Step<A> {
    args: Box<dyn ValueTree<Value = A>>,
}

#[derive(Clone, Copy, Debug)]
enum Shrink {
    DeleteCall(usize),
    ShrinkArgs(usize),
}

/// The `ValueTree` backing [`CallSequenceStrategy`].
///
/// Shrinking first tries to delete calls, then to shrink the arguments of
/// the surviving calls, in both cases keeping only candidates that replay
/// cleanly through the state machine.
pub struct CallSequenceValueTree<S, A, T> {
    model: Model<S, A, T>,
    steps: Vec<Step<A>>,
    included: Vec<bool>,
    min_len: usize,
    shrink: Shrink,
    prev_shrink: Option<Shrink>,
}

impl<S, A, T> fmt::Debug for CallSequenceValueTree<S, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CallSequenceValueTree")
            .field("len", &self.steps.len())
            .field("included", &self.included)
            .field("shrink", &self.shrink)
            .field("prev_shrink", &self.prev_shrink)
            .finish()
    }
}

impl<S, A, T> CallSequenceValueTree<S, A, T>
where
    S: Clone + fmt::Debug + 'static,
    A: CallArgs + Clone + fmt::Debug + 'static,
    T: Clone + fmt::Debug + 'static,
{
    fn included_count(&self) -> usize {
        self.included.iter().filter(|i| **i).count()
    }

    fn included_args(&self) -> Vec<A> {
        self.steps
            .iter()
            .zip(&self.included)
            .filter(|(_, included)| **included)
            .map(|(step, _)| step.args.current())
            .collect()
    }

    fn replay(&self) -> Option<CallSequence<S, A, T>> {
        self.model.replay(&self.included_args())
    }

    /// Complicate `steps[ix]` until the sequence replays cleanly again.
    ///
    /// The value before the offending simplification was part of a valid
    /// sequence, and complication converges back to it, so this terminates.
    fn complicate_into_valid(&mut self, ix: usize) {
        while self.replay().is_none() {
            if !self.steps[ix].args.complicate() {
                panic!(
                    "unable to complicate call arguments back into a \
                     state-consistent sequence"
                );
            }
        }
    }
}

impl<S, A, T> ValueTree for CallSequenceValueTree<S, A, T>
where
    S: Clone + fmt::Debug + 'static,
    A: CallArgs + Clone + fmt::Debug + 'static,
    T: Clone + fmt::Debug + 'static,
{
    type Value = CallSequence<S, A, T>;

    fn current(&self) -> Self::Value {
        self.replay()
            .expect("shrink filter let an invalid call sequence through")
    }

    fn simplify(&mut self) -> bool {
        while let Shrink::DeleteCall(ix) = self.shrink {
            if ix >= self.steps.len() {
                self.shrink = Shrink::ShrinkArgs(0);
                break;
            }
            self.shrink = Shrink::DeleteCall(ix + 1);
            if !self.included[ix] || self.included_count() <= self.min_len {
                continue;
            }
            self.included[ix] = false;
            if self.replay().is_some() {
                self.prev_shrink = Some(Shrink::DeleteCall(ix));
                return true;
            }
            // Later calls depended on the state this one established.
            self.included[ix] = true;
        }

        while let Shrink::ShrinkArgs(ix) = self.shrink {
            if ix >= self.steps.len() {
                return false;
            }
            if !self.included[ix] {
                self.shrink = Shrink::ShrinkArgs(ix + 1);
                continue;
            }
            if !self.steps[ix].args.simplify() {
                self.shrink = Shrink::ShrinkArgs(ix + 1);
                continue;
            }
            if self.replay().is_some() {
                self.prev_shrink = Some(Shrink::ShrinkArgs(ix));
                return true;
            }
            // The shrunk arguments break the state machine; back this call
            // out and move on.
            self.complicate_into_valid(ix);
            self.shrink = Shrink::ShrinkArgs(ix + 1);
        }

        false
    }

    fn complicate(&mut self) -> bool {
        match self.prev_shrink {
            None => false,
            Some(Shrink::DeleteCall(ix)) => {
                self.included[ix] = true;
                self.prev_shrink = None;
                true
            }
            Some(Shrink::ShrinkArgs(ix)) => {
                if self.steps[ix].args.complicate() {
                    self.complicate_into_valid(ix);
                    true
                } else {
                    self.prev_shrink = None;
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{CallArgs, Method, Model, Return};
    use proptest::prelude::*;
    use proptest::test_runner::TestRunner;

    // A session-ish model: `open` must come first, `read` requires an open
    // session, `close` ends it. Exercises requires, preconditions and
    // state-dependent argument generation.
    #[derive(Clone, Debug, PartialEq)]
    enum SessionCall {
        Open,
        Read(u8),
        Close,
    }

    impl CallArgs for SessionCall {
        fn method_id(&self) -> &'static str {
            match self {
                SessionCall::Open => "open",
                SessionCall::Read(..) => "read",
                SessionCall::Close => "close",
            }
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    enum SessionRet {
        Opened,
        Data(u8),
        Closed,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct SessionState {
        open: bool,
        reads: u8,
    }

    fn session_model() -> Model<SessionState, SessionCall, SessionRet> {
        Model::builder(|| SessionState {
            open: false,
            reads: 0,
        })
        .method(
            Method::new(
                "open",
                |_: &SessionState| Just(SessionCall::Open).boxed(),
                |state, _| {
                    Return::eq(SessionRet::Opened).with_next_state(
                        SessionState {
                            open: true,
                            reads: state.reads,
                        },
                    )
                },
            )
            .requires(|state: &SessionState| !state.open),
        )
        .method(
            Method::new(
                "read",
                |_: &SessionState| (0u8..=64).prop_map(SessionCall::Read).boxed(),
                |state, args| {
                    let n = match args {
                        SessionCall::Read(n) => *n,
                        _ => unreachable!(),
                    };
                    Return::eq(SessionRet::Data(n)).with_next_state(
                        SessionState {
                            open: true,
                            reads: state.reads.saturating_add(1),
                        },
                    )
                },
            )
            .requires(|state: &SessionState| state.open)
            .precondition(|_, args| {
                matches!(args, SessionCall::Read(n) if *n <= 64)
            }),
        )
        .method(
            Method::new(
                "close",
                |_: &SessionState| Just(SessionCall::Close).boxed(),
                |state, _| {
                    Return::eq(SessionRet::Closed).with_next_state(
                        SessionState {
                            open: false,
                            reads: state.reads,
                        },
                    )
                },
            )
            .requires(|state: &SessionState| state.open),
        )
        .build()
    }

    fn assert_valid(sequence: &CallSequence<SessionState, SessionCall, SessionRet>) {
        let model = session_model();
        let args: Vec<SessionCall> =
            sequence.calls().iter().map(|c| c.args().clone()).collect();
        let replayed = model.replay(&args).expect("sequence must replay");
        let expected: Vec<&SessionState> =
            replayed.calls().iter().map(|c| c.state_after()).collect();
        let actual: Vec<&SessionState> =
            sequence.calls().iter().map(|c| c.state_after()).collect();
        assert_eq!(expected, actual);
    }

    #[test]
    fn generated_sequences_replay_cleanly() {
        let model = session_model();
        let strategy = model.sequential_strategy(1..12);
        let mut runner = TestRunner::deterministic();
        for _ in 0..64 {
            let tree = strategy.new_tree(&mut runner).unwrap();
            let sequence = tree.current();
            assert!(!sequence.is_empty());
            assert_valid(&sequence);
        }
    }

    #[test]
    fn sequences_never_start_with_a_gated_method() {
        let model = session_model();
        let strategy = model.sequential_strategy(1..12);
        let mut runner = TestRunner::deterministic();
        for _ in 0..64 {
            let sequence = strategy.new_tree(&mut runner).unwrap().current();
            assert_eq!("open", sequence.calls()[0].method_id());
        }
    }

    #[test]
    fn shrinking_preserves_validity() {
        let model = session_model();
        let strategy = model.sequential_strategy(4..12);
        let mut runner = TestRunner::deterministic();
        for _ in 0..16 {
            let mut tree = strategy.new_tree(&mut runner).unwrap();
            // Walk the whole shrink frontier as if every candidate kept
            // failing; every candidate the tree exposes must be valid.
            while tree.simplify() {
                let sequence = tree.current();
                assert!(sequence.len() >= 1);
                assert_valid(&sequence);
            }
        }
    }

    #[test]
    fn complicate_undoes_the_previous_shrink() {
        let model = session_model();
        let strategy = model.sequential_strategy(4..10);
        let mut runner = TestRunner::deterministic();
        for _ in 0..16 {
            let mut tree = strategy.new_tree(&mut runner).unwrap();
            let before = tree.current().len();
            if tree.simplify() {
                assert!(tree.complicate());
                let restored = tree.current();
                assert_eq!(before, restored.len());
                assert_valid(&restored);
            }
        }
    }

    #[test]
    fn single_call_sequences_do_not_shrink_away() {
        let model = session_model();
        let strategy = model.sequential_strategy(1..=1);
        let mut runner = TestRunner::deterministic();
        let mut tree = strategy.new_tree(&mut runner).unwrap();
        assert_eq!(1, tree.current().len());
        while tree.simplify() {
            assert_eq!(1, tree.current().len());
        }
        assert_eq!(1, tree.current().len());
    }

    #[test]
    fn recompute_is_idempotent_for_generated_sequences() {
        let model = session_model();
        let strategy = model.sequential_strategy(1..10);
        let mut runner = TestRunner::deterministic();
        for _ in 0..32 {
            let sequence = strategy.new_tree(&mut runner).unwrap().current();
            let args: Vec<SessionCall> =
                sequence.calls().iter().map(|c| c.args().clone()).collect();
            let replayed = model.replay(&args).unwrap();
            let again = model
                .replay(
                    &replayed
                        .calls()
                        .iter()
                        .map(|c| c.args().clone())
                        .collect::<Vec<_>>(),
                )
                .unwrap();
            assert_eq!(replayed.len(), again.len());
            for (a, b) in replayed.calls().iter().zip(again.calls()) {
                assert_eq!(a.method_id(), b.method_id());
                assert_eq!(a.args(), b.args());
                assert_eq!(a.state_after(), b.state_after());
            }
        }
    }
}
