//-
// Copyright 2024 The proptest developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The verify driver: run generated call sequences against a concrete
//! implementation and check every return against the model.

use std::fmt;
use std::mem;
use std::ops::RangeBounds;
use std::panic::{catch_unwind, AssertUnwindSafe};

use proptest::test_runner::{
    Config, TestCaseError, TestCaseResult, TestError, TestRunner, INFO_LOG,
};

use crate::model::{CallArgs, Model};
use crate::strategy::CallSequence;

/// A concrete implementation of the modeled interface.
///
/// `call` dispatches one operation; implementations match on the argument
/// enum. `teardown` is invoked by the verify driver when a test case ends,
/// on every exit path (success, predicate failure, or a panic out of
/// `call`), with the calls executed so far. The default does nothing.
pub trait SystemUnderTest<A: CallArgs, T> {
    /// Execute one operation.
    fn call(&mut self, args: &A) -> T;

    /// Release whatever the test case acquired.
    fn teardown(&mut self, executed: &[ExecutedCall<A, T>]) {
        let _ = executed;
    }
}

/// One call that was actually executed against an implementation.
#[derive(Clone, Debug)]
pub struct ExecutedCall<A, T> {
    /// The identifier of the executed method.
    pub method_id: &'static str,
    /// The arguments it was called with.
    pub args: A,
    /// What the implementation returned.
    pub ret: T,
}

// Scoped acquisition of the system under test: teardown runs when the
// guard drops, which covers every exit path out of `run_sequence`. A panic
// inside teardown is caught and logged so it cannot mask the primary
// result.
struct TeardownGuard<I: SystemUnderTest<A, T>, A: CallArgs, T> {
    sut: I,
    executed: Vec<ExecutedCall<A, T>>,
}

impl<I: SystemUnderTest<A, T>, A: CallArgs, T> Drop for TeardownGuard<I, A, T> {
    fn drop(&mut self) {
        let executed = mem::take(&mut self.executed);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.sut.teardown(&executed);
        }));
        if outcome.is_err() {
            eprintln!(
                "proptest-contract: teardown panicked after {} executed \
                 call(s); the original test result is preserved",
                executed.len()
            );
        }
    }
}

/// Run one call sequence against `sut`.
///
/// Applies the calls in order, comparing each implementation return against
/// the model's predicate, and fails with a structured diagnostic on the
/// first violation. `sut.teardown` runs on all exit paths with the executed
/// prefix. Public so that `prop_contract!` and hand-written `proptest!`
/// blocks can drive it directly.
pub fn run_sequence<S, A, T, I>(
    config: &Config,
    sequence: &CallSequence<S, A, T>,
    sut: I,
) -> TestCaseResult
where
    S: Clone + fmt::Debug,
    A: CallArgs + Clone + fmt::Debug,
    T: Clone + fmt::Debug,
    I: SystemUnderTest<A, T>,
{
    let total = sequence.len();
    if config.verbose >= INFO_LOG {
        eprintln!();
        eprintln!("Running a contract test case with {} call(s).", total);
    }

    let mut guard = TeardownGuard {
        sut,
        executed: Vec::with_capacity(total),
    };

    for (ix, call) in sequence.calls().iter().enumerate() {
        if config.verbose >= INFO_LOG {
            eprintln!("Applying call {}/{}: {:?}", ix + 1, total, call);
        }

        let actual = guard.sut.call(call.args());
        guard.executed.push(ExecutedCall {
            method_id: call.method_id(),
            args: call.args().clone(),
            ret: actual.clone(),
        });

        if !call.ret().check(&actual) {
            return Err(TestCaseError::fail(format!(
                "contract violation: method = {}, args = {:?}, \
                 expected = {}, actual = {:?}",
                call.method_id(),
                call.args(),
                call.ret().label(),
                actual
            )));
        }
    }

    Ok(())
}

/// The property that a concrete implementation conforms to `model`.
///
/// Generates call sequences of length drawn from `size`, instantiates a
/// fresh implementation per case via `new_sut`, and checks every return
/// against the model's predicates. On failure the sequence is shrunk to a
/// minimal counterexample that still replays through the state machine,
/// and returned inside [`TestError::Fail`].
///
/// Panics out of the implementation are caught by proptest's runner and
/// shrink like ordinary failures; teardown still runs for them.
pub fn verify<S, A, T, I>(
    model: &Model<S, A, T>,
    new_sut: impl Fn() -> I,
    size: impl RangeBounds<usize>,
    config: Config,
) -> Result<(), TestError<CallSequence<S, A, T>>>
where
    S: Clone + fmt::Debug + 'static,
    A: CallArgs + Clone + fmt::Debug + 'static,
    T: Clone + fmt::Debug + 'static,
    I: SystemUnderTest<A, T>,
{
    let strategy = model.sequential_strategy(size);
    let mut runner = TestRunner::new(config.clone());
    runner.run(&strategy, move |sequence| {
        run_sequence(&config, &sequence, new_sut())
    })
}

/// The model self-check property: every generated call's return descriptor
/// must have a usable generator, and the values it generates must satisfy
/// the descriptor's own predicate.
///
/// Run this once per model; it catches descriptors the mock driver would
/// reject at call time.
pub fn test_model<S, A, T>(
    model: &Model<S, A, T>,
    size: impl RangeBounds<usize>,
    config: Config,
) -> Result<(), TestError<CallSequence<S, A, T>>>
where
    S: Clone + fmt::Debug + 'static,
    A: CallArgs + Clone + fmt::Debug + 'static,
    T: Clone + fmt::Debug + 'static,
{
    let strategy = model.sequential_strategy(size);
    let mut runner = TestRunner::new(config);
    runner.run(&strategy, |sequence| {
        let mut sampler = TestRunner::deterministic();
        for call in sequence.calls() {
            call.ret().sample(call.method_id(), &mut sampler)?;
        }
        Ok(())
    })
}

/// Declare `#[test]` functions that verify an implementation against a
/// model, in the style of `proptest-state-machine`'s `prop_state_machine!`.
///
/// The function "arguments" are: the `sequential` keyword, a size range for
/// the number of generated calls, `=>`, an expression evaluating to the
/// [`Model`], and an expression evaluating to a factory
/// (`impl Fn() -> impl SystemUnderTest<_, _>`) for fresh implementations.
///
/// ## Example
///
/// ```rust,ignore
/// prop_contract! {
///     #![proptest_config(Config { cases: 64, ..Config::default() })]
///
///     #[test]
///     fn file_service_conforms(sequential 1..20 => fs_model(), RealFs::default);
/// }
/// ```
#[macro_export]
macro_rules! prop_contract {
    (#![proptest_config($config:expr)]
    $(
        $(#[$meta:meta])*
        fn $test_name:ident(sequential $size:expr => $model:expr, $factory:expr);
    )*) => {
        $(
            $(#[$meta])*
            fn $test_name() {
                match $crate::verify(&$model, $factory, $size, $config) {
                    ::core::result::Result::Ok(()) => (),
                    ::core::result::Result::Err(e) => panic!("{}", e),
                }
            }
        )*
    };

    ($(
        $(#[$meta:meta])*
        fn $test_name:ident(sequential $size:expr => $model:expr, $factory:expr);
    )*) => {
        $(
            $(#[$meta])*
            fn $test_name() {
                match $crate::verify(
                    &$model,
                    $factory,
                    $size,
                    ::proptest::test_runner::Config::default(),
                ) {
                    ::core::result::Result::Ok(()) => (),
                    ::core::result::Result::Err(e) => panic!("{}", e),
                }
            }
        )*
    };
}
