//-
// Copyright 2024 The proptest developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The proxy driver: a pass-through wrapper that cross-checks a real
//! implementation against the model on every call.

use std::fmt;
use std::sync::Mutex;

use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};

use crate::errors::{ContractViolation, ModelError, ProxyError};
use crate::model::{CallArgs, Model};
use crate::store::{lock, StateCell};
use crate::verify::SystemUnderTest;

/// Which value a [`Proxy`] hands back to its caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnSource {
    /// The wrapped implementation's return (the default).
    Implementation,
    /// A fresh value sampled from the model's return generator.
    Model,
}

/// A checking wrapper around a real implementation.
///
/// Each call advances the model state, forwards to the wrapped
/// implementation, and fails with a [`ContractViolation`] when the
/// implementation's return does not satisfy the model's predicate. Intended
/// for integration tests: real code paths run, and the model's
/// post-conditions are checked continuously.
pub struct Proxy<I, S, A, T> {
    model: Model<S, A, T>,
    store: StateCell<S>,
    subject: Mutex<I>,
    returns: ReturnSource,
    rng: Mutex<TestRng>,
}

impl<I, S: fmt::Debug, A, T> fmt::Debug for Proxy<I, S, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("store", &self.store)
            .field("returns", &self.returns)
            .finish()
    }
}

impl<I, S, A, T> Proxy<I, S, A, T>
where
    I: SystemUnderTest<A, T>,
    S: Clone + fmt::Debug + 'static,
    A: CallArgs + Clone + fmt::Debug + 'static,
    T: Clone + fmt::Debug + 'static,
{
    /// Wrap `subject`, with a private state cell initialized from the
    /// model's initial state.
    pub fn new(model: Model<S, A, T>, subject: I) -> Self {
        let store = StateCell::new(model.initial_state());
        Proxy {
            model,
            store,
            subject: Mutex::new(subject),
            returns: ReturnSource::Implementation,
            rng: Mutex::new(TestRng::deterministic_rng(RngAlgorithm::default())),
        }
    }

    /// Share an external state cell instead of the private one.
    pub fn with_store(mut self, store: StateCell<S>) -> Self {
        self.store = store;
        self
    }

    /// Choose which value calls return; see [`ReturnSource`].
    pub fn returning(mut self, returns: ReturnSource) -> Self {
        self.returns = returns;
        self
    }

    /// Recover the wrapped implementation.
    pub fn into_inner(self) -> I {
        self.subject
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Dispatch one call through the proxy.
    ///
    /// Advances the model state under one swap, invokes the wrapped
    /// implementation, and checks its return against the model's predicate.
    pub fn try_call(&self, args: &A) -> Result<T, ProxyError<T>> {
        let method = self
            .model
            .method(args.method_id())
            .ok_or(ModelError::UnknownMethod {
                method: args.method_id(),
            })?;

        let ret = self.store.swap(|state| {
            let ret = method.apply(state, args);
            let next = ret.state_after(state);
            (next, ret)
        });

        let actual = lock(&self.subject).call(args);

        if !ret.check(&actual) {
            return Err(ProxyError::Violation(ContractViolation {
                method: method.id(),
                expected: ret.label().to_owned(),
                actual,
            }));
        }

        match self.returns {
            ReturnSource::Implementation => Ok(actual),
            ReturnSource::Model => {
                let mut guard = lock(&self.rng);
                let mut sampler = TestRunner::new_with_rng(
                    Config {
                        failure_persistence: None,
                        ..Config::default()
                    },
                    guard.clone(),
                );
                let value = ret.sample(method.id(), &mut sampler)?;
                *guard = sampler.rng().clone();
                Ok(value)
            }
        }
    }

    /// Dispatch one call, panicking on a contract violation.
    pub fn call(&self, args: &A) -> T {
        self.try_call(args).unwrap_or_else(|e| panic!("{}", e))
    }
}
