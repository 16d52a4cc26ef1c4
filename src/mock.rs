//-
// Copyright 2024 The proptest developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The mock driver: a synthesized interface instance driven by a model.

use std::fmt;
use std::sync::Mutex;

use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};

use crate::errors::ModelError;
use crate::model::{CallArgs, Model};
use crate::store::{lock, StateCell};

/// A mock instance of the modeled interface.
///
/// Every call advances the model state and returns a value sampled from the
/// return descriptor's generator, all under one [`StateCell::swap`], so
/// concurrent callers observe a linearizable sequence of transitions. The
/// mock is deterministic: with the same seed and the same call order it
/// returns the same values ([`with_seed`](Self::with_seed) pins the seed;
/// the default is proptest's standard deterministic RNG).
///
/// The mock does *not* enforce `requires` or `precondition` on the calls
/// made against it; those only constrain sequence generation. A mock will
/// happily answer a call the generator would never produce, the same way a
/// real implementation would have to.
pub struct Mock<S, A, T> {
    model: Model<S, A, T>,
    store: StateCell<S>,
    rng: Mutex<TestRng>,
}

impl<S: fmt::Debug, A, T> fmt::Debug for Mock<S, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Mock")
            .field("store", &self.store)
            .finish()
    }
}

impl<S, A, T> Mock<S, A, T>
where
    S: Clone + fmt::Debug + 'static,
    A: CallArgs + Clone + fmt::Debug + 'static,
    T: Clone + fmt::Debug + 'static,
{
    /// Create a mock with a private (ephemeral) state cell initialized from
    /// the model's initial state.
    pub fn new(model: Model<S, A, T>) -> Self {
        let store = StateCell::new(model.initial_state());
        Mock {
            model,
            store,
            rng: Mutex::new(TestRng::deterministic_rng(RngAlgorithm::default())),
        }
    }

    /// Share an external state cell instead of the private one.
    ///
    /// All mocks holding clones of one cell coordinate over the same state,
    /// modeling shared backing storage.
    pub fn with_store(mut self, store: StateCell<S>) -> Self {
        self.store = store;
        self
    }

    /// Pin the RNG used to sample return values.
    pub fn with_seed(self, seed: [u8; 32]) -> Self {
        Mock {
            rng: Mutex::new(TestRng::from_seed(RngAlgorithm::ChaCha, &seed)),
            ..self
        }
    }

    /// A handle to this mock's state cell, for sharing with further mocks.
    pub fn store(&self) -> &StateCell<S> {
        &self.store
    }

    /// Clone out the current model state.
    pub fn state(&self) -> S {
        self.store.get()
    }

    /// Dispatch one call against the mock.
    ///
    /// Under a single `swap`: applies the model's reducer, samples one
    /// value from the return generator, checks the value against the
    /// descriptor's own predicate, and commits the next state. Errors only
    /// when the model itself is inconsistent (unknown method, missing or
    /// self-contradicting return generator); the state is left unchanged in
    /// that case.
    pub fn try_call(&self, args: &A) -> Result<T, ModelError> {
        let method = self
            .model
            .method(args.method_id())
            .ok_or(ModelError::UnknownMethod {
                method: args.method_id(),
            })?;

        // Snapshot the RNG outside the swap: the swap body may be replayed
        // under contention and must resample identically each attempt. The
        // advanced RNG is committed only after the swap succeeds.
        let base = lock(&self.rng).clone();
        let mut advanced: Option<TestRng> = None;

        let out = self.store.swap(|state| {
            let ret = method.apply(state, args);
            let mut sampler = TestRunner::new_with_rng(
                Config {
                    failure_persistence: None,
                    ..Config::default()
                },
                base.clone(),
            );
            match ret.sample(method.id(), &mut sampler) {
                Ok(value) => {
                    advanced = Some(sampler.rng().clone());
                    (ret.state_after(state), Ok(value))
                }
                Err(e) => (state.clone(), Err(e)),
            }
        });

        if let Some(rng) = advanced {
            *lock(&self.rng) = rng;
        }
        out
    }

    /// Dispatch one call, panicking if the model is inconsistent.
    ///
    /// This is the form used from test code, where an unusable model is a
    /// programming error; see [`try_call`](Self::try_call) for the
    /// fallible variant.
    pub fn call(&self, args: &A) -> T {
        self.try_call(args).unwrap_or_else(|e| panic!("{}", e))
    }
}
