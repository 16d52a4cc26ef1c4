//-
// Copyright 2024 The proptest developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The model abstraction: return descriptors, method descriptors and the
//! model itself.
//!
//! A [`Model`] is a declarative specification of a stateful interface: a set
//! of [`Method`]s, each of which describes when it is interesting to call an
//! operation (`requires`), how to generate arguments for it (`args` +
//! `precondition`), and what a call does to the model state and to the
//! caller ([`Return`]). The same model drives sequence generation
//! ([`Model::sequential_strategy`]), conformance testing
//! ([`verify`](crate::verify::verify)), mock synthesis
//! ([`Mock`](crate::mock::Mock)) and checking proxies
//! ([`Proxy`](crate::proxy::Proxy)).

use std::fmt;
use std::ops::RangeBounds;
use std::sync::Arc;

use proptest::sample::select;
use proptest::strategy::{BoxedStrategy, Just, Strategy, ValueTree};
use proptest::test_runner::TestRunner;

use crate::errors::ModelError;
use crate::strategy::{CallRecord, CallSequence, CallSequenceStrategy};

/// Maps a heterogeneous argument record back to the method it belongs to.
///
/// Callers model the interface's argument tuples as one enum with a variant
/// per method; `method_id` is the string-keyed dispatch hook the mock and
/// proxy drivers use to find the matching [`Method`].
pub trait CallArgs {
    /// The identifier of the method these arguments belong to.
    fn method_id(&self) -> &'static str;
}

/// The model's prediction for a single call: a predicate the
/// implementation's return must satisfy, an optional generator of conforming
/// return values, and the state after the call.
pub struct Return<S, T> {
    predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
    label: String,
    gen: Option<BoxedStrategy<T>>,
    next_state: Option<S>,
}

impl<S: fmt::Debug, T> fmt::Debug for Return<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Return")
            .field("predicate", &self.label)
            .field("gen", &self.gen.as_ref().map(|_| "<strategy>"))
            .field("next_state", &self.next_state)
            .finish()
    }
}

impl<S, T> Return<S, T> {
    /// A return descriptor from an opaque predicate.
    ///
    /// `label` names the predicate in diagnostics. The descriptor has no
    /// value generator until [`with_gen`](Self::with_gen) attaches one, so
    /// it cannot be used by the mock driver as-is.
    pub fn satisfies(
        label: impl Into<String>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Return {
            predicate: Arc::new(predicate),
            label: label.into(),
            gen: None,
            next_state: None,
        }
    }

    /// A return descriptor expecting exactly `expected`.
    ///
    /// Both the predicate and the value generator are derived from the
    /// expected value, so the descriptor is immediately usable by every
    /// driver.
    pub fn eq(expected: T) -> Self
    where
        T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        let label = format!("== {:?}", expected);
        let gen = Just(expected.clone()).boxed();
        Return {
            predicate: Arc::new(move |v| *v == expected),
            label,
            gen: Some(gen),
            next_state: None,
        }
    }

    /// Attach a generator of conforming return values.
    pub fn with_gen(mut self, gen: impl Strategy<Value = T> + 'static) -> Self
    where
        T: fmt::Debug,
    {
        self.gen = Some(gen.boxed());
        self
    }

    /// Set the model state after this call. Without it the state is
    /// unchanged.
    pub fn with_next_state(mut self, next: S) -> Self {
        self.next_state = Some(next);
        self
    }

    /// Whether `value` satisfies this descriptor's predicate.
    pub fn check(&self, value: &T) -> bool {
        (self.predicate)(value)
    }

    /// The diagnostic label of the predicate.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The attached value generator, if any.
    pub fn generator(&self) -> Option<&BoxedStrategy<T>> {
        self.gen.as_ref()
    }

    /// The state after this call, given the state it was made in.
    pub fn state_after(&self, current: &S) -> S
    where
        S: Clone,
    {
        match &self.next_state {
            Some(next) => next.clone(),
            None => current.clone(),
        }
    }

    /// Sample one conforming return value from the descriptor's generator.
    ///
    /// Errors if the descriptor has no generator, the generator fails, or
    /// the sampled value does not satisfy the descriptor's own predicate
    /// (an internally inconsistent model).
    pub fn sample(
        &self,
        method: &'static str,
        runner: &mut TestRunner,
    ) -> Result<T, ModelError>
    where
        T: fmt::Debug,
    {
        let gen = self
            .gen
            .as_ref()
            .ok_or(ModelError::MissingReturnGen { method })?;
        let tree = gen.new_tree(runner).map_err(|reason| {
            ModelError::GenFailed {
                method,
                message: reason.to_string(),
            }
        })?;
        let value = tree.current();
        if !(self.predicate)(&value) {
            return Err(ModelError::InconsistentReturn {
                method,
                value: format!("{:?}", value),
                expected: self.label.clone(),
            });
        }
        Ok(value)
    }
}

type RequiresFn<S> = Arc<dyn Fn(&S) -> bool + Send + Sync>;
type ArgsFn<S, A> = Arc<dyn Fn(&S) -> BoxedStrategy<A> + Send + Sync>;
type PreconditionFn<S, A> = Arc<dyn Fn(&S, &A) -> bool + Send + Sync>;
type BodyFn<S, A, T> = Arc<dyn Fn(&S, &A) -> Return<S, T> + Send + Sync>;

/// One operation of the modeled interface.
///
/// Construct with [`Method::new`], then optionally narrow it with
/// [`requires`](Self::requires) and [`precondition`](Self::precondition)
/// (both default to always-true).
pub struct Method<S, A, T> {
    id: &'static str,
    requires: RequiresFn<S>,
    args: ArgsFn<S, A>,
    precondition: PreconditionFn<S, A>,
    body: BodyFn<S, A, T>,
}

impl<S, A, T> Clone for Method<S, A, T> {
    fn clone(&self) -> Self {
        Method {
            id: self.id,
            requires: Arc::clone(&self.requires),
            args: Arc::clone(&self.args),
            precondition: Arc::clone(&self.precondition),
            body: Arc::clone(&self.body),
        }
    }
}

impl<S, A, T> fmt::Debug for Method<S, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("requires", &"<function>")
            .field("args", &"<function>")
            .field("precondition", &"<function>")
            .field("body", &"<function>")
            .finish()
    }
}

impl<S, A, T> Method<S, A, T> {
    /// Create a method descriptor.
    ///
    /// `args` produces an argument strategy for a given state; `body` is the
    /// model's transition reducer, mapping state and arguments to a
    /// [`Return`].
    pub fn new(
        id: &'static str,
        args: impl Fn(&S) -> BoxedStrategy<A> + Send + Sync + 'static,
        body: impl Fn(&S, &A) -> Return<S, T> + Send + Sync + 'static,
    ) -> Self {
        Method {
            id,
            requires: Arc::new(|_| true),
            args: Arc::new(args),
            precondition: Arc::new(|_, _| true),
            body: Arc::new(body),
        }
    }

    /// Restrict the states in which it is interesting to call this method.
    pub fn requires(
        mut self,
        requires: impl Fn(&S) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.requires = Arc::new(requires);
        self
    }

    /// Restrict which generated arguments are acceptable in a given state.
    pub fn precondition(
        mut self,
        precondition: impl Fn(&S, &A) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.precondition = Arc::new(precondition);
        self
    }

    /// The method's identifier.
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Whether this method is interesting to call in `state`.
    pub fn enabled(&self, state: &S) -> bool {
        (self.requires)(state)
    }

    /// The argument strategy for `state`.
    pub fn args(&self, state: &S) -> BoxedStrategy<A> {
        (self.args)(state)
    }

    /// Whether `args` are acceptable in `state`.
    pub fn accepts(&self, state: &S, args: &A) -> bool {
        (self.precondition)(state, args)
    }

    /// Apply the model's reducer to produce the predicted [`Return`].
    pub fn apply(&self, state: &S, args: &A) -> Return<S, T> {
        (self.body)(state, args)
    }
}

type InitialStateFn<S> = Box<dyn Fn() -> S + Send + Sync>;
type GenMethodFn<S> =
    Box<dyn Fn(&S) -> BoxedStrategy<&'static str> + Send + Sync>;

struct Inner<S, A, T> {
    methods: Vec<Method<S, A, T>>,
    initial_state: InitialStateFn<S>,
    gen_method: Option<GenMethodFn<S>>,
}

/// A declarative model of a stateful interface.
///
/// Cheap to clone; clones share the method set.
pub struct Model<S, A, T> {
    inner: Arc<Inner<S, A, T>>,
}

impl<S, A, T> Clone for Model<S, A, T> {
    fn clone(&self) -> Self {
        Model {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A, T> fmt::Debug for Model<S, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ids: Vec<&'static str> =
            self.inner.methods.iter().map(Method::id).collect();
        f.debug_struct("Model")
            .field("methods", &ids)
            .field("initial_state", &"<function>")
            .field(
                "gen_method",
                &self.inner.gen_method.as_ref().map(|_| "<function>"),
            )
            .finish()
    }
}

impl<S, A, T> Model<S, A, T>
where
    S: Clone + fmt::Debug + 'static,
    A: CallArgs + Clone + fmt::Debug + 'static,
    T: Clone + fmt::Debug + 'static,
{
    /// Start building a model whose initial state is produced by
    /// `initial_state`.
    pub fn builder(
        initial_state: impl Fn() -> S + Send + Sync + 'static,
    ) -> ModelBuilder<S, A, T> {
        ModelBuilder {
            methods: Vec::new(),
            initial_state: Box::new(initial_state),
            gen_method: None,
        }
    }

    /// Look up a method by identifier.
    pub fn method(&self, id: &str) -> Option<&Method<S, A, T>> {
        self.inner.methods.iter().find(|m| m.id == id)
    }

    /// All methods of the model.
    pub fn methods(&self) -> &[Method<S, A, T>] {
        &self.inner.methods
    }

    pub(crate) fn method_index(&self, id: &str) -> Option<usize> {
        self.inner.methods.iter().position(|m| m.id == id)
    }

    /// A fresh initial state.
    pub fn initial_state(&self) -> S {
        (self.inner.initial_state)()
    }

    /// The method-selection strategy for `state`.
    ///
    /// The default selects uniformly among methods whose `requires` holds;
    /// a `gen_method` override supplied at build time replaces it. Errors
    /// if no method is enabled in `state` (an inconsistency in the model).
    pub fn select_method(
        &self,
        state: &S,
    ) -> Result<BoxedStrategy<&'static str>, ModelError> {
        if let Some(gen_method) = &self.inner.gen_method {
            return Ok(gen_method(state));
        }
        let enabled: Vec<&'static str> = self
            .inner
            .methods
            .iter()
            .filter(|m| m.enabled(state))
            .map(Method::id)
            .collect();
        if enabled.is_empty() {
            return Err(ModelError::NoEnabledMethod {
                state: format!("{:?}", state),
            });
        }
        Ok(select(enabled).boxed())
    }

    /// A strategy producing state-consistent call sequences of length
    /// drawn from `size`.
    ///
    /// The lower end is clamped to 1; an unbounded upper end defaults to
    /// [`DEFAULT_MAX_CALLS`](crate::strategy::DEFAULT_MAX_CALLS).
    pub fn sequential_strategy(
        &self,
        size: impl RangeBounds<usize>,
    ) -> CallSequenceStrategy<S, A, T> {
        CallSequenceStrategy::new(self.clone(), size)
    }

    /// Replay an argument sequence through the state machine.
    ///
    /// Returns `None` when any step names an unknown method or violates
    /// `requires`/`precondition` in the state reached by the preceding
    /// steps. Otherwise returns the sequence with every return descriptor
    /// freshly recomputed, which makes the replayed state path
    /// authoritative. This is the validity filter the shrinker applies to
    /// every candidate.
    pub fn replay(&self, calls: &[A]) -> Option<CallSequence<S, A, T>> {
        let mut state = self.initial_state();
        let mut records = Vec::with_capacity(calls.len());
        for args in calls {
            let method = self.method(args.method_id())?;
            if !method.enabled(&state) || !method.accepts(&state, args) {
                return None;
            }
            let ret = method.apply(&state, args);
            let next = ret.state_after(&state);
            records.push(CallRecord::new(
                method.id(),
                args.clone(),
                ret,
                next.clone(),
            ));
            state = next;
        }
        Some(CallSequence::new(records))
    }
}

/// Builder for [`Model`]. See [`Model::builder`].
pub struct ModelBuilder<S, A, T> {
    methods: Vec<Method<S, A, T>>,
    initial_state: InitialStateFn<S>,
    gen_method: Option<GenMethodFn<S>>,
}

impl<S, A, T> ModelBuilder<S, A, T>
where
    S: Clone + fmt::Debug + 'static,
    A: CallArgs + Clone + fmt::Debug + 'static,
    T: Clone + fmt::Debug + 'static,
{
    /// Add a method descriptor.
    pub fn method(mut self, method: Method<S, A, T>) -> Self {
        self.methods.push(method);
        self
    }

    /// Override the default uniform method selection.
    ///
    /// The strategy must yield identifiers of methods whose `requires`
    /// holds in the given state; the sequence generator rejects anything
    /// else.
    pub fn gen_method(
        mut self,
        gen_method: impl Fn(&S) -> BoxedStrategy<&'static str>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.gen_method = Some(Box::new(gen_method));
        self
    }

    /// Validate and build the model.
    ///
    /// Errors on an empty method set, duplicate method identifiers, or a
    /// model in which no method's `requires` holds in the initial state
    /// (which would make generation impossible).
    pub fn try_build(self) -> Result<Model<S, A, T>, ModelError> {
        if self.methods.is_empty() {
            return Err(ModelError::NoMethods);
        }
        for (ix, method) in self.methods.iter().enumerate() {
            if self.methods[..ix].iter().any(|m| m.id == method.id) {
                return Err(ModelError::DuplicateMethod { method: method.id });
            }
        }
        let initial = (self.initial_state)();
        if !self.methods.iter().any(|m| m.enabled(&initial)) {
            return Err(ModelError::NoEnabledMethod {
                state: format!("{:?}", initial),
            });
        }
        Ok(Model {
            inner: Arc::new(Inner {
                methods: self.methods,
                initial_state: self.initial_state,
                gen_method: self.gen_method,
            }),
        })
    }

    /// Validate and build the model, panicking on a malformed model.
    ///
    /// A malformed model is a programming error in the test suite, so the
    /// panicking form is the usual one; see [`try_build`](Self::try_build)
    /// for the fallible variant.
    pub fn build(self) -> Model<S, A, T> {
        self.try_build().unwrap_or_else(|e| panic!("{}", e))
    }
}
