//-
// Copyright 2024 The proptest developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types for model construction and model-internal inconsistencies.

use std::fmt;

/// Errors raised when a model is malformed or internally inconsistent.
///
/// Construction-time variants (`NoMethods`, `DuplicateMethod`,
/// `NoEnabledMethod`) are returned by [`ModelBuilder::try_build`] and turned
/// into panics by [`ModelBuilder::build`]. The remaining variants surface at
/// generation or mock time, when the model contradicts itself.
///
/// Any `ModelError` converts into a `TestCaseError` failure via proptest's
/// blanket `From<E: Error>` impl, so `?` works inside properties.
///
/// [`ModelBuilder::try_build`]: crate::model::ModelBuilder::try_build
/// [`ModelBuilder::build`]: crate::model::ModelBuilder::build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The model was built without any method descriptors.
    NoMethods,
    /// Two method descriptors share an identifier.
    DuplicateMethod {
        /// The offending identifier.
        method: &'static str,
    },
    /// No method's `requires` holds in the given state, so no call can be
    /// generated from it. Carries a debug snapshot of the state.
    NoEnabledMethod {
        /// Debug rendering of the state in which selection failed.
        state: String,
    },
    /// A call was dispatched for a method the model does not define.
    UnknownMethod {
        /// The unknown identifier.
        method: &'static str,
    },
    /// A return descriptor has no value generator, so the mock cannot
    /// synthesize a return for this method.
    MissingReturnGen {
        /// The method whose return cannot be generated.
        method: &'static str,
    },
    /// The return descriptor's generator itself failed to produce a value.
    GenFailed {
        /// The method whose return generator failed.
        method: &'static str,
        /// The generator's rejection reason.
        message: String,
    },
    /// The return descriptor's generator produced a value that fails the
    /// descriptor's own predicate.
    InconsistentReturn {
        /// The method whose descriptor contradicts itself.
        method: &'static str,
        /// Debug rendering of the offending value.
        value: String,
        /// The predicate label the value was expected to satisfy.
        expected: String,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelError::NoMethods => {
                write!(f, "model error: a model must define at least one method")
            }
            ModelError::DuplicateMethod { method } => {
                write!(f, "model error: duplicate method id `{}`", method)
            }
            ModelError::NoEnabledMethod { state } => write!(
                f,
                "model error: no method's `requires` holds, \
                 state = {}",
                state
            ),
            ModelError::UnknownMethod { method } => {
                write!(f, "model error: no method with id `{}`", method)
            }
            ModelError::MissingReturnGen { method } => write!(
                f,
                "model error: method = {}, the return descriptor has no \
                 value generator",
                method
            ),
            ModelError::GenFailed { method, message } => write!(
                f,
                "model error: method = {}, return generator failed: {}",
                method, message
            ),
            ModelError::InconsistentReturn {
                method,
                value,
                expected,
            } => write!(
                f,
                "model error: method = {}, generated return {} fails its \
                 own predicate (expected = {})",
                method, value, expected
            ),
        }
    }
}

impl std::error::Error for ModelError {}

/// A contract violation detected by a driver: the implementation's return
/// failed the model's predicate for the call.
#[derive(Debug, Clone)]
pub struct ContractViolation<T> {
    /// The method whose contract was violated.
    pub method: &'static str,
    /// The label of the predicate the return was expected to satisfy.
    pub expected: String,
    /// The value the implementation actually returned.
    pub actual: T,
}

impl<T: fmt::Debug> fmt::Display for ContractViolation<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "contract violation: method = {}, expected = {}, actual = {:?}",
            self.method, self.expected, self.actual
        )
    }
}

impl<T: fmt::Debug> std::error::Error for ContractViolation<T> {}

/// Errors returned by [`Proxy::try_call`](crate::proxy::Proxy::try_call).
#[derive(Debug, Clone)]
pub enum ProxyError<T> {
    /// The model itself is inconsistent (unknown method, unusable return
    /// generator).
    Model(ModelError),
    /// The wrapped implementation's return failed the model's predicate.
    Violation(ContractViolation<T>),
}

impl<T: fmt::Debug> fmt::Display for ProxyError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProxyError::Model(e) => e.fmt(f),
            ProxyError::Violation(v) => v.fmt(f),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for ProxyError<T> {}

impl<T> From<ModelError> for ProxyError<T> {
    fn from(e: ModelError) -> Self {
        ProxyError::Model(e)
    }
}
