//-
// Copyright 2024 The proptest developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Model-based contract testing on top of proptest.
//!
//! A [`Model`] describes a stateful interface as a state machine: a set of
//! operations ([`Method`]s) with `requires`/`precondition` filters, argument
//! strategies, and a reducer that predicts each call's return and next state
//! ([`Return`]). One model feeds three drivers:
//!
//! - [`verify`] generates randomized, state-consistent call sequences, runs
//!   them against a real implementation, and shrinks failures to minimal
//!   counterexamples that still replay through the state machine;
//! - [`Mock`] synthesizes a thread-safe stand-in whose calls advance the
//!   model state and return generated, predicate-conforming values;
//! - [`Proxy`] wraps a real implementation and cross-checks every return
//!   against the model's predicates as it passes through.
//!
//! The same specification therefore serves integration tests, unit-test
//! mocks and observing proxies. Sequence generation and shrinking are plain
//! proptest [`Strategy`](proptest::strategy::Strategy) machinery, so the
//! usual `proptest!`/`TestRunner` workflow, `PROPTEST_*` environment
//! overrides and shrinking behavior all apply.

#![deny(bare_trait_objects)]

pub mod errors;
pub mod mock;
pub mod model;
pub mod proxy;
pub mod store;
pub mod strategy;
pub mod verify;

pub use crate::errors::{ContractViolation, ModelError, ProxyError};
pub use crate::mock::Mock;
pub use crate::model::{CallArgs, Method, Model, ModelBuilder, Return};
pub use crate::proxy::{Proxy, ReturnSource};
pub use crate::store::StateCell;
pub use crate::strategy::{
    CallRecord, CallSequence, CallSequenceStrategy, CallSequenceValueTree,
    DEFAULT_MAX_CALLS,
};
pub use crate::verify::{
    run_sequence, test_model, verify, ExecutedCall, SystemUnderTest,
};
