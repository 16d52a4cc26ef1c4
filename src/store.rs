//-
// Copyright 2024 The proptest developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The mutable cell holding a mock's model state.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering from poisoning.
///
/// A panicking mock caller must not wedge the cell; teardown and later
/// callers still need to observe the state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The cell holding the state shared by mock (and proxy) instances.
///
/// A fresh `StateCell::new` is a private, per-instance cell. Cloning a
/// `StateCell` shares the underlying cell, which is how several mock
/// instances are made to coordinate over one state ("a database and its
/// clients"):
///
/// ```rust,ignore
/// let cell = StateCell::new(model.initial_state());
/// let db_a = Mock::new(model.clone()).with_store(cell.clone());
/// let db_b = Mock::new(model.clone()).with_store(cell.clone());
/// ```
///
/// Updates go through [`swap`](Self::swap), which makes the sequence of
/// state transitions across all sharers linearizable: concurrent calls
/// commit in a total order, and each caller observes the state of its
/// position in that order.
pub struct StateCell<S> {
    cell: Arc<Mutex<S>>,
}

impl<S> Clone for StateCell<S> {
    fn clone(&self) -> Self {
        StateCell {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for StateCell<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.cell.try_lock() {
            Ok(guard) => f.debug_tuple("StateCell").field(&*guard).finish(),
            Err(_) => f.debug_tuple("StateCell").field(&"<locked>").finish(),
        }
    }
}

impl<S> StateCell<S> {
    /// Create a cell holding `initial`.
    pub fn new(initial: S) -> Self {
        StateCell {
            cell: Arc::new(Mutex::new(initial)),
        }
    }

    /// Reset the cell to `value`.
    pub fn set(&self, value: S) {
        *lock(&self.cell) = value;
    }

    /// Atomically replace the cell's value.
    ///
    /// `f` receives the current value and returns the replacement together
    /// with a result passed back to the caller. `f` must be free of external
    /// side effects: the contract permits a contending implementation to
    /// invoke it more than once before a replacement commits. (The current
    /// cell is lock-based and invokes it exactly once, but callers must not
    /// rely on that.)
    pub fn swap<R>(&self, mut f: impl FnMut(&S) -> (S, R)) -> R {
        let mut guard = lock(&self.cell);
        let (next, out) = f(&guard);
        *guard = next;
        out
    }

    /// Clone the current value out of the cell.
    pub fn get(&self) -> S
    where
        S: Clone,
    {
        lock(&self.cell).clone()
    }
}
