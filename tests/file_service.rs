//-
// Copyright 2024 The proptest developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! End-to-end tests of the drivers against a small file-service model:
//! `create_file` fails on an existing name, `delete_file` needs an existing
//! name, `file_exists` reports membership.

use std::collections::BTreeSet;
use std::thread;

use proptest::prelude::*;
use proptest::sample::select;
use proptest::test_runner::{Config, TestError};
use proptest_contract::{
    prop_contract, test_model, verify, CallArgs, ExecutedCall, Method, Mock,
    Model, Proxy, ProxyError, Return, StateCell, SystemUnderTest,
};

#[derive(Clone, Debug, PartialEq)]
enum FsCall {
    CreateFile(String),
    DeleteFile(String),
    FileExists(String),
}

impl FsCall {
    fn name(&self) -> &str {
        match self {
            FsCall::CreateFile(name)
            | FsCall::DeleteFile(name)
            | FsCall::FileExists(name) => name,
        }
    }
}

impl CallArgs for FsCall {
    fn method_id(&self) -> &'static str {
        match self {
            FsCall::CreateFile(..) => "create_file",
            FsCall::DeleteFile(..) => "delete_file",
            FsCall::FileExists(..) => "file_exists",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum FsRet {
    Ok,
    ErrFileExists,
    Exists(bool),
}

#[derive(Clone, Debug, PartialEq)]
struct FsState {
    files: BTreeSet<String>,
}

// A small name pool keeps collisions (and therefore interesting traces)
// frequent.
fn arb_name() -> impl Strategy<Value = String> {
    select(vec!["a", "b", "c"]).prop_map(str::to_owned)
}

fn fs_model() -> Model<FsState, FsCall, FsRet> {
    Model::builder(|| FsState {
        files: BTreeSet::new(),
    })
    .method(Method::new(
        "create_file",
        |_: &FsState| arb_name().prop_map(FsCall::CreateFile).boxed(),
        |state, args| {
            let name = args.name();
            if state.files.contains(name) {
                Return::eq(FsRet::ErrFileExists)
            } else {
                let mut files = state.files.clone();
                files.insert(name.to_owned());
                Return::eq(FsRet::Ok).with_next_state(FsState { files })
            }
        },
    ))
    .method(
        Method::new(
            "delete_file",
            |state: &FsState| {
                let names: Vec<String> =
                    state.files.iter().cloned().collect();
                select(names).prop_map(FsCall::DeleteFile).boxed()
            },
            |state, args| {
                let mut files = state.files.clone();
                files.remove(args.name());
                Return::eq(FsRet::Ok).with_next_state(FsState { files })
            },
        )
        .requires(|state: &FsState| !state.files.is_empty())
        .precondition(|state, args| state.files.contains(args.name())),
    )
    .method(Method::new(
        "file_exists",
        |_: &FsState| arb_name().prop_map(FsCall::FileExists).boxed(),
        |state, args| {
            Return::eq(FsRet::Exists(state.files.contains(args.name())))
        },
    ))
    .build()
}

/// A faithful implementation.
#[derive(Default)]
struct GoodFs {
    files: BTreeSet<String>,
}

impl SystemUnderTest<FsCall, FsRet> for GoodFs {
    fn call(&mut self, args: &FsCall) -> FsRet {
        match args {
            FsCall::CreateFile(name) => {
                if self.files.insert(name.clone()) {
                    FsRet::Ok
                } else {
                    FsRet::ErrFileExists
                }
            }
            FsCall::DeleteFile(name) => {
                self.files.remove(name);
                FsRet::Ok
            }
            FsCall::FileExists(name) => {
                FsRet::Exists(self.files.contains(name))
            }
        }
    }
}

/// Pretends every create succeeds and no file ever exists.
#[derive(Default)]
struct BrokenFs;

impl SystemUnderTest<FsCall, FsRet> for BrokenFs {
    fn call(&mut self, args: &FsCall) -> FsRet {
        match args {
            FsCall::CreateFile(..) | FsCall::DeleteFile(..) => FsRet::Ok,
            FsCall::FileExists(..) => FsRet::Exists(false),
        }
    }

    fn teardown(&mut self, _executed: &[ExecutedCall<FsCall, FsRet>]) {}
}

fn quiet(cases: u32) -> Config {
    Config {
        cases,
        failure_persistence: None,
        ..Config::default()
    }
}

// Mock determinism on the state machine itself.
#[test]
fn mock_reports_duplicate_creates() {
    let mock = Mock::new(fs_model());
    assert_eq!(FsRet::Ok, mock.call(&FsCall::CreateFile("x".to_owned())));
    assert_eq!(
        FsRet::ErrFileExists,
        mock.call(&FsCall::CreateFile("x".to_owned()))
    );
}

// One mock under concurrent callers.
#[test]
fn mock_is_thread_safe() {
    let mock = Mock::new(fs_model());
    let hits = thread::scope(|scope| {
        let handles: Vec<_> = (0..100)
            .map(|i| {
                let mock = &mock;
                scope.spawn(move || {
                    let name = format!("f{}", i);
                    assert_eq!(
                        FsRet::Ok,
                        mock.call(&FsCall::CreateFile(name.clone()))
                    );
                    match mock.call(&FsCall::FileExists(name)) {
                        FsRet::Exists(true) => 1usize,
                        other => panic!("unexpected return {:?}", other),
                    }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum::<usize>()
    });
    assert_eq!(100, hits);
}

// A faithful implementation passes.
#[test]
fn faithful_implementation_verifies() {
    let model = fs_model();
    let result = verify(&model, GoodFs::default, 1..12, quiet(100));
    assert!(result.is_ok(), "unexpected failure: {:?}", result);
}

// A broken implementation fails, and the counterexample shrinks
// to two calls on the same name.
#[test]
fn broken_implementation_shrinks_to_two_calls() {
    let model = fs_model();
    match verify(&model, BrokenFs::default, 1..12, quiet(256)) {
        Err(TestError::Fail(_, sequence)) => {
            assert_eq!(2, sequence.len(), "sequence: {:?}", sequence);
            let first = &sequence.calls()[0];
            let second = &sequence.calls()[1];
            assert_eq!("create_file", first.method_id());
            assert_eq!(first.args().name(), second.args().name());
            assert!(
                matches!(second.method_id(), "create_file" | "file_exists"),
                "sequence: {:?}",
                sequence
            );
        }
        other => panic!("expected a failure, got {:?}", other),
    }
}

// The proxy flags the violation on the second create.
#[test]
fn proxy_rejects_contract_violations() {
    let proxy = Proxy::new(fs_model(), BrokenFs);
    assert_eq!(
        FsRet::Ok,
        proxy.call(&FsCall::CreateFile("/foo".to_owned()))
    );
    match proxy.try_call(&FsCall::CreateFile("/foo".to_owned())) {
        Err(ProxyError::Violation(violation)) => {
            assert_eq!("create_file", violation.method);
            assert_eq!(FsRet::Ok, violation.actual);
            assert!(violation.expected.contains("ErrFileExists"));
        }
        other => panic!("expected a violation, got {:?}", other),
    }
}

// Two mocks sharing one cell model shared backing storage.
#[test]
fn shared_cells_connect_mocks() {
    let model = fs_model();
    let cell = StateCell::new(model.initial_state());
    let mock_a = Mock::new(model.clone()).with_store(cell.clone());
    let mock_b = Mock::new(model).with_store(cell);
    assert_eq!(FsRet::Ok, mock_a.call(&FsCall::CreateFile("y".to_owned())));
    assert_eq!(
        FsRet::Exists(true),
        mock_b.call(&FsCall::FileExists("y".to_owned()))
    );
}

#[test]
fn file_service_model_is_self_consistent() {
    let model = fs_model();
    assert!(test_model(&model, 1..12, quiet(64)).is_ok());
}

// The same conformance property, declared through the macro.
prop_contract! {
    #![proptest_config(Config {
        cases: 32,
        failure_persistence: None,
        .. Config::default()
    })]

    #[test]
    fn file_service_conforms_via_macro(
        sequential 1..10 => fs_model(), GoodFs::default);
}
