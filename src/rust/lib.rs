// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

//======================================================================================================================
// Modules
//======================================================================================================================

pub mod collections;
pub mod pal;
pub mod runtime;

mod global;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    global::{
        create,
        current,
        exit,
        join,
        runtime,
        try_join,
        yield_now,
    },
    runtime::{
        config::Config,
        fail::Fail,
        logging,
        preemption::{
            CooperativeGate,
            PreemptionGate,
        },
        scheduler::{
            mutex::{
                Mutex,
                MutexStatus,
            },
            tcb::{
                ExitValue,
                ThreadId,
                ThreadStatus,
            },
        },
        Runtime,
        SharedRuntime,
    },
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, otherwise bails out of the enclosing function with an [anyhow::Error].
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    anyhow::bail!(r#"ensure failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`"#, left_val, right_val)
                }
            }
        }
    });
    ($left:expr, $right:expr,) => ({
        $crate::ensure_eq!($left, $right)
    });
}

/// Ensures that two expressions are not equal, otherwise bails out of the enclosing function with an [anyhow::Error].
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    anyhow::bail!(r#"ensure failed: `(left != right)`
  left: `{:?}`,
 right: `{:?}`"#, left_val, right_val)
                }
            }
        }
    });
    ($left:expr, $right:expr,) => ({
        $crate::ensure_neq!($left, $right)
    });
}
