// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::ordered_queue::OrderedQueue,
    runtime::{
        fail,
        scheduler::tcb::ThreadControlBlock,
    },
};
use ::std::{
    cell::RefCell,
    sync::atomic::{
        AtomicUsize,
        Ordering,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Threads parked on a synchronization object.
///
/// The queue itself must only be touched with preemption blocked. The length is mirrored in an atomic so that it can
/// be peeked at without holding the gate.
#[derive(Default)]
pub struct WaitQueue {
    threads: RefCell<OrderedQueue<Box<ThreadControlBlock>>>,
    len: AtomicUsize,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl WaitQueue {
    pub fn push(&self, tcb: Box<ThreadControlBlock>) {
        match self.threads.try_borrow_mut() {
            Ok(mut threads) => {
                threads.push(tcb);
                self.len.store(threads.len(), Ordering::Release);
            },
            Err(_) => fail::fatal("wait queue accessed reentrantly"),
        }
    }

    pub fn pop(&self) -> Option<Box<ThreadControlBlock>> {
        match self.threads.try_borrow_mut() {
            Ok(mut threads) => {
                let tcb: Option<Box<ThreadControlBlock>> = threads.pop_front();
                self.len.store(threads.len(), Ordering::Release);
                tcb
            },
            Err(_) => fail::fatal("wait queue accessed reentrantly"),
        }
    }

    /// Safe to call without the gate held. The answer may be stale by the time it is used.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }
}
