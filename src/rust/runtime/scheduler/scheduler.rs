// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Scheduling state and policy of a runtime.
//!
//! The [Scheduler] owns every thread control block that is not parked on a synchronization object: the running one,
//! the ready ones and the completed ones awaiting a join. Picking the next thread is a pure state transition that
//! yields a [Switch]; performing the switch is left to the runtime, which must drop every borrow of the scheduler
//! before doing so.
//!
//! Policy: approximate shortest-time-to-completion-first by running the thread that has survived the fewest
//! scheduling rounds. Equal ages run in FIFO order.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::ordered_queue::OrderedQueue,
    pal::ExecutionContext,
    runtime::{
        fail::{
            self,
            Fail,
        },
        scheduler::{
            tcb::{
                ThreadControlBlock,
                ThreadId,
                ThreadStatus,
            },
            wait_queue::WaitQueue,
        },
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Task Scheduler
pub struct Scheduler {
    /// Running thread. Only empty in the middle of a rotation.
    current: Option<Box<ThreadControlBlock>>,
    ready: OrderedQueue<Box<ThreadControlBlock>>,
    completed: OrderedQueue<Box<ThreadControlBlock>>,
    /// Next id to issue. Thread 0 has already taken the first one.
    next_id: u32,
}

/// A context switch decided by the scheduler.
pub struct Switch {
    pub from: ThreadId,
    pub to: ThreadId,
    /// Where the outgoing thread's context is saved.
    pub save: *mut ExecutionContext,
    /// Context of the incoming thread.
    pub restore: *const ExecutionContext,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Scheduler {
    /// Creates a scheduler whose running thread is `main`.
    pub fn new(main: Box<ThreadControlBlock>) -> Self {
        Self {
            next_id: u32::from(main.id()) + 1,
            current: Some(main),
            ready: OrderedQueue::new(),
            completed: OrderedQueue::new(),
        }
    }

    /// Returns the running thread.
    pub fn current_mut(&mut self) -> &mut ThreadControlBlock {
        match self.current.as_mut() {
            Some(tcb) => tcb,
            None => fail::fatal("scheduler has no running thread"),
        }
    }

    pub fn current_id(&self) -> ThreadId {
        match self.current.as_ref() {
            Some(tcb) => tcb.id(),
            None => fail::fatal("scheduler has no running thread"),
        }
    }

    /// Assigns the next id to `tcb`. Fails without consuming an id once `max_threads` ids have been issued.
    pub fn issue_id(&mut self, tcb: &mut ThreadControlBlock, max_threads: u32) -> Result<ThreadId, Fail> {
        if self.next_id >= max_threads {
            let cause: String = format!("thread id space exhausted (max_threads={:?})", max_threads);
            warn!("issue_id(): {}", cause);
            return Err(Fail::new(libc::EAGAIN, &cause));
        }
        let id: ThreadId = ThreadId::from(self.next_id);
        self.next_id += 1;
        tcb.set_id(id);
        Ok(id)
    }

    /// Adds a runnable thread.
    pub fn make_ready(&mut self, mut tcb: Box<ThreadControlBlock>) {
        tcb.set_status(ThreadStatus::Ready);
        self.ready.push(tcb);
    }

    /// Takes a completed thread out of the scheduler.
    pub fn reap(&mut self, id: ThreadId) -> Option<Box<ThreadControlBlock>> {
        self.completed.remove_by_id(id)
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn num_ready(&self) -> usize {
        self.ready.len()
    }

    pub fn num_completed(&self) -> usize {
        self.completed.len()
    }

    pub fn is_completed(&self, id: ThreadId) -> bool {
        self.completed.contains(id)
    }

    /// Makes one scheduling decision.
    ///
    /// Nothing happens if no other thread is ready. Otherwise the running thread ages by one round (unless it is
    /// exiting) and is filed according to its status: back on the ready queue, on the completed queue, or on
    /// `waitlist` if it is blocked. The youngest ready thread then becomes the running one, possibly the same one.
    pub fn rotate(&mut self, waitlist: Option<&WaitQueue>) -> Option<Switch> {
        if self.ready.is_empty() {
            let current: &mut ThreadControlBlock = self.current_mut();
            if current.status() == ThreadStatus::Blocked {
                // Nobody is left to wake it up. Keep it running and let it retry.
                warn!("rotate(): thread {} blocked with no other thread ready", current.id());
                current.set_status(ThreadStatus::Ready);
            }
            return None;
        }

        let mut outgoing: Box<ThreadControlBlock> = match self.current.take() {
            Some(tcb) => tcb,
            None => fail::fatal("scheduler has no running thread"),
        };
        if outgoing.status() != ThreadStatus::Completed {
            outgoing.grow_older();
        }
        let from: ThreadId = outgoing.id();
        let save: *mut ExecutionContext = outgoing.context_mut();
        match outgoing.status() {
            ThreadStatus::Ready => self.ready.push(outgoing),
            ThreadStatus::Completed => self.completed.push(outgoing),
            ThreadStatus::Blocked => match waitlist {
                Some(waitlist) => waitlist.push(outgoing),
                None => fail::fatal("blocked thread has nowhere to wait"),
            },
        }

        let incoming: Box<ThreadControlBlock> = match self.ready.pop_front() {
            Some(tcb) => tcb,
            None => fail::fatal("ready queue drained during rotation"),
        };
        let to: ThreadId = incoming.id();
        let restore: *const ExecutionContext = incoming.context();
        trace!("rotate(): from={:?} to={:?} age={:?}", from, to, incoming.age());
        self.current = Some(incoming);

        Some(Switch {
            from,
            to,
            save,
            restore,
        })
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
