// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::ordered_queue::Aged,
    pal::ExecutionContext,
    runtime::{
        fail::Fail,
        Runtime,
    },
};
use ::std::{
    any::Any,
    fmt,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Value a thread hands to `exit` and its joiner receives.
pub type ExitValue = Box<dyn Any>;

/// Code a thread runs the first time it is scheduled.
pub type ThreadEntry = Box<dyn FnOnce(&Runtime) -> ExitValue>;

/// Thread identifier. Issued sequentially and never reused while a runtime is alive.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ThreadId(u32);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThreadStatus {
    Ready,
    Blocked,
    Completed,
}

/// Thread Control Block
pub struct ThreadControlBlock {
    id: ThreadId,
    status: ThreadStatus,
    /// Scheduling rounds survived while not exiting. Lower runs sooner.
    age: u64,
    context: ExecutionContext,
    /// None for thread 0, which runs on the stack of the OS thread that created the runtime.
    stack: Option<Box<[u8]>>,
    entry: Option<ThreadEntry>,
    return_value: Option<ExitValue>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ThreadId {
    /// Id of the context that initialized the runtime.
    pub const MAIN: ThreadId = ThreadId(0);
}

impl ThreadControlBlock {
    /// Creates the control block that stands for the context initializing the runtime. Its execution context is
    /// filled in the first time it is switched away from.
    pub fn main() -> Box<Self> {
        Box::new(Self {
            id: ThreadId::MAIN,
            status: ThreadStatus::Ready,
            age: 0,
            context: ExecutionContext::empty(),
            stack: None,
            entry: None,
            return_value: None,
        })
    }

    /// Creates a control block with a fresh stack whose context starts at `trampoline`. The id is provisional until
    /// [ThreadControlBlock::set_id] is called.
    pub fn new(entry: ThreadEntry, stack_size: usize, trampoline: extern "C" fn()) -> Result<Box<Self>, Fail> {
        let mut tcb: Box<Self> = Box::new(Self {
            id: ThreadId::MAIN,
            status: ThreadStatus::Ready,
            age: 0,
            context: ExecutionContext::empty(),
            stack: Some(vec![0; stack_size].into_boxed_slice()),
            entry: Some(entry),
            return_value: None,
        });
        // The context is primed in place so that it never moves afterwards.
        let Self { context, stack, .. } = &mut *tcb;
        if let Some(stack) = stack.as_mut() {
            context.prepare(stack, trampoline)?;
        }
        Ok(tcb)
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn set_id(&mut self, id: ThreadId) {
        self.id = id;
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ThreadStatus) {
        self.status = status;
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    /// Accounts for one more scheduling round.
    pub fn grow_older(&mut self) {
        self.age += 1;
    }

    #[cfg(test)]
    pub fn set_age(&mut self, age: u64) {
        self.age = age;
    }

    pub fn stack_size(&self) -> usize {
        self.stack.as_ref().map_or(0, |stack| stack.len())
    }

    /// Takes the entry out. Succeeds once.
    pub fn take_entry(&mut self) -> Option<ThreadEntry> {
        self.entry.take()
    }

    /// Marks this thread completed with `value`. The value of a completed thread never changes.
    pub fn complete(&mut self, value: ExitValue) {
        debug_assert!(self.return_value.is_none());
        self.status = ThreadStatus::Completed;
        self.return_value = Some(value);
    }

    /// Takes the return value out of a completed thread. Succeeds once.
    pub fn take_return_value(&mut self) -> Option<ExitValue> {
        self.return_value.take()
    }

    pub fn context_mut(&mut self) -> *mut ExecutionContext {
        &mut self.context
    }

    pub fn context(&self) -> *const ExecutionContext {
        &self.context
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Aged for ThreadControlBlock {
    type Id = ThreadId;

    fn age(&self) -> u64 {
        self.age
    }

    fn id(&self) -> ThreadId {
        self.id
    }
}

impl From<u32> for ThreadId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<ThreadId> for u32 {
    fn from(value: ThreadId) -> Self {
        value.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ThreadControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadControlBlock")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("age", &self.age)
            .field("stack_size", &self.stack_size())
            .finish()
    }
}
