// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::{
        tcb::ThreadId,
        wait_queue::WaitQueue,
    },
    Runtime,
};
use ::std::sync::atomic::{
    AtomicBool,
    AtomicU32,
    AtomicU8,
    Ordering,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Owner of a mutex that nobody holds.
const NO_OWNER: u32 = u32::MAX;

//======================================================================================================================
// Structures
//======================================================================================================================

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum MutexStatus {
    Uninitialized = 0,
    Initialized = 1,
    Destroyed = 2,
}

/// Mutex for ensuring mutual exclusion between threads of a [Runtime].
///
/// Threads that find the mutex locked are parked on a per-mutex queue until the owner unlocks it. A thread that locks
/// a mutex it already owns returns right away; there is no recursion count, so a single unlock releases it.
pub struct Mutex {
    locked: AtomicBool,
    owner: AtomicU32,
    status: AtomicU8,
    blocked: WaitQueue,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Mutex {
    /// Creates an uninitialized mutex. It must go through [Mutex::init] before use.
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            owner: AtomicU32::new(NO_OWNER),
            status: AtomicU8::new(MutexStatus::Uninitialized as u8),
            blocked: WaitQueue::default(),
        }
    }

    /// Initializes this mutex. Re-initializing is allowed, unless threads are waiting on it.
    pub fn init(&self) -> Result<(), Fail> {
        if !self.blocked.is_empty() {
            let cause: String = format!("mutex has waiting threads (waiters={:?})", self.blocked.len());
            return Err(Fail::new(libc::EBUSY, &cause));
        }
        self.owner.store(NO_OWNER, Ordering::Release);
        self.locked.store(false, Ordering::Release);
        self.set_status(MutexStatus::Initialized);
        Ok(())
    }

    /// Acquires this mutex, parking the running thread while someone else holds it.
    pub fn lock(&self, runtime: &Runtime) -> Result<(), Fail> {
        self.ensure_initialized(runtime, "lock")?;
        let me: ThreadId = runtime.current();
        if self.owner() == Some(me) {
            return Ok(());
        }

        while self.locked.swap(true, Ordering::Acquire) {
            runtime.gate().block();
            // The owner may have unlocked before the gate closed, finding nobody to wake.
            if !self.locked.swap(true, Ordering::Acquire) {
                runtime.gate().unblock();
                break;
            }
            trace!("lock(): thread {} blocks", me);
            runtime.block_on(&self.blocked);
            runtime.gate().unblock();
            // The mutex may have been destroyed while we were waiting.
            self.ensure_initialized(runtime, "lock")?;
        }

        self.owner.store(u32::from(me), Ordering::Release);
        Ok(())
    }

    /// Releases this mutex and wakes up one waiting thread, if any. Fails if the running thread is not the owner.
    pub fn unlock(&self, runtime: &Runtime) -> Result<(), Fail> {
        let me: ThreadId = runtime.current();
        if self.owner() != Some(me) {
            runtime.gate().block();
            let cause: String = format!("mutex is not owned by thread {}", me);
            error!("unlock(): {}", cause);
            let e: Fail = Fail::new(libc::EBUSY, &cause);
            runtime.gate().unblock();
            return Err(e);
        }

        self.owner.store(NO_OWNER, Ordering::Release);
        self.locked.store(false, Ordering::Release);

        // A waiter that shows up after this check retries its own claim, so it is fine to skip the gate here.
        if !self.blocked.is_empty() {
            runtime.gate().block();
            if let Some(waiter) = self.blocked.pop() {
                runtime.wake(waiter);
            }
            runtime.gate().unblock();
        }
        Ok(())
    }

    /// Destroys this mutex. Waits for any other owner to unlock it first, then wakes every waiter so it can fail.
    pub fn destroy(&self, runtime: &Runtime) -> Result<(), Fail> {
        self.ensure_initialized(runtime, "destroy")?;
        // Lockers arriving from now on fail.
        self.set_status(MutexStatus::Destroyed);

        if self.owner() != Some(runtime.current()) {
            while self.locked.swap(true, Ordering::Acquire) {
                runtime.yield_now();
            }
        }
        self.owner.store(NO_OWNER, Ordering::Release);
        self.locked.store(false, Ordering::Release);

        runtime.gate().block();
        while let Some(waiter) = self.blocked.pop() {
            runtime.wake(waiter);
        }
        debug!("destroy(): mutex destroyed by thread {}", runtime.current());
        runtime.gate().unblock();
        Ok(())
    }

    pub fn status(&self) -> MutexStatus {
        match self.status.load(Ordering::Acquire) {
            1 => MutexStatus::Initialized,
            2 => MutexStatus::Destroyed,
            _ => MutexStatus::Uninitialized,
        }
    }

    /// Returns the thread holding this mutex.
    pub fn owner(&self) -> Option<ThreadId> {
        match self.owner.load(Ordering::Acquire) {
            NO_OWNER => None,
            id => Some(ThreadId::from(id)),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Returns how many threads are parked on this mutex.
    pub fn num_waiters(&self) -> usize {
        self.blocked.len()
    }

    fn set_status(&self, status: MutexStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn ensure_initialized(&self, runtime: &Runtime, op: &str) -> Result<(), Fail> {
        match self.status() {
            MutexStatus::Initialized => Ok(()),
            status => {
                runtime.gate().block();
                let cause: String = format!("mutex is not initialized (status={:?})", status);
                debug!("{}(): {}", op, cause);
                let e: Fail = Fail::new(libc::EBUSY, &cause);
                runtime.gate().unblock();
                Err(e)
            },
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        if !self.blocked.is_empty() {
            warn!("drop(): mutex dropped with {} waiting threads", self.blocked.len());
        }
    }
}

//======================================================================================================================
// Tests
//======================================================================================================================
