// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    mem,
    ptr,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Resumable execution state of a thread: registers, stack pointer and signal mask.
///
/// The underlying `ucontext_t` points into itself once captured, so an [ExecutionContext] must not move after
/// [ExecutionContext::capture] or [ExecutionContext::prepare] have been called. Keep it behind a `Box`.
pub struct ExecutionContext {
    ucontext: libc::ucontext_t,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ExecutionContext {
    /// Creates a blank context. A blank context may only be used as the save slot of a switch.
    pub fn empty() -> Self {
        Self {
            // Safety: ucontext_t is plain old data and all-zeroes is a valid (if meaningless) value.
            ucontext: unsafe { mem::zeroed() },
        }
    }

    /// Captures the calling context.
    pub fn capture(&mut self) -> Result<(), Fail> {
        if unsafe { libc::getcontext(&mut self.ucontext) } != 0 {
            let cause: &str = "failed to capture execution context";
            error!("capture(): {}", cause);
            return Err(Fail::last_os_error(cause));
        }
        Ok(())
    }

    /// Primes this context to run `entry` on `stack` the first time it is switched to. `entry` must never return.
    pub fn prepare(&mut self, stack: &mut [u8], entry: extern "C" fn()) -> Result<(), Fail> {
        self.capture()?;
        self.ucontext.uc_stack.ss_sp = stack.as_mut_ptr() as *mut libc::c_void;
        self.ucontext.uc_stack.ss_size = stack.len();
        self.ucontext.uc_stack.ss_flags = 0;
        self.ucontext.uc_link = ptr::null_mut();
        unsafe { libc::makecontext(&mut self.ucontext, entry, 0) };
        Ok(())
    }

    /// Saves the calling context into `save` and resumes `restore`. Returns once something switches back to `save`.
    ///
    /// # Safety
    ///
    /// Both pointers must reference live contexts that stay in place until the switch completes; `restore` must have
    /// been captured, prepared or saved by an earlier switch.
    pub unsafe fn switch(save: *mut ExecutionContext, restore: *const ExecutionContext) -> Result<(), Fail> {
        if libc::swapcontext(&mut (*save).ucontext, &(*restore).ucontext) != 0 {
            let cause: &str = "failed to switch execution context";
            error!("switch(): {}", cause);
            return Err(Fail::last_os_error(cause));
        }
        Ok(())
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
