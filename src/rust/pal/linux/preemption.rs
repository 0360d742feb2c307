// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::{
        self,
        Fail,
    },
    preemption::PreemptionGate,
};
use ::std::{
    mem,
    ptr,
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Preemption driven by `SIGPROF`. The interval timer counts CPU time consumed by the process, and the gate masks the
/// signal on the calling OS thread.
pub struct SignalPreemption {
    /// Signal set holding only `SIGPROF`.
    sigprof: libc::sigset_t,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SignalPreemption {
    pub fn new() -> Result<Self, Fail> {
        let mut sigprof: libc::sigset_t = unsafe { mem::zeroed() };
        unsafe {
            if libc::sigemptyset(&mut sigprof) != 0 || libc::sigaddset(&mut sigprof, libc::SIGPROF) != 0 {
                let cause: &str = "failed to build signal set";
                error!("new(): {}", cause);
                return Err(Fail::last_os_error(cause));
            }
        }
        Ok(Self { sigprof })
    }

    fn set_mask(&self, how: libc::c_int) {
        let ret: libc::c_int = unsafe { libc::pthread_sigmask(how, &self.sigprof, ptr::null_mut()) };
        if ret != 0 {
            fail::fatal(&format!("failed to change signal mask (errno={:?})", ret));
        }
    }

    fn set_timer(&self, interval: Duration) {
        let period: libc::timeval = libc::timeval {
            tv_sec: interval.as_secs() as libc::time_t,
            tv_usec: interval.subsec_micros() as libc::suseconds_t,
        };
        let timer: libc::itimerval = libc::itimerval {
            it_interval: period,
            it_value: period,
        };
        if unsafe { libc::setitimer(libc::ITIMER_PROF, &timer, ptr::null_mut()) } != 0 {
            fail::fatal(&Fail::last_os_error("failed to arm interval timer").to_string());
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl PreemptionGate for SignalPreemption {
    fn install(&self, entry: extern "C" fn(libc::c_int)) -> Result<(), Fail> {
        let mut action: libc::sigaction = unsafe { mem::zeroed() };
        action.sa_sigaction = entry as libc::sighandler_t;
        // Nothing else may interrupt the scheduler while it runs on behalf of the timer.
        action.sa_flags = libc::SA_RESTART;
        unsafe {
            if libc::sigfillset(&mut action.sa_mask) != 0 {
                let cause: &str = "failed to build handler mask";
                error!("install(): {}", cause);
                return Err(Fail::last_os_error(cause));
            }
            if libc::sigaction(libc::SIGPROF, &action, ptr::null_mut()) != 0 {
                let cause: &str = "failed to install timer handler";
                error!("install(): {}", cause);
                return Err(Fail::last_os_error(cause));
            }
        }
        trace!("install(): SIGPROF handler installed");
        Ok(())
    }

    fn block(&self) {
        self.set_mask(libc::SIG_BLOCK);
    }

    fn unblock(&self) {
        self.set_mask(libc::SIG_UNBLOCK);
    }

    fn arm(&self, interval: Duration) {
        self.set_timer(interval);
    }

    fn disarm(&self) {
        self.set_timer(Duration::ZERO);
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
