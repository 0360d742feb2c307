// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::time::Duration;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Controls whether the periodic timer may enter the scheduler.
///
/// Once [PreemptionGate::block] returns, no timer-driven scheduler entry happens until the matching
/// [PreemptionGate::unblock]. Calls are paired within a single critical section and never nested across calls. Any
/// failure of the underlying primitive is fatal.
pub trait PreemptionGate {
    /// Hooks the timer up to `entry`. Called once, when the runtime initializes.
    fn install(&self, entry: extern "C" fn(libc::c_int)) -> Result<(), Fail>;

    /// Holds back timer-driven scheduler entry.
    fn block(&self);

    /// Lets timer-driven scheduler entry through again.
    fn unblock(&self);

    /// Restarts the periodic timer for a fresh full `interval`.
    fn arm(&self, interval: Duration);

    /// Stops the periodic timer.
    fn disarm(&self);
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// A gate for runtimes that are never preempted. Threads only switch at voluntary suspension points.
#[derive(Default)]
pub struct CooperativeGate;

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl PreemptionGate for CooperativeGate {
    fn install(&self, _entry: extern "C" fn(libc::c_int)) -> Result<(), Fail> {
        Ok(())
    }

    fn block(&self) {}

    fn unblock(&self) {}

    fn arm(&self, _interval: Duration) {}

    fn disarm(&self) {}
}
