// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use ::std::time::Duration;

/// Default preemption quantum.
pub const DEFAULT_TIMER_INTERVAL: Duration = Duration::from_micros(15_000);

/// Default size of the stack backing each thread.
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Smallest stack we agree to run a thread on.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Maximum number of thread ids issued over the lifetime of a runtime, including the one taken by thread 0.
pub const DEFAULT_MAX_THREADS: u32 = 50_000;
