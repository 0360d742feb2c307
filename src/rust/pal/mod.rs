// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// PAL: Platform Abstraction Layer
//======================================================================================================================

// This is the platform abstraction layer that hides how execution contexts are saved and restored and how the periodic
// preemption timer is delivered. The rest of the runtime only sees `ExecutionContext` and a `PreemptionGate`.

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod linux;
        pub use self::linux::{
            context::ExecutionContext,
            preemption::SignalPreemption,
        };
    } else {
        compile_error!("uthread only supports Linux targets");
    }
}
