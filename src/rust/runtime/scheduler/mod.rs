// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Exports
//==============================================================================

pub mod mutex;
pub mod scheduler;
pub mod tcb;
pub mod wait_queue;
