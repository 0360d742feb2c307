// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    config::Config,
    fail::{
        self,
        Fail,
    },
    scheduler::tcb::{
        ExitValue,
        ThreadId,
    },
    Runtime,
    SharedRuntime,
};
use ::std::{
    any::Any,
    cell::OnceCell,
    env,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Environment variable naming the configuration file of the default runtime.
const CONFIG_PATH_VAR: &str = "UTHREAD_CONFIG_PATH";

//======================================================================================================================
// Thread Local Variables
//======================================================================================================================

thread_local! {
    static DEFAULT_RUNTIME: OnceCell<&'static Runtime> = const { OnceCell::new() };
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Returns the default runtime of the calling OS thread, creating it on first use. It lives until the process exits.
pub fn runtime() -> &'static Runtime {
    DEFAULT_RUNTIME.with(|cell| *cell.get_or_init(make_default_runtime))
}

/// Creates a thread on the default runtime. See [Runtime::create].
pub fn create<F, R>(entry: F) -> Result<ThreadId, Fail>
where
    F: FnOnce(&Runtime) -> R + 'static,
    R: Any,
{
    runtime().create(entry)
}

/// See [Runtime::yield_now].
pub fn yield_now() {
    runtime().yield_now()
}

/// See [Runtime::exit].
pub fn exit(value: ExitValue) -> ! {
    runtime().exit(value)
}

/// See [Runtime::join].
pub fn join(id: ThreadId) -> ExitValue {
    runtime().join(id)
}

/// See [Runtime::try_join].
pub fn try_join(id: ThreadId) -> Result<ExitValue, Fail> {
    runtime().try_join(id)
}

/// Returns the id of the thread running on the default runtime.
pub fn current() -> ThreadId {
    runtime().current()
}

fn make_default_runtime() -> &'static Runtime {
    let config: Config = match env::var(CONFIG_PATH_VAR) {
        Ok(path) => match Config::new(&path) {
            Ok(config) => config,
            Err(e) => fail::fatal(&format!("cannot load {} ({})", path, e)),
        },
        Err(_) => Config::default(),
    };
    let runtime: SharedRuntime = match Runtime::new(config) {
        Ok(runtime) => runtime,
        Err(e) => fail::fatal(&format!("cannot create default runtime ({})", e)),
    };
    let runtime: &'static SharedRuntime = Box::leak(Box::new(runtime));
    runtime
}
