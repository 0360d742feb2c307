// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};
use ::std::{
    cell::{
        Cell,
        RefCell,
    },
    rc::Rc,
    time::Duration,
};
use ::uthread::{
    ensure_eq,
    ensure_neq,
    Config,
    Fail,
    Mutex,
    MutexStatus,
    PreemptionGate,
    Runtime,
    SharedRuntime,
    ThreadId,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Gate whose timer only fires on demand. Once `pending` is raised, the next `block` enters the timer handler first,
/// as if the timer had expired right before preemption got masked.
struct TickGate {
    handler: Cell<Option<extern "C" fn(libc::c_int)>>,
    pending: Rc<Cell<bool>>,
}

impl PreemptionGate for TickGate {
    fn install(&self, entry: extern "C" fn(libc::c_int)) -> Result<(), Fail> {
        self.handler.set(Some(entry));
        Ok(())
    }

    fn block(&self) {
        if self.pending.replace(false) {
            if let Some(handler) = self.handler.get() {
                handler(libc::SIGPROF);
            }
        }
    }

    fn unblock(&self) {}

    fn arm(&self, _interval: Duration) {}

    fn disarm(&self) {}
}

//======================================================================================================================
// Helper Functions
//======================================================================================================================

/// Builds a runtime that only switches threads at suspension points.
fn cooperative_runtime(max_threads: u32) -> Result<SharedRuntime> {
    let config: Config = Config::default()
        .with_preemption(false)
        .with_stack_size(256 * 1024)
        .with_max_threads(max_threads);
    Ok(Runtime::new(config)?)
}

/// Builds a runtime driven by a [TickGate]. Raising the returned flag fires the timer on the next gate block.
fn ticking_runtime() -> Result<(SharedRuntime, Rc<Cell<bool>>)> {
    let pending: Rc<Cell<bool>> = Rc::new(Cell::new(false));
    let gate: TickGate = TickGate {
        handler: Cell::new(None),
        pending: pending.clone(),
    };
    let config: Config = Config::default()
        .with_preemption(false)
        .with_stack_size(256 * 1024)
        .with_max_threads(16);
    Ok((Runtime::with_gate(config, Box::new(gate))?, pending))
}

//======================================================================================================================
// Tests
//======================================================================================================================

/// Threads that yield a few times and then exit hand their id back to the joiner.
#[test]
fn yield_then_join_in_creation_order() -> Result<()> {
    let runtime: SharedRuntime = cooperative_runtime(16)?;

    let mut threads: Vec<ThreadId> = Vec::new();
    for _ in 0..3 {
        threads.push(runtime.create(|runtime: &Runtime| {
            for _ in 0..5 {
                runtime.yield_now();
            }
            let me: u32 = runtime.current().into();
            runtime.exit(Box::new(me))
        })?);
    }

    for id in threads {
        let value: Box<u32> = match runtime.join(id).downcast::<u32>() {
            Ok(value) => value,
            Err(_) => anyhow::bail!("thread {} exited with an unexpected value", id),
        };
        ensure_eq!(*value, u32::from(id));
    }
    ensure_eq!(runtime.num_ready(), 0);
    ensure_eq!(runtime.num_completed(), 0);

    Ok(())
}

/// Ids are handed out in increasing order, starting right after thread 0.
#[test]
fn ids_strictly_increase() -> Result<()> {
    let runtime: SharedRuntime = cooperative_runtime(16)?;

    let mut previous: ThreadId = ThreadId::MAIN;
    for _ in 0..10 {
        let id: ThreadId = runtime.create(|_: &Runtime| ())?;
        ensure_eq!(id > previous, true);
        previous = id;
    }
    ensure_eq!(u32::from(previous), 10);
    ensure_eq!(runtime.current(), ThreadId::MAIN);

    Ok(())
}

/// Thread 0 counts against the limit, and running out of ids does not burn one.
#[test]
fn create_until_exhausted() -> Result<()> {
    const MAX_THREADS: u32 = 32;
    let runtime: SharedRuntime = cooperative_runtime(MAX_THREADS)?;

    let mut created: u32 = 0;
    let errno: i32 = loop {
        match runtime.create(|_: &Runtime| ()) {
            Ok(_) => created += 1,
            Err(e) => break e.errno,
        }
    };
    ensure_eq!(errno, libc::EAGAIN);
    ensure_eq!(created, MAX_THREADS - 1);

    // Still exhausted after a failure.
    ensure_eq!(runtime.create(|_: &Runtime| ()).map_err(|e| e.errno).err(), Some(libc::EAGAIN));
    ensure_eq!(runtime.num_ready(), (MAX_THREADS - 1) as usize);

    Ok(())
}

/// Returning from the entry and calling exit hand the same kind of value to the joiner.
#[test]
fn join_returns_exit_value() -> Result<()> {
    let runtime: SharedRuntime = cooperative_runtime(16)?;

    let returned: ThreadId = runtime.create(|_: &Runtime| String::from("returned"))?;
    let exited: ThreadId = runtime.create(|runtime: &Runtime| runtime.exit(Box::new(String::from("exited"))))?;

    let value: Box<String> = match runtime.join(exited).downcast::<String>() {
        Ok(value) => value,
        Err(_) => anyhow::bail!("unexpected exit value"),
    };
    ensure_eq!(value.as_str(), "exited");

    let value: Box<String> = match runtime.join(returned).downcast::<String>() {
        Ok(value) => value,
        Err(_) => anyhow::bail!("unexpected exit value"),
    };
    ensure_eq!(value.as_str(), "returned");

    Ok(())
}

/// A thread that has not run yet cannot be joined without waiting.
#[test]
fn try_join_before_completion() -> Result<()> {
    let runtime: SharedRuntime = cooperative_runtime(16)?;

    let id: ThreadId = runtime.create(|_: &Runtime| 42u64)?;
    ensure_eq!(runtime.try_join(id).map_err(|e| e.errno).err(), Some(libc::EAGAIN));

    runtime.yield_now();
    ensure_eq!(runtime.num_completed(), 1);
    let value: Box<u64> = match runtime.try_join(id).map(|value| value.downcast::<u64>()) {
        Ok(Ok(value)) => value,
        _ => anyhow::bail!("thread should have completed"),
    };
    ensure_eq!(*value, 42);

    // Reclaimed: a second join attempt finds nothing.
    ensure_eq!(runtime.try_join(id).is_err(), true);
    ensure_eq!(runtime.num_completed(), 0);

    Ok(())
}

/// New threads run in creation order, ahead of the thread that has been running all along.
#[test]
fn youngest_threads_run_first() -> Result<()> {
    let runtime: SharedRuntime = cooperative_runtime(16)?;
    let trace: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));

    let mut threads: Vec<ThreadId> = Vec::new();
    for _ in 0..3 {
        let trace: Rc<RefCell<Vec<u32>>> = trace.clone();
        threads.push(runtime.create(move |runtime: &Runtime| {
            trace.borrow_mut().push(runtime.current().into());
        })?);
    }
    runtime.yield_now();
    trace.borrow_mut().push(runtime.current().into());

    ensure_eq!(*trace.borrow(), vec![1, 2, 3, 0]);
    for id in threads {
        runtime.join(id);
    }

    Ok(())
}

/// A thread that keeps yielding does not starve threads that arrive later.
#[test]
fn yielding_thread_does_not_starve_others() -> Result<()> {
    let runtime: SharedRuntime = cooperative_runtime(16)?;
    let done: Rc<Cell<bool>> = Rc::new(Cell::new(false));

    let waiter: ThreadId = {
        let done: Rc<Cell<bool>> = done.clone();
        runtime.create(move |runtime: &Runtime| -> usize {
            let mut rounds: usize = 0;
            while !done.get() {
                rounds += 1;
                runtime.yield_now();
            }
            rounds
        })?
    };
    runtime.yield_now();

    let finisher: ThreadId = {
        let done: Rc<Cell<bool>> = done.clone();
        runtime.create(move |_: &Runtime| done.set(true))?
    };
    runtime.join(finisher);

    let rounds: Box<usize> = match runtime.join(waiter).downcast::<usize>() {
        Ok(rounds) => rounds,
        Err(_) => anyhow::bail!("unexpected exit value"),
    };
    ensure_neq!(*rounds, 0);

    Ok(())
}

/// Many threads bump a counter under a mutex, yielding at random points while holding it.
#[test]
fn mutex_protects_counter() -> Result<()> {
    const NTHREADS: usize = 8;
    const NINCREMENTS: u64 = 500;
    let runtime: SharedRuntime = cooperative_runtime(64)?;

    let mutex: Rc<Mutex> = Rc::new(Mutex::new());
    mutex.init()?;
    let counter: Rc<Cell<u64>> = Rc::new(Cell::new(0));

    let mut threads: Vec<ThreadId> = Vec::new();
    for seed in 0..NTHREADS {
        let mutex: Rc<Mutex> = mutex.clone();
        let counter: Rc<Cell<u64>> = counter.clone();
        threads.push(runtime.create(move |runtime: &Runtime| -> bool {
            let mut rng: SmallRng = SmallRng::seed_from_u64(seed as u64);
            for _ in 0..NINCREMENTS {
                if mutex.lock(runtime).is_err() {
                    return false;
                }
                let value: u64 = counter.get();
                if rng.gen_bool(0.25) {
                    runtime.yield_now();
                }
                counter.set(value + 1);
                if mutex.unlock(runtime).is_err() {
                    return false;
                }
                if rng.gen_bool(0.25) {
                    runtime.yield_now();
                }
            }
            true
        })?);
    }

    for id in threads {
        match runtime.join(id).downcast::<bool>() {
            Ok(ok) => ensure_eq!(*ok, true),
            Err(_) => anyhow::bail!("unexpected exit value"),
        }
    }
    ensure_eq!(counter.get(), NTHREADS as u64 * NINCREMENTS);
    ensure_eq!(mutex.is_locked(), false);
    ensure_eq!(mutex.num_waiters(), 0);

    mutex.destroy(&runtime)?;
    ensure_eq!(mutex.status(), MutexStatus::Destroyed);

    Ok(())
}

/// Unlocking a mutex held by someone else fails and leaves it untouched.
#[test]
fn mutex_unlock_by_non_owner() -> Result<()> {
    let runtime: SharedRuntime = cooperative_runtime(16)?;
    let mutex: Rc<Mutex> = Rc::new(Mutex::new());
    mutex.init()?;

    let owner: ThreadId = {
        let mutex: Rc<Mutex> = mutex.clone();
        runtime.create(move |runtime: &Runtime| {
            // Leaves the mutex locked on purpose.
            let _ = mutex.lock(runtime);
        })?
    };
    runtime.join(owner);
    ensure_eq!(mutex.owner(), Some(owner));

    ensure_eq!(mutex.unlock(&runtime).map_err(|e| e.errno).err(), Some(libc::EBUSY));
    ensure_eq!(mutex.owner(), Some(owner));
    ensure_eq!(mutex.is_locked(), true);

    Ok(())
}

/// The owner locking again returns right away, and a single unlock releases the mutex.
#[test]
fn mutex_relock_by_owner() -> Result<()> {
    let runtime: SharedRuntime = cooperative_runtime(16)?;
    let mutex: Rc<Mutex> = Rc::new(Mutex::new());
    mutex.init()?;

    mutex.lock(&runtime)?;
    mutex.lock(&runtime)?;
    mutex.unlock(&runtime)?;

    // Another thread can now take it without waiting.
    let other: ThreadId = {
        let mutex: Rc<Mutex> = mutex.clone();
        runtime.create(move |runtime: &Runtime| mutex.lock(runtime).is_ok() && mutex.unlock(runtime).is_ok())?
    };
    match runtime.join(other).downcast::<bool>() {
        Ok(ok) => ensure_eq!(*ok, true),
        Err(_) => anyhow::bail!("unexpected exit value"),
    }

    Ok(())
}

/// Destroying a mutex wakes everybody waiting on it, and they all fail.
#[test]
fn mutex_destroy_fails_waiters() -> Result<()> {
    const NWAITERS: usize = 4;
    let runtime: SharedRuntime = cooperative_runtime(16)?;
    let mutex: Rc<Mutex> = Rc::new(Mutex::new());
    mutex.init()?;
    mutex.lock(&runtime)?;

    let mut waiters: Vec<ThreadId> = Vec::new();
    for _ in 0..NWAITERS {
        let mutex: Rc<Mutex> = mutex.clone();
        waiters.push(runtime.create(move |runtime: &Runtime| mutex.lock(runtime).map_err(|e| e.errno))?);
    }
    runtime.yield_now();
    ensure_eq!(mutex.num_waiters(), NWAITERS);

    mutex.destroy(&runtime)?;
    ensure_eq!(mutex.num_waiters(), 0);

    for id in waiters {
        match runtime.join(id).downcast::<Result<(), i32>>() {
            Ok(result) => ensure_eq!(*result, Err(libc::EBUSY)),
            Err(_) => anyhow::bail!("unexpected exit value"),
        }
    }
    ensure_eq!(mutex.destroy(&runtime).map_err(|e| e.errno).err(), Some(libc::EBUSY));

    Ok(())
}

/// Only one runtime may drive an OS thread at a time.
#[test]
fn second_runtime_is_busy() -> Result<()> {
    let first: SharedRuntime = cooperative_runtime(16)?;
    let second: SharedRuntime = cooperative_runtime(16)?;

    let id: ThreadId = first.create(|_: &Runtime| ())?;
    ensure_eq!(second.create(|_: &Runtime| ()).map_err(|e| e.errno).err(), Some(libc::EBUSY));
    first.join(id);

    // Once the first one is gone, the second one may take over.
    drop(first);
    let id: ThreadId = second.create(|_: &Runtime| 7u8)?;
    match second.join(id).downcast::<u8>() {
        Ok(value) => ensure_eq!(*value, 7),
        Err(_) => anyhow::bail!("unexpected exit value"),
    }

    Ok(())
}

/// A locker preempted between its failed claim and parking must not miss an unlock that happens in between.
#[test]
fn mutex_unlock_while_locker_is_parking() -> Result<()> {
    let (runtime, tick): (SharedRuntime, Rc<Cell<bool>>) = ticking_runtime()?;
    let mutex: Rc<Mutex> = Rc::new(Mutex::new());
    mutex.init()?;
    mutex.lock(&runtime)?;

    let locker: ThreadId = {
        let mutex: Rc<Mutex> = mutex.clone();
        let tick: Rc<Cell<bool>> = tick.clone();
        runtime.create(move |runtime: &Runtime| {
            tick.set(true);
            mutex.lock(runtime).is_ok() && mutex.unlock(runtime).is_ok()
        })?
    };

    // The locker finds the mutex taken and gets preempted before it parks.
    runtime.yield_now();
    ensure_eq!(runtime.num_ready(), 1);
    ensure_eq!(mutex.num_waiters(), 0);

    // Nobody is parked yet, so this unlock wakes nobody.
    mutex.unlock(&runtime)?;
    runtime.yield_now();

    ensure_eq!(mutex.num_waiters(), 0);
    ensure_eq!(mutex.is_locked(), false);
    match runtime.try_join(locker)?.downcast::<bool>() {
        Ok(ok) => ensure_eq!(*ok, true),
        Err(_) => anyhow::bail!("unexpected exit value"),
    }

    Ok(())
}

/// The timer may fire as a creation begins, running other threads before the new one is set up.
#[test]
fn create_when_timer_fires() -> Result<()> {
    let (runtime, tick): (SharedRuntime, Rc<Cell<bool>>) = ticking_runtime()?;
    let done: Rc<Cell<bool>> = Rc::new(Cell::new(false));

    let first: ThreadId = {
        let done: Rc<Cell<bool>> = done.clone();
        runtime.create(move |_: &Runtime| done.set(true))?
    };

    tick.set(true);
    let second: ThreadId = runtime.create(|_: &Runtime| 2u32)?;

    // The first thread ran to completion while the second one was being created.
    ensure_eq!(done.get(), true);
    ensure_eq!(runtime.num_completed(), 1);
    ensure_eq!(u32::from(second), u32::from(first) + 1);

    runtime.join(first);
    match runtime.join(second).downcast::<u32>() {
        Ok(value) => ensure_eq!(*value, 2),
        Err(_) => anyhow::bail!("unexpected exit value"),
    }

    Ok(())
}

/// A runtime hands back the configuration it was built with.
#[test]
fn runtime_keeps_its_config() -> Result<()> {
    let runtime: SharedRuntime = cooperative_runtime(24)?;
    ensure_eq!(runtime.config().max_threads(), 24);
    ensure_eq!(runtime.config().preemption(), false);
    Ok(())
}
