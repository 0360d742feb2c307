// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod config;
pub mod fail;
pub mod limits;
pub mod logging;
pub mod preemption;
pub mod scheduler;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal::{
        ExecutionContext,
        SignalPreemption,
    },
    runtime::{
        config::Config,
        fail::Fail,
        preemption::{
            CooperativeGate,
            PreemptionGate,
        },
        scheduler::{
            scheduler::{
                Scheduler,
                Switch,
            },
            tcb::{
                ExitValue,
                ThreadControlBlock,
                ThreadEntry,
                ThreadId,
                ThreadStatus,
            },
            wait_queue::WaitQueue,
        },
    },
};
use ::std::{
    any::Any,
    cell::{
        Cell,
        RefCell,
    },
    mem,
    ops::Deref,
    panic::{
        self,
        AssertUnwindSafe,
    },
    process,
    ptr,
    rc::Rc,
};

//======================================================================================================================
// Thread Local Variables
//======================================================================================================================

thread_local! {
    /// Runtime driving the calling OS thread. Read by the timer handler and by the trampoline of new threads.
    static ACTIVE_RUNTIME: Cell<*const Runtime> = const { Cell::new(ptr::null()) };
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// User-level thread runtime.
///
/// Multiplexes logical threads onto the OS thread that creates the first one. That context becomes thread 0. Every
/// other thread runs on its own stack and is switched to either when the running thread reaches a suspension point
/// (`yield_now`, `exit`, `join`, a contended mutex) or when the preemption timer fires.
///
/// All scheduling state is touched with preemption blocked. Whenever the scheduler switches threads, preemption is
/// blocked on both sides of the switch: the resumed thread opens the gate again on its way out of the runtime.
///
/// With preemption enabled, a thread may be switched out while it holds a lock that belongs to the OS thread, like
/// the allocator's or the one guarding standard output. Threads that allocate or print concurrently should do so
/// with the gate blocked.
pub struct Runtime {
    config: Config,
    gate: Box<dyn PreemptionGate>,
    /// Created by the first call to `create`.
    scheduler: RefCell<Option<Scheduler>>,
    /// Mirror of the running thread's id, readable without the gate.
    current: Cell<ThreadId>,
}

/// Owning handle on a [Runtime]. Keeps the runtime at a stable address for as long as threads may run on it.
pub struct SharedRuntime(Rc<Runtime>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Runtime {
    /// Creates a runtime. Preemption is driven by `SIGPROF` unless disabled in `config`.
    pub fn new(config: Config) -> Result<SharedRuntime, Fail> {
        let gate: Box<dyn PreemptionGate> = if config.preemption() {
            Box::new(SignalPreemption::new()?)
        } else {
            Box::new(CooperativeGate)
        };
        Self::with_gate(config, gate)
    }

    /// Creates a runtime that uses `gate` to control preemption.
    pub fn with_gate(config: Config, gate: Box<dyn PreemptionGate>) -> Result<SharedRuntime, Fail> {
        config.validate()?;
        Ok(SharedRuntime(Rc::new(Self {
            config,
            gate,
            scheduler: RefCell::new(None),
            current: Cell::new(ThreadId::MAIN),
        })))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates a thread that runs `entry` and then exits with its result.
    ///
    /// The first call turns the calling context into thread 0 and starts the preemption timer. Fails with `EAGAIN`
    /// once the id space is exhausted, and with `EBUSY` if another runtime is already active on this OS thread.
    pub fn create<F, R>(&self, entry: F) -> Result<ThreadId, Fail>
    where
        F: FnOnce(&Runtime) -> R + 'static,
        R: Any,
    {
        // Allocation happens behind the gate: the timer must not switch threads while the allocator is busy.
        self.gate.block();
        let result: Result<ThreadId, Fail> = self.initialize().and_then(|()| {
            let entry: ThreadEntry = Box::new(move |runtime: &Runtime| {
                let value: R = entry(runtime);
                runtime.gate.block();
                let value: ExitValue = Box::new(value);
                runtime.gate.unblock();
                value
            });
            let mut tcb: Box<ThreadControlBlock> =
                ThreadControlBlock::new(entry, self.config.stack_size(), thread_trampoline)?;
            self.with_scheduler(|scheduler| {
                let id: ThreadId = scheduler.issue_id(&mut tcb, self.config.max_threads())?;
                scheduler.make_ready(tcb);
                debug!("create(): thread {} created", id);
                Ok(id)
            })
        });
        self.gate.unblock();
        result
    }

    /// Hands the processor over to the scheduler. Returns once this thread is picked again, which may be immediately.
    pub fn yield_now(&self) {
        self.gate.block();
        self.schedule(None);
        self.gate.unblock();
    }

    /// Terminates the calling thread with `value`, which is handed to whoever joins it.
    ///
    /// If no other thread is ready to run, the whole process exits successfully instead.
    pub fn exit(&self, value: ExitValue) -> ! {
        self.gate.block();
        let id: ThreadId = self.current();
        let last: bool = match self.try_with_scheduler(|scheduler| {
            scheduler.current_mut().complete(value);
            !scheduler.has_ready()
        }) {
            Some(last) => last,
            None => true,
        };
        if last {
            debug!("exit(): thread {} was the last runnable thread", id);
            self.gate.disarm();
            process::exit(0);
        }
        debug!("exit(): thread {} completed", id);
        self.schedule(None);
        fail::fatal("completed thread was resumed")
    }

    /// Waits for thread `id` to complete and returns what it exited with. Reclaims the thread.
    ///
    /// This polls: every unsuccessful attempt gives the processor away for one scheduling round. Joining a thread
    /// that never completes, or that was already joined, never returns.
    pub fn join(&self, id: ThreadId) -> ExitValue {
        loop {
            self.gate.block();
            if let Some(tcb) = self.try_with_scheduler(|scheduler| scheduler.reap(id)).flatten() {
                let value: ExitValue = Self::reclaim(tcb);
                debug!("join(): thread {} joined", id);
                self.gate.unblock();
                return value;
            }
            self.schedule(None);
            self.gate.unblock();
        }
    }

    /// Joins thread `id` if it has completed. Fails with `EAGAIN` otherwise.
    pub fn try_join(&self, id: ThreadId) -> Result<ExitValue, Fail> {
        self.gate.block();
        let result: Result<ExitValue, Fail> = match self.try_with_scheduler(|scheduler| scheduler.reap(id)).flatten() {
            Some(tcb) => {
                debug!("try_join(): thread {} joined", id);
                Ok(Self::reclaim(tcb))
            },
            None => Err(Fail::new(libc::EAGAIN, "thread has not completed")),
        };
        self.gate.unblock();
        result
    }

    /// Returns the id of the running thread.
    pub fn current(&self) -> ThreadId {
        self.current.get()
    }

    /// Returns how many threads are waiting to run.
    pub fn num_ready(&self) -> usize {
        self.gate.block();
        let n: usize = self.try_with_scheduler(|scheduler| scheduler.num_ready()).unwrap_or(0);
        self.gate.unblock();
        n
    }

    /// Returns how many completed threads have not been joined yet.
    pub fn num_completed(&self) -> usize {
        self.gate.block();
        let n: usize = self.try_with_scheduler(|scheduler| scheduler.num_completed()).unwrap_or(0);
        self.gate.unblock();
        n
    }

    /// Returns the gate guarding this runtime against preemption.
    pub fn gate(&self) -> &dyn PreemptionGate {
        self.gate.as_ref()
    }

    /// Blocks the running thread on `waitlist` and schedules another one. Must be called with the gate blocked.
    /// Returns when the thread is woken up, or right away if no other thread could run.
    pub(crate) fn block_on(&self, waitlist: &WaitQueue) {
        self.with_scheduler(|scheduler| scheduler.current_mut().set_status(ThreadStatus::Blocked));
        self.schedule(Some(waitlist));
    }

    /// Puts a thread taken off a wait queue back in line. Must be called with the gate blocked.
    pub(crate) fn wake(&self, tcb: Box<ThreadControlBlock>) {
        trace!("wake(): thread {} is ready", tcb.id());
        self.with_scheduler(|scheduler| scheduler.make_ready(tcb));
    }

    /// Scheduler entry point. Must be called with the gate blocked, and returns with it still blocked.
    fn schedule(&self, waitlist: Option<&WaitQueue>) {
        let switch: Option<Switch> = self.try_with_scheduler(|scheduler| scheduler.rotate(waitlist)).flatten();
        let switch: Switch = match switch {
            Some(switch) => switch,
            None => return,
        };
        self.current.set(switch.to);
        self.gate.arm(self.config.timer_interval());
        if switch.from != switch.to {
            // Safety: both contexts live inside boxed control blocks owned by the scheduler or a wait queue, and no
            // borrow of the scheduler is held across the switch.
            if let Err(e) = unsafe { ExecutionContext::switch(switch.save, switch.restore) } {
                fail::fatal(&e.to_string());
            }
        }
    }

    /// Lazily sets up the scheduler, turning the calling context into thread 0. Must be called with the gate blocked.
    fn initialize(&self) -> Result<(), Fail> {
        if self.scheduler.borrow().is_some() {
            return Ok(());
        }
        let active: *const Runtime = ACTIVE_RUNTIME.with(|active| active.get());
        if !active.is_null() {
            let cause: &str = "another runtime is active on this OS thread";
            error!("initialize(): {}", cause);
            return Err(Fail::new(libc::EBUSY, cause));
        }

        *self.scheduler.borrow_mut() = Some(Scheduler::new(ThreadControlBlock::main()));
        self.current.set(ThreadId::MAIN);
        ACTIVE_RUNTIME.with(|active| active.set(self));
        if let Err(e) = self.gate.install(timer_handler) {
            fail::fatal(&e.to_string());
        }
        self.gate.arm(self.config.timer_interval());
        debug!(
            "initialize(): runtime started (preemption={:?}, interval={:?})",
            self.config.preemption(),
            self.config.timer_interval()
        );
        Ok(())
    }

    /// Runs `f` on the scheduler, if it was initialized. Must be called with the gate blocked.
    fn try_with_scheduler<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> Option<R> {
        match self.scheduler.try_borrow_mut() {
            Ok(mut scheduler) => scheduler.as_mut().map(f),
            Err(_) => fail::fatal("scheduler accessed reentrantly"),
        }
    }

    /// Same as [Runtime::try_with_scheduler], for callers that only run once the scheduler exists.
    fn with_scheduler<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        match self.try_with_scheduler(f) {
            Some(result) => result,
            None => fail::fatal("runtime was not initialized"),
        }
    }

    fn reclaim(mut tcb: Box<ThreadControlBlock>) -> ExitValue {
        match tcb.take_return_value() {
            Some(value) => value,
            None => fail::fatal("completed thread has no return value"),
        }
    }

    /// Returns the runtime driving the calling OS thread.
    fn active() -> Option<&'static Runtime> {
        let active: *const Runtime = ACTIVE_RUNTIME.with(|active| active.get());
        // Safety: the pointer is cleared before the runtime it points to is dropped.
        unsafe { active.as_ref() }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// First code run by every thread but thread 0.
extern "C" fn thread_trampoline() {
    let runtime: &Runtime = match Runtime::active() {
        Some(runtime) => runtime,
        None => fail::fatal("thread started without an active runtime"),
    };
    // The context was primed with preemption blocked.
    let entry: Option<ThreadEntry> = runtime.with_scheduler(|scheduler| scheduler.current_mut().take_entry());
    runtime.gate.unblock();

    let entry: ThreadEntry = match entry {
        Some(entry) => entry,
        None => fail::fatal("thread started twice"),
    };
    match panic::catch_unwind(AssertUnwindSafe(|| entry(runtime))) {
        Ok(value) => runtime.exit(value),
        Err(_) => fail::fatal(&format!("thread {} panicked", runtime.current())),
    }
}

/// Entry point of the preemption timer. Runs with the timer signal masked.
extern "C" fn timer_handler(_signum: libc::c_int) {
    if let Some(runtime) = Runtime::active() {
        runtime.gate.block();
        runtime.schedule(None);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Deref for SharedRuntime {
    type Target = Runtime;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let this: *const Runtime = self;
        if ACTIVE_RUNTIME.with(|active| active.get()) == this {
            self.gate.block();
            self.gate.disarm();
            ACTIVE_RUNTIME.with(|active| active.set(ptr::null()));
            self.gate.unblock();
        }
        if self.current.get() != ThreadId::MAIN {
            // Control blocks own the stack we are running on.
            warn!("drop(): runtime dropped by thread {}, leaking its threads", self.current.get());
            mem::forget(self.scheduler.take());
        }
    }
}
