// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::clap::{
    Arg,
    ArgMatches,
    Command,
};
use ::std::{
    cell::Cell,
    rc::Rc,
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
    time::Duration,
};
use ::uthread::{
    logging,
    Config,
    Mutex,
    Runtime,
    SharedRuntime,
    ThreadId,
};

//======================================================================================================================
// Program Arguments
//======================================================================================================================

/// Program Arguments
#[derive(Debug)]
pub struct ProgramArguments {
    /// Scenario to run.
    scenario: String,
    /// Path to a configuration file.
    config_path: Option<String>,
    /// Preemption quantum, overriding the configuration.
    interval: Option<Duration>,
}

/// Associate functions for Program Arguments
impl ProgramArguments {
    /// Scenarios this program knows about.
    const SCENARIOS: [&'static str; 5] = ["yield-join", "counter", "exhaust", "last-exit", "spin"];

    /// Parses the program arguments from the command line interface.
    pub fn new(app_name: &'static str, app_author: &'static str, app_about: &'static str) -> Result<Self> {
        let matches: ArgMatches = Command::new(app_name)
            .author(app_author)
            .about(app_about)
            .arg(
                Arg::new("scenario")
                    .value_parser(Self::SCENARIOS)
                    .required(true)
                    .value_name("SCENARIO")
                    .help("Sets the scenario to run"),
            )
            .arg(
                Arg::new("config")
                    .long("config")
                    .value_parser(clap::value_parser!(String))
                    .required(false)
                    .value_name("PATH")
                    .help("Sets the configuration file"),
            )
            .arg(
                Arg::new("interval")
                    .long("interval-us")
                    .value_parser(clap::value_parser!(u64))
                    .required(false)
                    .value_name("MICROSECONDS")
                    .help("Sets the preemption quantum"),
            )
            .get_matches();

        let scenario: String = match matches.get_one::<String>("scenario") {
            Some(scenario) => scenario.clone(),
            None => anyhow::bail!("missing scenario"),
        };

        Ok(Self {
            scenario,
            config_path: matches.get_one::<String>("config").cloned(),
            interval: matches.get_one::<u64>("interval").map(|us| Duration::from_micros(*us)),
        })
    }

    /// Builds the runtime configuration out of the program arguments.
    pub fn config(&self) -> Result<Config> {
        let mut config: Config = match &self.config_path {
            Some(path) => Config::new(path)?,
            None => Config::default(),
        };
        if let Some(interval) = self.interval {
            config = config.with_timer_interval(interval);
        }
        Ok(config)
    }
}

//======================================================================================================================
// Scenarios
//======================================================================================================================

/// Three threads yield a few times each and exit with their own id. Joins happen in creation order.
fn yield_join(runtime: &Runtime) -> Result<()> {
    const NTHREADS: usize = 3;
    const NYIELDS: usize = 5;

    let mut threads: Vec<ThreadId> = Vec::with_capacity(NTHREADS);
    for _ in 0..NTHREADS {
        threads.push(runtime.create(|runtime: &Runtime| {
            for _ in 0..NYIELDS {
                runtime.yield_now();
            }
            let me: u32 = runtime.current().into();
            runtime.exit(Box::new(me))
        })?);
    }

    for id in threads {
        match runtime.join(id).downcast::<u32>() {
            Ok(value) => println!("joined thread {} -> {}", id, value),
            Err(_) => anyhow::bail!("thread {} exited with an unexpected value", id),
        }
    }
    Ok(())
}

/// Two threads bump a shared counter under a mutex.
fn counter(runtime: &Runtime) -> Result<()> {
    const NTHREADS: usize = 2;
    const NINCREMENTS: u64 = 100_000;

    let mutex: Rc<Mutex> = Rc::new(Mutex::new());
    mutex.init()?;
    let counter: Rc<Cell<u64>> = Rc::new(Cell::new(0));

    let mut threads: Vec<ThreadId> = Vec::with_capacity(NTHREADS);
    for _ in 0..NTHREADS {
        let mutex: Rc<Mutex> = mutex.clone();
        let counter: Rc<Cell<u64>> = counter.clone();
        threads.push(runtime.create(move |runtime: &Runtime| -> bool {
            for _ in 0..NINCREMENTS {
                if mutex.lock(runtime).is_err() {
                    return false;
                }
                counter.set(counter.get() + 1);
                if mutex.unlock(runtime).is_err() {
                    return false;
                }
            }
            true
        })?);
    }

    for id in threads {
        match runtime.join(id).downcast::<bool>() {
            Ok(ok) if *ok => (),
            _ => anyhow::bail!("thread {} failed to use the mutex", id),
        }
    }
    mutex.destroy(runtime)?;
    println!("counter={}", counter.get());
    Ok(())
}

/// Creates threads until the id space runs out.
fn exhaust(config: Config) -> Result<()> {
    let runtime: SharedRuntime = Runtime::new(config.with_max_threads(64).with_stack_size(64 * 1024))?;

    let mut created: usize = 0;
    loop {
        match runtime.create(|_: &Runtime| ()) {
            Ok(_) => created += 1,
            Err(e) if e.errno == libc::EAGAIN => break,
            Err(e) => anyhow::bail!("unexpected failure ({})", e),
        }
    }
    // Thread 0 holds an id of its own.
    let expected: usize = runtime.config().max_threads() as usize - 1;
    if created != expected {
        anyhow::bail!("created {} threads, expected {}", created, expected);
    }
    println!("created={}", created);
    Ok(())
}

/// Thread 0 exits while another thread still has work to do. The process ends with that other thread.
fn last_exit(runtime: &Runtime) -> Result<()> {
    runtime.create(|runtime: &Runtime| {
        for _ in 0..3 {
            runtime.yield_now();
        }
        println!("worker done");
    })?;
    runtime.exit(Box::new(()))
}

/// One thread spins until another one raises a flag. Only preemption lets the second one run.
fn spin(runtime: &Runtime) -> Result<()> {
    let flag: Rc<AtomicBool> = Rc::new(AtomicBool::new(false));

    let spinner: ThreadId = {
        let flag: Rc<AtomicBool> = flag.clone();
        runtime.create(move |_: &Runtime| {
            while !flag.load(Ordering::Acquire) {
                ::std::hint::spin_loop();
            }
        })?
    };
    let raiser: ThreadId = {
        let flag: Rc<AtomicBool> = flag.clone();
        runtime.create(move |_: &Runtime| flag.store(true, Ordering::Release))?
    };

    runtime.join(spinner);
    runtime.join(raiser);
    println!("spin done");
    Ok(())
}

//======================================================================================================================
// Main
//======================================================================================================================

fn main() -> Result<()> {
    logging::initialize();

    let args: ProgramArguments = ProgramArguments::new(
        "uthread-demo",
        "Microsoft Corporation",
        "Runs a user-level thread scenario.",
    )?;
    let config: Config = args.config()?;

    match args.scenario.as_str() {
        "exhaust" => exhaust(config),
        scenario => {
            let runtime: SharedRuntime = Runtime::new(config)?;
            match scenario {
                "yield-join" => yield_join(&runtime),
                "counter" => counter(&runtime),
                "last-exit" => last_exit(&runtime),
                "spin" => spin(&runtime),
                _ => anyhow::bail!("unknown scenario {:?}", scenario),
            }
        },
    }
}
